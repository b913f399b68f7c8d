//! Idempotent, order-sensitive registry teardown
//!
//! The registry has no conditional or cascading delete and enforces
//! referential ordering: a bound host record must go before the machine's
//! interfaces and addresses, and those before the machine record itself.
//! This module is the single place where stale registry state (from earlier
//! failed runs, duplicate delivery, or the registry's view lagging the
//! control plane) gets resolved, so every step probes for its target and is
//! a no-op when the target is already gone. Running it twice with the same
//! inputs mutates nothing the second time.
//!
//! The teardown is a fixed sequence of named steps; each step's method takes
//! its input from the previous step's output, so the registry-imposed order
//! cannot be violated without a type error:
//!
//! ```text
//! stale host checked -> machine found -> host unbound
//!   -> address detached -> interface detached -> machine deleted
//! ```

use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::{debug, info};

use crate::clients::{MachineDetails, NameResolver, Registry, PRIMARY_INTERFACE};
use crate::domain::{NetworkAddress, VmIdentity};
use crate::errors::ReconcilerResult;

/// One mutation performed during a teardown, in execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownStep {
    /// Host record named by the event's network details was deleted
    StaleHostDeleted(String),
    /// Host record bound to the machine was deleted
    BoundHostDeleted(String),
    /// Attached address was detached from the machine
    AddressDetached(Ipv4Addr),
    /// Primary interface was detached from the machine
    InterfaceDetached(String),
    /// The machine record itself was deleted
    MachineDeleted(String),
}

/// What a teardown run actually did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Machine record found for the VM's serial, if any
    pub machine: Option<String>,
    /// Mutations applied, in order
    pub steps: Vec<TeardownStep>,
}

impl TeardownReport {
    /// True when the run found nothing to clean up
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Deletes stale registry state for a VM in the required order
#[derive(Clone)]
pub struct Reconciler {
    registry: Arc<dyn Registry>,
    resolver: Arc<dyn NameResolver>,
}

impl Reconciler {
    pub fn new(registry: Arc<dyn Registry>, resolver: Arc<dyn NameResolver>) -> Self {
        Self { registry, resolver }
    }

    /// Best-effort removal of every registry record held for `vm`.
    ///
    /// `network` carries the newly observed primary attachment on create
    /// events; delete events have no network payload and pass `None`, which
    /// skips the stale-hostname check. A VM with no machine record is a
    /// success, not a failure.
    pub async fn delete_machine(
        &self,
        vm: &VmIdentity,
        network: Option<&NetworkAddress>,
    ) -> ReconcilerResult<TeardownReport> {
        let mut report = TeardownReport::default();

        self.delete_stale_host(network, &mut report).await?;

        let Some(machine) = self.find_machine(vm).await? else {
            info!(vm = %vm, "No existing registry record, nothing to tear down");
            return Ok(report);
        };
        report.machine = Some(machine.clone());

        if let Some(bound) = self.registry.search_host_by_machine(&machine).await? {
            self.unbind_host(&bound, &mut report).await?;

            let details = self.registry.get_machine_details(&machine).await?;
            self.detach_address(&machine, &bound, &details, &mut report)
                .await?;
            self.detach_interface(&machine, &details, &mut report)
                .await?;
        }

        info!(vm = %vm, machine = %machine, "Deleting stale machine record");
        self.registry.delete_machine(&machine).await?;
        report.steps.push(TeardownStep::MachineDeleted(machine));

        Ok(report)
    }

    /// Step 1: the hostname the control plane reports now may already have a
    /// host record from a previous life of this VM
    async fn delete_stale_host(
        &self,
        network: Option<&NetworkAddress>,
        report: &mut TeardownReport,
    ) -> ReconcilerResult<()> {
        let Some(hostname) = network.and_then(|n| n.hostname.as_deref()) else {
            return Ok(());
        };

        if self.registry.check_host_exists(hostname).await? {
            info!(hostname, "Deleting stale host record");
            self.registry.delete_host(hostname).await?;
            report
                .steps
                .push(TeardownStep::StaleHostDeleted(hostname.to_string()));
        }
        Ok(())
    }

    /// Step 2: locate the machine record by the VM's serial
    async fn find_machine(&self, vm: &VmIdentity) -> ReconcilerResult<Option<String>> {
        self.registry.search_machine_by_serial(vm).await
    }

    /// Step 3: the registry's bound hostname can differ from the hostname in
    /// the event when the registry's view lags the control plane's
    async fn unbind_host(&self, bound: &str, report: &mut TeardownReport) -> ReconcilerResult<()> {
        if self.registry.check_host_exists(bound).await? {
            info!(hostname = bound, "Deleting host record bound to machine");
            self.registry.delete_host(bound).await?;
            report
                .steps
                .push(TeardownStep::BoundHostDeleted(bound.to_string()));
        }
        Ok(())
    }

    /// Step 4a: detach the bound hostname's address if it is still attached
    async fn detach_address(
        &self,
        machine: &str,
        bound: &str,
        details: &MachineDetails,
        report: &mut TeardownReport,
    ) -> ReconcilerResult<()> {
        let Some(addr) = self.resolver.resolve_ipv4(bound).await? else {
            debug!(hostname = bound, "Bound hostname no longer resolves, skipping address detach");
            return Ok(());
        };

        if details.has_address(addr) {
            info!(machine, %addr, "Detaching address from machine");
            self.registry.delete_address(addr, machine).await?;
            report.steps.push(TeardownStep::AddressDetached(addr));
        }
        Ok(())
    }

    /// Step 4b: detach the primary interface if it is still attached
    async fn detach_interface(
        &self,
        machine: &str,
        details: &MachineDetails,
        report: &mut TeardownReport,
    ) -> ReconcilerResult<()> {
        if details.has_interface(PRIMARY_INTERFACE) {
            info!(machine, interface = PRIMARY_INTERFACE, "Detaching interface from machine");
            self.registry.delete_interface(machine).await?;
            report
                .steps
                .push(TeardownStep::InterfaceDetached(PRIMARY_INTERFACE.to_string()));
        }
        Ok(())
    }
}
