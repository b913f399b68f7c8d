//! Provisioning registry operations
//!
//! The registry is the system of record for machine records (keyed by
//! serial), host records (keyed by hostname, bound to exactly one machine)
//! and the interfaces and addresses attached to machines. It has no
//! "create-or-replace" or "delete-if-exists" primitives and rejects deletes
//! issued out of referential order, which is why every caller probes before
//! acting.

use std::net::Ipv4Addr;

use async_trait::async_trait;

use crate::domain::{ImageMetadata, NetworkAddress, VmIdentity};
use crate::errors::ReconcilerResult;
use crate::events::LifecycleEvent;

/// Interface name the registry treats as primary and bootable
pub const PRIMARY_INTERFACE: &str = "eth0";

/// Interfaces and addresses currently attached to a machine record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineDetails {
    pub addresses: Vec<Ipv4Addr>,
    pub interfaces: Vec<String>,
}

impl MachineDetails {
    pub fn has_address(&self, addr: Ipv4Addr) -> bool {
        self.addresses.contains(&addr)
    }

    pub fn has_interface(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }
}

/// Logical registry operations the engine needs.
///
/// All calls are remote and may fail; failures abort the current message and
/// are resolved by transport redelivery, so implementations must not retry
/// internally.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Whether a host record exists for this hostname
    async fn check_host_exists(&self, hostname: &str) -> ReconcilerResult<bool>;

    /// Delete the host record for this hostname
    async fn delete_host(&self, hostname: &str) -> ReconcilerResult<()>;

    /// Find the machine record keyed by this VM's serial, if any
    async fn search_machine_by_serial(&self, vm: &VmIdentity) -> ReconcilerResult<Option<String>>;

    /// Find the hostname currently bound to this machine record, if any
    async fn search_host_by_machine(&self, machine: &str) -> ReconcilerResult<Option<String>>;

    /// Interfaces and addresses attached to this machine record
    async fn get_machine_details(&self, machine: &str) -> ReconcilerResult<MachineDetails>;

    /// Detach an address from a machine record
    async fn delete_address(&self, addr: Ipv4Addr, machine: &str) -> ReconcilerResult<()>;

    /// Detach the primary interface from a machine record
    async fn delete_interface(&self, machine: &str) -> ReconcilerResult<()>;

    /// Delete a machine record; the registry rejects this while a host is
    /// still bound or interfaces are still attached
    async fn delete_machine(&self, machine: &str) -> ReconcilerResult<()>;

    /// Create a machine record for this VM, returning its registry id
    async fn create_machine(
        &self,
        event: &LifecycleEvent,
        vm: &VmIdentity,
    ) -> ReconcilerResult<String>;

    /// Attach one interface per resolved address to a machine record
    async fn add_machine_nics(
        &self,
        machine: &str,
        addresses: &[NetworkAddress],
    ) -> ReconcilerResult<()>;

    /// Mark an interface on a machine record as bootable
    async fn set_interface_bootable(&self, machine: &str, interface: &str) -> ReconcilerResult<()>;

    /// Create the host record bound to a machine record
    async fn create_host(
        &self,
        image: &ImageMetadata,
        addresses: &[NetworkAddress],
        machine: &str,
    ) -> ReconcilerResult<()>;

    /// Put the new host under registry management
    async fn manage(
        &self,
        addresses: &[NetworkAddress],
        image: &ImageMetadata,
    ) -> ReconcilerResult<()>;

    /// Run the registry's host build finalization
    async fn make(
        &self,
        addresses: &[NetworkAddress],
        image: &ImageMetadata,
    ) -> ReconcilerResult<()>;
}
