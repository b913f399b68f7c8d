//! Event routing and the create/delete workflows
//!
//! One decoded event is fully handled, including every blocking remote call,
//! before the caller acknowledges it and dequeues the next. There is no state
//! shared between events; redelivery safety comes from the reconciler running
//! before any creation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clients::{ControlPlane, NameResolver, Registry, PRIMARY_INTERFACE};
use crate::domain::{joined_hostnames, ImageMetadata, NetworkAddress, VmIdentity};
use crate::errors::ReconcilerResult;
use crate::events::{EventKind, LifecycleEvent};
use crate::reconciler::Reconciler;

/// Metadata key for the comma-joined hostnames written back to the VM
pub const METADATA_HOSTNAMES: &str = "HOSTNAMES";
/// Metadata key for the reconciliation status written back to the VM
pub const METADATA_STATUS: &str = "AQ_STATUS";
/// Metadata key for the registry machine id written back to the VM
pub const METADATA_MACHINE: &str = "AQ_MACHINE";
/// Status value written on successful creation
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// Why a workflow deliberately stopped early.
///
/// Skips are expected races with external actors, not failures; the message
/// is still acknowledged and any leftover inconsistency self-corrects on a
/// later event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The VM no longer exists in the control plane
    VmVanished,
    /// The VM's image carries no managed-image tag
    UnmanagedImage,
    /// No networks resolved, or the primary attachment has no hostname
    NoResolvableHostname,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VmVanished => write!(f, "vm no longer exists"),
            Self::UnmanagedImage => write!(f, "image is not registry-managed"),
            Self::NoResolvableHostname => write!(f, "no resolvable hostname"),
        }
    }
}

/// How an event's processing ended, short of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Workflow ran to the end
    Completed,
    /// Workflow stopped early for an expected reason
    Skipped(SkipReason),
}

/// Routes decoded events into the create and delete workflows
pub struct EventConsumer {
    registry: Arc<dyn Registry>,
    control_plane: Arc<dyn ControlPlane>,
    reconciler: Reconciler,
}

impl EventConsumer {
    pub fn new(
        registry: Arc<dyn Registry>,
        control_plane: Arc<dyn ControlPlane>,
        resolver: Arc<dyn NameResolver>,
    ) -> Self {
        let reconciler = Reconciler::new(Arc::clone(&registry), resolver);
        Self {
            registry,
            control_plane,
            reconciler,
        }
    }

    /// Handle one decoded event to completion.
    ///
    /// `Err` means the message must not be acknowledged; both `Ok` variants
    /// mean it must be.
    pub async fn consume(&self, event: &LifecycleEvent) -> ReconcilerResult<Outcome> {
        match event.kind {
            EventKind::Create => self.handle_create(event).await,
            EventKind::Delete => self.handle_delete(event).await,
        }
    }

    /// Creation workflow: validate, clear stale state, then build the
    /// machine record, its interfaces, the host, and tag the VM back.
    async fn handle_create(&self, event: &LifecycleEvent) -> ReconcilerResult<Outcome> {
        let vm = VmIdentity::from_event(event);
        info!(vm = %vm, "Received VM create event");
        log_event_context(event);

        // The VM can be deleted, or rebuilt from an unmanaged image, between
        // the event being emitted and us getting here. Both are skips.
        if !self.control_plane.check_machine_exists(&vm).await? {
            warn!(vm = %vm, "VM does not exist, skipping creation");
            return Ok(Outcome::Skipped(SkipReason::VmVanished));
        }

        let image = self.control_plane.get_image(&vm).await?;
        let Some(image_meta) = ImageMetadata::from_metadata(&image.metadata) else {
            debug!(vm = %vm, image = %image.name, "Ignoring VM from unmanaged image");
            return Ok(Outcome::Skipped(SkipReason::UnmanagedImage));
        };

        let networks = self.control_plane.get_server_networks(&vm).await?;
        let Some(primary) = primary_attachment(&networks) else {
            info!(vm = %vm, "Skipping host with local-only networking");
            return Ok(Outcome::Skipped(SkipReason::NoResolvableHostname));
        };

        // Clear any stale record before recreating, so redelivered events
        // leave exactly one live machine/host pair
        self.reconciler.delete_machine(&vm, Some(primary)).await?;

        let machine = self.registry.create_machine(event, &vm).await?;
        self.registry.add_machine_nics(&machine, &networks).await?;
        self.registry
            .set_interface_bootable(&machine, PRIMARY_INTERFACE)
            .await?;

        self.registry
            .create_host(&image_meta, &networks, &machine)
            .await?;
        self.registry.manage(&networks, &image_meta).await?;
        self.registry.make(&networks, &image_meta).await?;

        self.tag_back(&vm, &networks).await?;

        info!(vm = %vm, machine = %machine, "Finished creation workflow");
        Ok(Outcome::Completed)
    }

    /// Deletion workflow: the event carries no network payload, so the
    /// teardown runs without the stale-hostname check.
    async fn handle_delete(&self, event: &LifecycleEvent) -> ReconcilerResult<Outcome> {
        let vm = VmIdentity::from_event(event);
        info!(vm = %vm, "Received VM delete event");
        log_event_context(event);

        self.reconciler.delete_machine(&vm, None).await?;

        info!(vm = %vm, "Finished deletion workflow");
        Ok(Outcome::Completed)
    }

    /// Write reconciliation results onto the VM's metadata; skipped when the
    /// VM has vanished mid-processing.
    async fn tag_back(&self, vm: &VmIdentity, networks: &[NetworkAddress]) -> ReconcilerResult<()> {
        if !self.control_plane.check_machine_exists(vm).await? {
            warn!(vm = %vm, "VM does not exist, skipping metadata update");
            return Ok(());
        }

        let machine = self
            .registry
            .search_machine_by_serial(vm)
            .await?
            .unwrap_or_default();

        let metadata = HashMap::from([
            (METADATA_HOSTNAMES.to_string(), joined_hostnames(networks)),
            (METADATA_STATUS.to_string(), STATUS_SUCCESS.to_string()),
            (METADATA_MACHINE.to_string(), machine),
        ]);
        self.control_plane.update_metadata(vm, metadata).await
    }
}

/// The first attachment is primary; it must carry a hostname for the VM to
/// be manageable at all
fn primary_attachment(networks: &[NetworkAddress]) -> Option<&NetworkAddress> {
    networks.first().filter(|n| n.hostname.is_some())
}

fn log_event_context(event: &LifecycleEvent) {
    debug!(
        project = %event.project_name,
        user = %event.user_name,
        vm_name = %event.payload.vm_name,
        "Event context"
    );
}
