//! Cloud control plane operations

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{NetworkAddress, VmIdentity};
use crate::errors::ReconcilerResult;

/// A VM's source image as the control plane reports it
#[derive(Debug, Clone, Default)]
pub struct VmImage {
    pub name: String,
    /// Image properties; inspected for the managed-image marker
    pub metadata: HashMap<String, String>,
}

/// Logical control plane operations the engine needs
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// The VM's source image and its metadata
    async fn get_image(&self, vm: &VmIdentity) -> ReconcilerResult<VmImage>;

    /// Whether the VM still exists. VMs routinely vanish between the event
    /// being emitted and us processing it; callers treat `false` as a skip.
    async fn check_machine_exists(&self, vm: &VmIdentity) -> ReconcilerResult<bool>;

    /// Current network attachments, ordered, primary first
    async fn get_server_networks(&self, vm: &VmIdentity) -> ReconcilerResult<Vec<NetworkAddress>>;

    /// Merge entries into the VM's metadata
    async fn update_metadata(
        &self,
        vm: &VmIdentity,
        metadata: HashMap<String, String>,
    ) -> ReconcilerResult<()>;
}
