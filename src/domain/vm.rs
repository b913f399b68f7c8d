//! VM identity derived from a lifecycle event

use std::fmt;

use uuid::Uuid;

use crate::events::LifecycleEvent;

/// The identity of the VM an event refers to.
///
/// Derived once per event and immutable for the rest of that event's
/// processing. The id doubles as the serial number under which the registry
/// keys the VM's machine record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmIdentity {
    /// Control plane instance id (also the registry serial)
    pub id: Uuid,
    /// Owning project id
    pub project_id: Uuid,
    /// Current display name
    pub name: String,
}

impl VmIdentity {
    /// Derive the identity from a decoded event
    pub fn from_event(event: &LifecycleEvent) -> Self {
        Self {
            id: event.payload.instance_id,
            project_id: event.payload.project_id,
            name: event.payload.vm_name.clone(),
        }
    }

    /// Serial number form used for registry machine searches
    pub fn serial(&self) -> String {
        self.id.to_string()
    }
}

impl fmt::Display for VmIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
