//! Concrete wire clients for the collaborator seams
//!
//! These implement [`crate::clients::Registry`] and
//! [`crate::clients::ControlPlane`] over each system's REST API. The core
//! never depends on them directly; the binary wires them in at startup.

mod openstack;
mod registry;

pub use openstack::{OpenStackClient, OpenStackConfig};
pub use registry::{HttpRegistryClient, RegistryConfig};
