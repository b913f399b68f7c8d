//! Domain value objects
//!
//! Request-scoped values derived from a decoded lifecycle event or from the
//! control plane. Nothing in here is persisted; every event derives its own
//! copies and discards them when processing finishes.

mod image;
mod network;
mod vm;

pub use image::{ImageMetadata, MANAGED_IMAGE_KEY};
pub use network::{joined_hostnames, MacAddress, NetworkAddress, NetworkError};
pub use vm::VmIdentity;
