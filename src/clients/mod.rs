//! Collaborator seams
//!
//! The core only ever sees these traits; the concrete wire clients live in
//! [`crate::adapters`]. Keeping the seams here lets the workflows and the
//! teardown sequence run against in-memory fakes in tests.

mod control_plane;
mod registry;

use std::net::Ipv4Addr;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::ReconcilerResult;

pub use control_plane::{ControlPlane, VmImage};
pub use registry::{MachineDetails, Registry, PRIMARY_INTERFACE};

/// Hostname to IPv4 resolution.
///
/// A name that does not resolve yields `Ok(None)`; during teardown that means
/// the address detach is skipped, which keeps cleanup idempotent even after
/// the DNS record has already been retired.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve_ipv4(&self, hostname: &str) -> ReconcilerResult<Option<Ipv4Addr>>;
}

/// System resolver backed by `tokio::net::lookup_host`
#[derive(Debug, Clone, Default)]
pub struct DnsResolver;

#[async_trait]
impl NameResolver for DnsResolver {
    async fn resolve_ipv4(&self, hostname: &str) -> ReconcilerResult<Option<Ipv4Addr>> {
        // Port is irrelevant, lookup_host requires one
        match tokio::net::lookup_host((hostname, 0)).await {
            Ok(mut addrs) => Ok(addrs.find_map(|a| match a.ip() {
                std::net::IpAddr::V4(v4) => Some(v4),
                std::net::IpAddr::V6(_) => None,
            })),
            Err(e) => {
                debug!(hostname, error = %e, "Hostname did not resolve");
                Ok(None)
            }
        }
    }
}
