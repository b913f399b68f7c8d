//! Network attachment value objects with validation invariants

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid MAC address format: {0}")]
    InvalidMacAddress(String),
}

/// MAC address value object
///
/// Invariants:
/// - Six colon-separated octets
/// - Hex digits only
/// - Canonical lowercase form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacAddress(String);

impl MacAddress {
    /// Create a MAC address, normalizing to lowercase
    pub fn new(mac: impl Into<String>) -> Result<Self, NetworkError> {
        let mac = mac.into().to_lowercase();

        let octets: Vec<&str> = mac.split(':').collect();
        if octets.len() != 6 {
            return Err(NetworkError::InvalidMacAddress(mac));
        }
        for octet in &octets {
            if octet.len() != 2 || !octet.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(NetworkError::InvalidMacAddress(mac));
            }
        }

        Ok(Self(mac))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One resolved network attachment for a VM.
///
/// The control plane returns zero or more of these per VM, ordered; the first
/// entry is treated as the primary interface. `hostname` is `None` for
/// local-only networks that have no DNS presence, which disqualifies the VM
/// from registry management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAddress {
    /// DNS hostname, absent on local-only networks
    pub hostname: Option<String>,
    /// IPv4 address of the attachment
    pub addr: Ipv4Addr,
    /// MAC address of the attachment
    pub mac: MacAddress,
    /// Interface label, e.g. "eth0"
    pub interface: String,
}

impl NetworkAddress {
    pub fn new(
        hostname: Option<String>,
        addr: Ipv4Addr,
        mac: MacAddress,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            hostname,
            addr,
            mac,
            interface: interface.into(),
        }
    }
}

/// Comma-joined hostnames of the addresses that have one
pub fn joined_hostnames(addresses: &[NetworkAddress]) -> String {
    addresses
        .iter()
        .filter_map(|a| a.hostname.as_deref())
        .collect::<Vec<_>>()
        .join(",")
}
