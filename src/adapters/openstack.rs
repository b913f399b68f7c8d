//! HTTP client for the cloud control plane
//!
//! Talks to the compute and image APIs with a pre-issued token. Network
//! attachments come back as an ordered map of networks; the first IPv4 entry
//! is the primary interface. Hostnames are derived from the server's display
//! name and the configured DNS domain; with no domain configured the
//! deployment is local-only and attachments carry no hostname.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clients::{ControlPlane, VmImage};
use crate::domain::{MacAddress, NetworkAddress, VmIdentity};
use crate::errors::{ReconcilerError, ReconcilerResult};

/// Configuration for the control plane connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenStackConfig {
    /// Compute API base URL
    pub compute_url: String,
    /// Image API base URL
    pub image_url: String,
    /// Pre-issued auth token
    pub token: String,
    /// DNS domain appended to display names; `None` means local-only
    pub dns_domain: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

/// Token-authenticated client for the compute and image APIs
pub struct OpenStackClient {
    config: OpenStackConfig,
    client: Client,
}

impl OpenStackClient {
    pub fn new(config: OpenStackConfig) -> ReconcilerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    "X-Auth-Token",
                    config.token.parse().map_err(|e| {
                        ReconcilerError::ControlPlane(format!("invalid auth token: {e}"))
                    })?,
                );
                headers
            })
            .build()
            .map_err(|e| {
                ReconcilerError::ControlPlane(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { config, client })
    }

    async fn get_server(&self, vm: &VmIdentity) -> ReconcilerResult<serde_json::Value> {
        let url = format!("{}/servers/{}", self.config.compute_url, vm.id);
        let response = self.send(self.client.get(url)).await?;
        response
            .json()
            .await
            .map_err(|e| ReconcilerError::ControlPlane(format!("bad server response: {e}")))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> ReconcilerResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ReconcilerError::ControlPlane(format!("control plane error: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        Err(ReconcilerError::ControlPlane(format!(
            "control plane returned {status} for {url}: {body}"
        )))
    }
}

#[async_trait]
impl ControlPlane for OpenStackClient {
    async fn get_image(&self, vm: &VmIdentity) -> ReconcilerResult<VmImage> {
        let server = self.get_server(vm).await?;
        let image_id = server["server"]["image"]["id"].as_str().ok_or_else(|| {
            ReconcilerError::ControlPlane(format!("server {} has no image id", vm.id))
        })?;

        let url = format!("{}/v2/images/{image_id}", self.config.image_url);
        let response = self.send(self.client.get(url)).await?;
        let image: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ReconcilerError::ControlPlane(format!("bad image response: {e}")))?;

        Ok(image_from_value(&image))
    }

    async fn check_machine_exists(&self, vm: &VmIdentity) -> ReconcilerResult<bool> {
        let url = format!("{}/servers/{}", self.config.compute_url, vm.id);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ReconcilerError::ControlPlane(format!("control plane error: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReconcilerError::ControlPlane(format!(
                "control plane returned {status}: {body}"
            )));
        }
        Ok(true)
    }

    async fn get_server_networks(&self, vm: &VmIdentity) -> ReconcilerResult<Vec<NetworkAddress>> {
        let server = self.get_server(vm).await?;
        let networks = networks_from_server(&server, self.config.dns_domain.as_deref())?;
        debug!(vm = %vm, count = networks.len(), "Resolved network attachments");
        Ok(networks)
    }

    async fn update_metadata(
        &self,
        vm: &VmIdentity,
        metadata: HashMap<String, String>,
    ) -> ReconcilerResult<()> {
        let url = format!("{}/servers/{}/metadata", self.config.compute_url, vm.id);
        let body = serde_json::json!({ "metadata": metadata });
        self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }
}

/// Image name plus its string-valued properties as the metadata map
fn image_from_value(image: &serde_json::Value) -> VmImage {
    let name = image["name"].as_str().unwrap_or_default().to_string();
    let metadata = image
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    VmImage { name, metadata }
}

/// Flatten the server's address map into ordered attachments, primary first.
///
/// Only IPv4 entries count. The first attachment keeps the display name as
/// its hostname label; later ones get an index suffix so every interface has
/// a distinct name in DNS.
fn networks_from_server(
    server: &serde_json::Value,
    dns_domain: Option<&str>,
) -> ReconcilerResult<Vec<NetworkAddress>> {
    let name = server["server"]["name"].as_str().ok_or_else(|| {
        ReconcilerError::ControlPlane("server response has no name".to_string())
    })?;

    let empty = serde_json::Map::new();
    let address_map = server["server"]["addresses"].as_object().unwrap_or(&empty);

    let mut networks = Vec::new();
    for entries in address_map.values() {
        let Some(entries) = entries.as_array() else {
            continue;
        };
        for entry in entries {
            if entry["version"].as_u64() != Some(4) {
                continue;
            }
            let addr: Ipv4Addr = entry["addr"]
                .as_str()
                .and_then(|a| a.parse().ok())
                .ok_or_else(|| {
                    ReconcilerError::ControlPlane("attachment has no IPv4 address".to_string())
                })?;
            let mac = entry["OS-EXT-IPS-MAC:mac_addr"]
                .as_str()
                .ok_or_else(|| {
                    ReconcilerError::ControlPlane("attachment has no MAC address".to_string())
                })
                .and_then(|m| {
                    MacAddress::new(m).map_err(|e| ReconcilerError::ControlPlane(e.to_string()))
                })?;

            let index = networks.len();
            let hostname = dns_domain.map(|domain| {
                if index == 0 {
                    format!("{name}.{domain}")
                } else {
                    format!("{name}-{index}.{domain}")
                }
            });

            networks.push(NetworkAddress::new(
                hostname,
                addr,
                mac,
                format!("eth{index}"),
            ));
        }
    }

    Ok(networks)
}
