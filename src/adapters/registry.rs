//! HTTP client for the provisioning registry
//!
//! Thin REST mapping of the registry operations. The registry enforces
//! referential delete ordering server-side and returns errors for deletes of
//! absent records, so this client does no probing of its own; ordering and
//! existence checks live in [`crate::reconciler`].

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use urlencoding::encode;

use crate::clients::{MachineDetails, Registry, PRIMARY_INTERFACE};
use crate::domain::{joined_hostnames, ImageMetadata, NetworkAddress, VmIdentity};
use crate::errors::{ReconcilerError, ReconcilerResult};
use crate::events::LifecycleEvent;

/// Configuration for the registry connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry API base URL
    pub base_url: String,
    /// API token for authentication
    pub api_token: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://registry.example.com".to_string(),
            api_token: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Token-authenticated REST client for the registry
pub struct HttpRegistryClient {
    config: RegistryConfig,
    client: Client,
}

#[derive(Serialize)]
struct CreateMachineBody<'a> {
    serial: String,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vcpus: Option<u32>,
}

#[derive(Serialize)]
struct CreateHostBody<'a> {
    machine: &'a str,
    ip: String,
    osname: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    osversion: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    archetype: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    personality: Option<&'a str>,
}

#[derive(Deserialize)]
struct MachineDetailsBody {
    #[serde(default)]
    addresses: Vec<Ipv4Addr>,
    #[serde(default)]
    interfaces: Vec<String>,
}

impl HttpRegistryClient {
    pub fn new(config: RegistryConfig) -> ReconcilerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    "Authorization",
                    format!("Bearer {}", config.api_token)
                        .parse()
                        .map_err(|e| {
                            ReconcilerError::Registry(format!("invalid API token: {e}"))
                        })?,
                );
                headers
            })
            .build()
            .map_err(|e| ReconcilerError::Registry(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> ReconcilerResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ReconcilerError::Registry(format!("registry API error: {e}")))?;
        ensure_success(response).await
    }

    /// Search endpoints return an array of names; empty means not found
    async fn search(&self, path: &str) -> ReconcilerResult<Option<String>> {
        let response = self.send(self.client.get(self.url(path))).await?;
        let mut names: Vec<String> = response
            .json()
            .await
            .map_err(|e| ReconcilerError::Registry(format!("bad search response: {e}")))?;
        Ok(if names.is_empty() {
            None
        } else {
            Some(names.remove(0))
        })
    }

    fn primary_hostname<'a>(addresses: &'a [NetworkAddress]) -> ReconcilerResult<&'a str> {
        addresses
            .first()
            .and_then(|a| a.hostname.as_deref())
            .ok_or_else(|| {
                ReconcilerError::Registry("no primary hostname in network details".to_string())
            })
    }
}

async fn ensure_success(response: Response) -> ReconcilerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    Err(ReconcilerError::Registry(format!(
        "registry returned {status} for {url}: {body}"
    )))
}

#[async_trait]
impl Registry for HttpRegistryClient {
    async fn check_host_exists(&self, hostname: &str) -> ReconcilerResult<bool> {
        let url = self.url(&format!("/host/{}", encode(hostname)));
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ReconcilerError::Registry(format!("registry API error: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(response).await?;
        Ok(true)
    }

    async fn delete_host(&self, hostname: &str) -> ReconcilerResult<()> {
        let url = self.url(&format!("/host/{}", encode(hostname)));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn search_machine_by_serial(&self, vm: &VmIdentity) -> ReconcilerResult<Option<String>> {
        self.search(&format!("/find/machine?serial={}", encode(&vm.serial())))
            .await
    }

    async fn search_host_by_machine(&self, machine: &str) -> ReconcilerResult<Option<String>> {
        self.search(&format!("/find/host?machine={}", encode(machine)))
            .await
    }

    async fn get_machine_details(&self, machine: &str) -> ReconcilerResult<MachineDetails> {
        let url = self.url(&format!("/machine/{}", encode(machine)));
        let response = self.send(self.client.get(url)).await?;
        let body: MachineDetailsBody = response
            .json()
            .await
            .map_err(|e| ReconcilerError::Registry(format!("bad machine details: {e}")))?;
        Ok(MachineDetails {
            addresses: body.addresses,
            interfaces: body.interfaces,
        })
    }

    async fn delete_address(&self, addr: Ipv4Addr, machine: &str) -> ReconcilerResult<()> {
        let url = self.url(&format!("/machine/{}/address?ip={addr}", encode(machine)));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn delete_interface(&self, machine: &str) -> ReconcilerResult<()> {
        let url = self.url(&format!(
            "/machine/{}/interface/{PRIMARY_INTERFACE}",
            encode(machine)
        ));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn delete_machine(&self, machine: &str) -> ReconcilerResult<()> {
        let url = self.url(&format!("/machine/{}", encode(machine)));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn create_machine(
        &self,
        event: &LifecycleEvent,
        vm: &VmIdentity,
    ) -> ReconcilerResult<String> {
        let machine = machine_name(vm);
        let body = CreateMachineBody {
            serial: vm.serial(),
            model: "vm",
            memory_mb: event.payload.memory_mb,
            vcpus: event.payload.vcpus,
        };

        let url = self.url(&format!("/machine/{}", encode(&machine)));
        self.send(self.client.put(url).json(&body)).await?;
        debug!(machine = %machine, vm = %vm, "Created machine record");
        Ok(machine)
    }

    async fn add_machine_nics(
        &self,
        machine: &str,
        addresses: &[NetworkAddress],
    ) -> ReconcilerResult<()> {
        for address in addresses {
            let url = self.url(&format!(
                "/machine/{}/interface/{}",
                encode(machine),
                encode(&address.interface)
            ));
            let body = serde_json::json!({ "mac": address.mac, "ip": address.addr });
            self.send(self.client.put(url).json(&body)).await?;
        }
        Ok(())
    }

    async fn set_interface_bootable(&self, machine: &str, interface: &str) -> ReconcilerResult<()> {
        let url = self.url(&format!(
            "/machine/{}/interface/{}/bootable",
            encode(machine),
            encode(interface)
        ));
        self.send(self.client.post(url)).await?;
        Ok(())
    }

    async fn create_host(
        &self,
        image: &ImageMetadata,
        addresses: &[NetworkAddress],
        machine: &str,
    ) -> ReconcilerResult<()> {
        let hostname = Self::primary_hostname(addresses)?;
        let primary = &addresses[0];

        let body = CreateHostBody {
            machine,
            ip: primary.addr.to_string(),
            osname: &image.os,
            osversion: image.os_version.as_deref(),
            archetype: image.archetype.as_deref(),
            personality: image.personality.as_deref(),
        };

        let url = self.url(&format!("/host/{}", encode(hostname)));
        self.send(self.client.put(url).json(&body)).await?;
        debug!(hostname, machine, "Created host record");
        Ok(())
    }

    async fn manage(
        &self,
        addresses: &[NetworkAddress],
        image: &ImageMetadata,
    ) -> ReconcilerResult<()> {
        let hostname = Self::primary_hostname(addresses)?;
        let body = serde_json::json!({
            "hostname": hostname,
            "hostnames": joined_hostnames(addresses),
            "domain": image.domain,
        });
        self.send(self.client.post(self.url("/manage")).json(&body))
            .await?;
        Ok(())
    }

    async fn make(
        &self,
        addresses: &[NetworkAddress],
        image: &ImageMetadata,
    ) -> ReconcilerResult<()> {
        let hostname = Self::primary_hostname(addresses)?;
        let body = serde_json::json!({
            "osname": image.os,
            "osversion": image.os_version,
            "personality": image.personality,
        });
        let url = self.url(&format!("/make/{}", encode(hostname)));
        self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }
}

/// Registry machine ids are derived from the VM id so redelivered creates
/// regenerate the same name
fn machine_name(vm: &VmIdentity) -> String {
    format!("vm-{}", vm.id.simple())
}
