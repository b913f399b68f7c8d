//! Test fixtures: stateful fakes for the collaborator seams
//!
//! The fake registry keeps real in-memory state and rejects the operations
//! the real registry rejects (deleting absent records, deleting a machine
//! with a host still bound, creating a duplicate host), so ordering and
//! idempotence violations fail tests structurally instead of by log
//! inspection. All ids are fixed constants so tests are reproducible.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use registry_reconciler::clients::{
    ControlPlane, MachineDetails, NameResolver, Registry, VmImage, PRIMARY_INTERFACE,
};
use registry_reconciler::domain::{ImageMetadata, MacAddress, NetworkAddress, VmIdentity};
use registry_reconciler::errors::{ReconcilerError, ReconcilerResult};
use registry_reconciler::events::{EventKind, LifecycleEvent, VmPayload};

pub const VM_ID: &str = "6f8f2a0e-30ae-4bf0-9b63-49a921b25b9d";
pub const PROJECT_ID: &str = "9f1c5815-a6da-4617-8dbd-9db7b9577d7e";
pub const MAC: &str = "52:54:00:ab:cd:ef";

pub fn vm_identity() -> VmIdentity {
    VmIdentity {
        id: Uuid::parse_str(VM_ID).unwrap(),
        project_id: Uuid::parse_str(PROJECT_ID).unwrap(),
        name: "worker01".to_string(),
    }
}

pub fn lifecycle_event(kind: EventKind) -> LifecycleEvent {
    LifecycleEvent {
        kind,
        project_name: "cloud-dev".to_string(),
        user_name: "operator".to_string(),
        payload: VmPayload {
            instance_id: Uuid::parse_str(VM_ID).unwrap(),
            project_id: Uuid::parse_str(PROJECT_ID).unwrap(),
            vm_name: "worker01".to_string(),
            image_meta: HashMap::new(),
            memory_mb: Some(4096),
            vcpus: Some(2),
        },
    }
}

pub fn network_address(hostname: Option<&str>, addr: Ipv4Addr, interface: &str) -> NetworkAddress {
    NetworkAddress::new(
        hostname.map(str::to_string),
        addr,
        MacAddress::new(MAC).unwrap(),
        interface,
    )
}

pub fn managed_image() -> VmImage {
    VmImage {
        name: "rocky-9-aq".to_string(),
        metadata: HashMap::from([
            ("AQ_OS".to_string(), "rocky".to_string()),
            ("AQ_OSVERSION".to_string(), "9x-x86_64".to_string()),
            ("AQ_ARCHETYPE".to_string(), "cloud".to_string()),
            ("AQ_PERSONALITY".to_string(), "nubesvms".to_string()),
        ]),
    }
}

pub fn unmanaged_image() -> VmImage {
    VmImage {
        name: "ubuntu-24.04".to_string(),
        metadata: HashMap::from([("os_distro".to_string(), "ubuntu".to_string())]),
    }
}

/// Every registry call, mutating or not, in invocation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    CheckHostExists(String),
    DeleteHost(String),
    SearchMachineBySerial(String),
    SearchHostByMachine(String),
    GetMachineDetails(String),
    DeleteAddress(Ipv4Addr, String),
    DeleteInterface(String),
    DeleteMachine(String),
    CreateMachine(String),
    AddMachineNics(String, usize),
    SetInterfaceBootable(String, String),
    CreateHost(String, String),
    Manage(String),
    Make(String),
}

impl RegistryCall {
    /// Calls that change registry state; probes and searches do not
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Self::CheckHostExists(_)
                | Self::SearchMachineBySerial(_)
                | Self::SearchHostByMachine(_)
                | Self::GetMachineDetails(_)
        )
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    /// hostname -> bound machine
    hosts: HashMap<String, String>,
    /// machine -> attached interfaces and addresses
    machines: HashMap<String, MachineDetails>,
    /// serial -> machine
    serials: HashMap<String, String>,
    created: usize,
}

/// In-memory registry enforcing the real registry's referential rules
#[derive(Debug, Default)]
pub struct FakeRegistry {
    state: Mutex<RegistryState>,
    calls: Mutex<Vec<RegistryCall>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a machine record, optionally with a bound host
    pub fn with_machine(
        self,
        serial: &str,
        machine: &str,
        hostname: Option<&str>,
        details: MachineDetails,
    ) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.serials.insert(serial.to_string(), machine.to_string());
            state.machines.insert(machine.to_string(), details);
            if let Some(hostname) = hostname {
                state.hosts.insert(hostname.to_string(), machine.to_string());
            }
        }
        self
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutating_calls(&self) -> Vec<RegistryCall> {
        self.calls()
            .into_iter()
            .filter(RegistryCall::is_mutating)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn host_count(&self) -> usize {
        self.state.lock().unwrap().hosts.len()
    }

    pub fn machine_count(&self) -> usize {
        self.state.lock().unwrap().machines.len()
    }

    pub fn host_binding(&self, hostname: &str) -> Option<String> {
        self.state.lock().unwrap().hosts.get(hostname).cloned()
    }

    fn record(&self, call: RegistryCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn check_host_exists(&self, hostname: &str) -> ReconcilerResult<bool> {
        self.record(RegistryCall::CheckHostExists(hostname.to_string()));
        Ok(self.state.lock().unwrap().hosts.contains_key(hostname))
    }

    async fn delete_host(&self, hostname: &str) -> ReconcilerResult<()> {
        self.record(RegistryCall::DeleteHost(hostname.to_string()));
        let mut state = self.state.lock().unwrap();
        state
            .hosts
            .remove(hostname)
            .map(|_| ())
            .ok_or_else(|| ReconcilerError::Registry(format!("no such host: {hostname}")))
    }

    async fn search_machine_by_serial(&self, vm: &VmIdentity) -> ReconcilerResult<Option<String>> {
        self.record(RegistryCall::SearchMachineBySerial(vm.serial()));
        Ok(self.state.lock().unwrap().serials.get(&vm.serial()).cloned())
    }

    async fn search_host_by_machine(&self, machine: &str) -> ReconcilerResult<Option<String>> {
        self.record(RegistryCall::SearchHostByMachine(machine.to_string()));
        let state = self.state.lock().unwrap();
        Ok(state
            .hosts
            .iter()
            .find(|(_, m)| m.as_str() == machine)
            .map(|(h, _)| h.clone()))
    }

    async fn get_machine_details(&self, machine: &str) -> ReconcilerResult<MachineDetails> {
        self.record(RegistryCall::GetMachineDetails(machine.to_string()));
        self.state
            .lock()
            .unwrap()
            .machines
            .get(machine)
            .cloned()
            .ok_or_else(|| ReconcilerError::Registry(format!("no such machine: {machine}")))
    }

    async fn delete_address(&self, addr: Ipv4Addr, machine: &str) -> ReconcilerResult<()> {
        self.record(RegistryCall::DeleteAddress(addr, machine.to_string()));
        let mut state = self.state.lock().unwrap();
        let details = state
            .machines
            .get_mut(machine)
            .ok_or_else(|| ReconcilerError::Registry(format!("no such machine: {machine}")))?;
        let before = details.addresses.len();
        details.addresses.retain(|a| *a != addr);
        if details.addresses.len() == before {
            return Err(ReconcilerError::Registry(format!(
                "address {addr} not attached to {machine}"
            )));
        }
        Ok(())
    }

    async fn delete_interface(&self, machine: &str) -> ReconcilerResult<()> {
        self.record(RegistryCall::DeleteInterface(machine.to_string()));
        let mut state = self.state.lock().unwrap();
        let details = state
            .machines
            .get_mut(machine)
            .ok_or_else(|| ReconcilerError::Registry(format!("no such machine: {machine}")))?;
        let before = details.interfaces.len();
        details.interfaces.retain(|i| i != PRIMARY_INTERFACE);
        if details.interfaces.len() == before {
            return Err(ReconcilerError::Registry(format!(
                "interface {PRIMARY_INTERFACE} not attached to {machine}"
            )));
        }
        Ok(())
    }

    async fn delete_machine(&self, machine: &str) -> ReconcilerResult<()> {
        self.record(RegistryCall::DeleteMachine(machine.to_string()));
        let mut state = self.state.lock().unwrap();
        // The real registry refuses to delete a machine while a host record
        // is still bound to it
        if state.hosts.values().any(|m| m == machine) {
            return Err(ReconcilerError::Registry(format!(
                "machine {machine} still has a bound host"
            )));
        }
        state
            .machines
            .remove(machine)
            .map(|_| ())
            .ok_or_else(|| ReconcilerError::Registry(format!("no such machine: {machine}")))?;
        state.serials.retain(|_, m| m.as_str() != machine);
        Ok(())
    }

    async fn create_machine(
        &self,
        _event: &LifecycleEvent,
        vm: &VmIdentity,
    ) -> ReconcilerResult<String> {
        self.record(RegistryCall::CreateMachine(vm.serial()));
        let mut state = self.state.lock().unwrap();
        let machine = format!("vm{}", state.created);
        state.created += 1;
        state.machines.insert(machine.clone(), MachineDetails::default());
        state.serials.insert(vm.serial(), machine.clone());
        Ok(machine)
    }

    async fn add_machine_nics(
        &self,
        machine: &str,
        addresses: &[NetworkAddress],
    ) -> ReconcilerResult<()> {
        self.record(RegistryCall::AddMachineNics(
            machine.to_string(),
            addresses.len(),
        ));
        let mut state = self.state.lock().unwrap();
        let details = state
            .machines
            .get_mut(machine)
            .ok_or_else(|| ReconcilerError::Registry(format!("no such machine: {machine}")))?;
        for address in addresses {
            details.addresses.push(address.addr);
            details.interfaces.push(address.interface.clone());
        }
        Ok(())
    }

    async fn set_interface_bootable(&self, machine: &str, interface: &str) -> ReconcilerResult<()> {
        self.record(RegistryCall::SetInterfaceBootable(
            machine.to_string(),
            interface.to_string(),
        ));
        let state = self.state.lock().unwrap();
        let details = state
            .machines
            .get(machine)
            .ok_or_else(|| ReconcilerError::Registry(format!("no such machine: {machine}")))?;
        if !details.has_interface(interface) {
            return Err(ReconcilerError::Registry(format!(
                "interface {interface} not attached to {machine}"
            )));
        }
        Ok(())
    }

    async fn create_host(
        &self,
        _image: &ImageMetadata,
        addresses: &[NetworkAddress],
        machine: &str,
    ) -> ReconcilerResult<()> {
        let hostname = addresses
            .first()
            .and_then(|a| a.hostname.clone())
            .ok_or_else(|| ReconcilerError::Registry("no primary hostname".to_string()))?;
        self.record(RegistryCall::CreateHost(
            hostname.clone(),
            machine.to_string(),
        ));
        let mut state = self.state.lock().unwrap();
        if !state.machines.contains_key(machine) {
            return Err(ReconcilerError::Registry(format!(
                "no such machine: {machine}"
            )));
        }
        // Hostnames are unique; the real registry rejects duplicates
        if state.hosts.contains_key(&hostname) {
            return Err(ReconcilerError::Registry(format!(
                "host already exists: {hostname}"
            )));
        }
        state.hosts.insert(hostname, machine.to_string());
        Ok(())
    }

    async fn manage(
        &self,
        addresses: &[NetworkAddress],
        _image: &ImageMetadata,
    ) -> ReconcilerResult<()> {
        let hostname = addresses
            .first()
            .and_then(|a| a.hostname.clone())
            .unwrap_or_default();
        self.record(RegistryCall::Manage(hostname));
        Ok(())
    }

    async fn make(
        &self,
        addresses: &[NetworkAddress],
        _image: &ImageMetadata,
    ) -> ReconcilerResult<()> {
        let hostname = addresses
            .first()
            .and_then(|a| a.hostname.clone())
            .unwrap_or_default();
        self.record(RegistryCall::Make(hostname));
        Ok(())
    }
}

/// Control plane fake with adjustable VM existence and network details
pub struct FakeControlPlane {
    exists: Mutex<bool>,
    /// When set, the VM reports as existing for this many checks and as
    /// vanished afterwards; emulates deletion racing the workflow
    vanish_after: Mutex<Option<usize>>,
    image: VmImage,
    networks: Vec<NetworkAddress>,
    metadata_updates: Mutex<Vec<HashMap<String, String>>>,
}

impl FakeControlPlane {
    pub fn new(image: VmImage, networks: Vec<NetworkAddress>) -> Self {
        Self {
            exists: Mutex::new(true),
            vanish_after: Mutex::new(None),
            image,
            networks,
            metadata_updates: Mutex::new(Vec::new()),
        }
    }

    pub fn set_exists(&self, exists: bool) {
        *self.exists.lock().unwrap() = exists;
    }

    pub fn vanish_after_checks(&self, checks: usize) {
        *self.vanish_after.lock().unwrap() = Some(checks);
    }

    pub fn metadata_updates(&self) -> Vec<HashMap<String, String>> {
        self.metadata_updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn get_image(&self, _vm: &VmIdentity) -> ReconcilerResult<VmImage> {
        Ok(self.image.clone())
    }

    async fn check_machine_exists(&self, _vm: &VmIdentity) -> ReconcilerResult<bool> {
        if !*self.exists.lock().unwrap() {
            return Ok(false);
        }
        let mut vanish_after = self.vanish_after.lock().unwrap();
        match vanish_after.as_mut() {
            Some(0) => Ok(false),
            Some(n) => {
                *n -= 1;
                Ok(true)
            }
            None => Ok(true),
        }
    }

    async fn get_server_networks(&self, _vm: &VmIdentity) -> ReconcilerResult<Vec<NetworkAddress>> {
        Ok(self.networks.clone())
    }

    async fn update_metadata(
        &self,
        _vm: &VmIdentity,
        metadata: HashMap<String, String>,
    ) -> ReconcilerResult<()> {
        self.metadata_updates.lock().unwrap().push(metadata);
        Ok(())
    }
}

/// Resolver answering from a fixed table; unknown names do not resolve
#[derive(Debug, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Ipv4Addr>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, hostname: &str, addr: Ipv4Addr) -> Self {
        self.entries.insert(hostname.to_string(), addr);
        self
    }
}

#[async_trait]
impl NameResolver for StaticResolver {
    async fn resolve_ipv4(&self, hostname: &str) -> ReconcilerResult<Option<Ipv4Addr>> {
        Ok(self.entries.get(hostname).copied())
    }
}
