//! In-memory hypervisor used by the integration tests.
//!
//! Records every call in order, keeps a single guest's live config, serves
//! scripted status sequences and can be told to fail any operation.

#![allow(dead_code)]

use async_trait::async_trait;
use pvesync_core::{
    ClientError, ClientResult, ControllerConfig, HypervisorClient, PowerState, VmStatus,
    VolumeInfo,
};
use pvesync_vm::{CloneConfig, VmConfig, VmId, VolumeId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateVm {
        node: String,
        vm_id: u32,
        config: VmConfig,
    },
    CreateVmTemplate {
        node: String,
        vm_id: u32,
    },
    StartVm {
        node: String,
        vm_id: u32,
    },
    StopVm {
        node: String,
        vm_id: u32,
    },
    DeleteVm {
        node: String,
        vm_id: u32,
    },
    CloneVm {
        node: String,
        source: u32,
        new_id: u32,
        config: CloneConfig,
    },
    UpdateVm {
        node: String,
        vm_id: u32,
        config: VmConfig,
        reboot: bool,
    },
    GetVmConfig {
        node: String,
        vm_id: u32,
    },
    GetVmStatus {
        node: String,
        vm_id: u32,
    },
    CreateVolume {
        node: String,
        storage: String,
        vm_id: u32,
        filename: String,
        size: String,
    },
    ListVolumes {
        node: String,
        storage: String,
    },
    DeleteVolume {
        node: String,
        storage: String,
        volume: String,
    },
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateVm { .. } => "create_vm",
            Self::CreateVmTemplate { .. } => "create_vm_template",
            Self::StartVm { .. } => "start_vm",
            Self::StopVm { .. } => "stop_vm",
            Self::DeleteVm { .. } => "delete_vm",
            Self::CloneVm { .. } => "clone_vm",
            Self::UpdateVm { .. } => "update_vm",
            Self::GetVmConfig { .. } => "get_vm_config",
            Self::GetVmStatus { .. } => "get_vm_current_status",
            Self::CreateVolume { .. } => "create_volume",
            Self::ListVolumes { .. } => "get_storage_volumes",
            Self::DeleteVolume { .. } => "delete_volume",
        }
    }
}

struct State {
    calls: Vec<Call>,
    /// Live config of the guest; `None` while it does not exist.
    live: Option<VmConfig>,
    statuses: VecDeque<ClientResult<VmStatus>>,
    default_status: VmStatus,
    volumes: Vec<VolumeInfo>,
    failures: HashMap<&'static str, ClientError>,
    latencies: HashMap<&'static str, Duration>,
}

pub struct FakeHypervisor {
    state: Mutex<State>,
}

impl Default for FakeHypervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHypervisor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                calls: Vec::new(),
                live: None,
                statuses: VecDeque::new(),
                default_status: VmStatus::new(PowerState::Stopped),
                volumes: Vec::new(),
                failures: HashMap::new(),
                latencies: HashMap::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Pretend a guest with this config already exists.
    pub fn with_live_config(self, config: VmConfig) -> Self {
        self.state().live = Some(config);
        self
    }

    /// Status answers served in order before falling back to the default.
    pub fn with_statuses(self, statuses: impl IntoIterator<Item = ClientResult<VmStatus>>) -> Self {
        self.state().statuses.extend(statuses);
        self
    }

    pub fn with_default_status(self, status: VmStatus) -> Self {
        self.state().default_status = status;
        self
    }

    pub fn with_volumes(self, volumes: impl IntoIterator<Item = VolumeInfo>) -> Self {
        self.state().volumes.extend(volumes);
        self
    }

    /// Make every call of the named operation fail.
    pub fn failing(self, op: &'static str, err: ClientError) -> Self {
        self.state().failures.insert(op, err);
        self
    }

    /// Apply the named operation at once but hold its response back.
    pub fn with_latency(self, op: &'static str, delay: Duration) -> Self {
        self.state().latencies.insert(op, delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn call_names(&self) -> Vec<&'static str> {
        self.state().calls.iter().map(Call::name).collect()
    }

    pub fn live_config(&self) -> Option<VmConfig> {
        self.state().live.clone()
    }

    fn enter(&self, call: Call) -> ClientResult<MutexGuard<'_, State>> {
        let mut state = self.state();
        let name = call.name();
        state.calls.push(call);
        if let Some(err) = state.failures.get(name).cloned() {
            return Err(err);
        }
        Ok(state)
    }

    async fn respond(&self, op: &'static str) {
        let delay = self.state().latencies.get(op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn missing(node: &str, vm_id: VmId) -> ClientError {
    ClientError::VmDoesNotExist {
        node: node.to_string(),
        vm_id,
    }
}

#[async_trait]
impl HypervisorClient for FakeHypervisor {
    async fn create_vm(&self, node: &str, vm_id: VmId, config: &VmConfig) -> ClientResult<()> {
        self.enter(Call::CreateVm {
            node: node.into(),
            vm_id: vm_id.get(),
            config: config.clone(),
        })?
        .live = Some(config.clone());
        self.respond("create_vm").await;
        Ok(())
    }

    async fn create_vm_template(&self, node: &str, vm_id: VmId) -> ClientResult<()> {
        self.enter(Call::CreateVmTemplate {
            node: node.into(),
            vm_id: vm_id.get(),
        })?;
        Ok(())
    }

    async fn start_vm(&self, node: &str, vm_id: VmId) -> ClientResult<()> {
        let mut state = self.enter(Call::StartVm {
            node: node.into(),
            vm_id: vm_id.get(),
        })?;
        state.default_status = VmStatus::new(PowerState::Running);
        Ok(())
    }

    async fn stop_vm(&self, node: &str, vm_id: VmId) -> ClientResult<()> {
        self.enter(Call::StopVm {
            node: node.into(),
            vm_id: vm_id.get(),
        })?;
        Ok(())
    }

    async fn delete_vm(&self, node: &str, vm_id: VmId) -> ClientResult<()> {
        let mut state = self.enter(Call::DeleteVm {
            node: node.into(),
            vm_id: vm_id.get(),
        })?;
        state.live = None;
        Ok(())
    }

    async fn clone_vm(
        &self,
        node: &str,
        source: VmId,
        new_id: VmId,
        config: &CloneConfig,
    ) -> ClientResult<()> {
        self.enter(Call::CloneVm {
            node: node.into(),
            source: source.get(),
            new_id: new_id.get(),
            config: config.clone(),
        })?
        .live = Some(VmConfig {
            name: config.name.clone(),
            ..VmConfig::default()
        });
        self.respond("clone_vm").await;
        Ok(())
    }

    async fn update_vm(
        &self,
        node: &str,
        vm_id: VmId,
        config: &VmConfig,
        reboot: bool,
    ) -> ClientResult<()> {
        let mut state = self.enter(Call::UpdateVm {
            node: node.into(),
            vm_id: vm_id.get(),
            config: config.clone(),
            reboot,
        })?;
        let live = state.live.as_mut().ok_or_else(|| missing(node, vm_id))?;
        if config.cores.is_some() {
            live.cores = config.cores;
        }
        if config.memory.is_some() {
            live.memory = config.memory;
        }
        if config.name.is_some() {
            live.name = config.name.clone();
        }
        Ok(())
    }

    async fn get_vm_config(&self, node: &str, vm_id: VmId) -> ClientResult<VmConfig> {
        let state = self.enter(Call::GetVmConfig {
            node: node.into(),
            vm_id: vm_id.get(),
        })?;
        state.live.clone().ok_or_else(|| missing(node, vm_id))
    }

    async fn get_vm_current_status(&self, node: &str, vm_id: VmId) -> ClientResult<VmStatus> {
        let mut state = self.enter(Call::GetVmStatus {
            node: node.into(),
            vm_id: vm_id.get(),
        })?;
        match state.statuses.pop_front() {
            Some(scripted) => scripted,
            None => Ok(state.default_status.clone()),
        }
    }

    async fn create_volume(
        &self,
        node: &str,
        storage: &str,
        vm_id: VmId,
        filename: &str,
        size: &str,
    ) -> ClientResult<()> {
        let mut state = self.enter(Call::CreateVolume {
            node: node.into(),
            storage: storage.into(),
            vm_id: vm_id.get(),
            filename: filename.into(),
            size: size.into(),
        })?;
        state.volumes.push(VolumeInfo {
            volume_id: VolumeId::new(storage, vm_id, filename).to_string(),
            vm_id: Some(vm_id.get()),
            size: parse_size(size),
        });
        Ok(())
    }

    async fn get_storage_volumes(&self, node: &str, storage: &str) -> ClientResult<Vec<VolumeInfo>> {
        let state = self.enter(Call::ListVolumes {
            node: node.into(),
            storage: storage.into(),
        })?;
        let prefix = format!("{storage}:");
        Ok(state
            .volumes
            .iter()
            .filter(|v| v.volume_id.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn delete_volume(&self, node: &str, storage: &str, volume: &VolumeId) -> ClientResult<()> {
        let mut state = self.enter(Call::DeleteVolume {
            node: node.into(),
            storage: storage.into(),
            volume: volume.to_string(),
        })?;
        let id = volume.to_string();
        state.volumes.retain(|v| v.volume_id != id);
        Ok(())
    }
}

/// `10G` style sizes in bytes; anything else is unknown.
fn parse_size(size: &str) -> Option<u64> {
    let (digits, unit) = size.split_at(size.len().checked_sub(1)?);
    let multiplier = match unit {
        "K" => 1 << 10,
        "M" => 1 << 20,
        "G" => 1 << 30,
        _ => return None,
    };
    digits.parse::<u64>().ok().map(|n| n * multiplier)
}

/// One-second polls bounded at five seconds.
pub fn fast_config() -> ControllerConfig {
    ControllerConfig::builder()
        .poll_interval(Duration::from_secs(1))
        .clone_timeout(Duration::from_secs(5))
        .stop_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
