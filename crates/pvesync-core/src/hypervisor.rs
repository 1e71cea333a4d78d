//! The hypervisor client seam.
//!
//! Controllers never talk to the cluster directly: they are handed an
//! implementation of [`HypervisorClient`] and issue every request through it.
//! Transport, authentication and the wire format live behind the trait.

use crate::error::{CoreError, Operation, Result};
use async_trait::async_trait;
use pvesync_vm::{CloneConfig, VmConfig, VmId, VolumeId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Result type alias for hypervisor client calls.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Failures reported by a [`HypervisorClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No guest with this id on the node
    #[error("VM {vm_id} does not exist on node '{node}'")]
    VmDoesNotExist { node: String, vm_id: VmId },

    /// The node itself is unknown to the cluster
    #[error("node '{node}' does not exist")]
    NodeDoesNotExist { node: String },

    /// The API rejected the request
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The request never got an answer
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// True for errors that mean the addressed guest is gone.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            Self::VmDoesNotExist { .. } | Self::NodeDoesNotExist { .. }
        )
    }
}

/// Power state reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    Running,
    Stopped,
    Paused,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Paused => write!(f, "paused"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Current runtime status of a guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmStatus {
    pub status: PowerState,
    /// Pending operation holding the guest's config lock (`clone`, `backup`, ...)
    #[serde(default)]
    pub lock: Option<String>,
}

impl VmStatus {
    pub fn new(status: PowerState) -> Self {
        Self { status, lock: None }
    }

    pub fn locked(status: PowerState, lock: impl Into<String>) -> Self {
        Self {
            status,
            lock: Some(lock.into()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == PowerState::Running
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }
}

/// A volume as listed by a storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// Full identifier, `<storage>:<vm_id>/<filename>`
    pub volume_id: String,
    /// Owning guest, if any
    #[serde(default)]
    pub vm_id: Option<u32>,
    /// Size in bytes
    #[serde(default)]
    pub size: Option<u64>,
}

/// Imperative operations against a hypervisor cluster.
///
/// Every call is addressed by node plus guest id (or storage) and either
/// succeeds or returns a [`ClientError`]. Implementations are expected to
/// serialize or reject conflicting concurrent requests themselves.
#[async_trait]
pub trait HypervisorClient: Send + Sync {
    /// Create a new guest from a full configuration.
    async fn create_vm(&self, node: &str, vm_id: VmId, config: &VmConfig) -> ClientResult<()>;

    /// Convert a guest into a template. There is no way back.
    async fn create_vm_template(&self, node: &str, vm_id: VmId) -> ClientResult<()>;

    async fn start_vm(&self, node: &str, vm_id: VmId) -> ClientResult<()>;

    /// Request a stop. Returns once the request is accepted; the guest may
    /// still be running for a while afterwards.
    async fn stop_vm(&self, node: &str, vm_id: VmId) -> ClientResult<()>;

    async fn delete_vm(&self, node: &str, vm_id: VmId) -> ClientResult<()>;

    /// Start cloning `source` into `new_id`. Completion is asynchronous.
    async fn clone_vm(
        &self,
        node: &str,
        source: VmId,
        new_id: VmId,
        config: &CloneConfig,
    ) -> ClientResult<()>;

    /// Apply the fields present in `config`; absent fields stay untouched.
    async fn update_vm(
        &self,
        node: &str,
        vm_id: VmId,
        config: &VmConfig,
        reboot: bool,
    ) -> ClientResult<()>;

    async fn get_vm_config(&self, node: &str, vm_id: VmId) -> ClientResult<VmConfig>;

    async fn get_vm_current_status(&self, node: &str, vm_id: VmId) -> ClientResult<VmStatus>;

    async fn create_volume(
        &self,
        node: &str,
        storage: &str,
        vm_id: VmId,
        filename: &str,
        size: &str,
    ) -> ClientResult<()>;

    async fn get_storage_volumes(&self, node: &str, storage: &str) -> ClientResult<Vec<VolumeInfo>>;

    async fn delete_volume(&self, node: &str, storage: &str, volume: &VolumeId) -> ClientResult<()>;
}

/// Run one client call, racing it against cancellation and attaching the
/// operation and address to any failure.
///
/// Only for calls that are safe to abandon mid-flight: reads, and mutations
/// whose outcome does not decide the persisted identifier.
pub(crate) async fn dispatch<T, F>(
    op: Operation,
    node: &str,
    target: &(dyn fmt::Display + Sync),
    cancel: &CancellationToken,
    call: F,
) -> Result<T>
where
    F: Future<Output = ClientResult<T>>,
{
    tokio::select! {
        biased;

        _ = cancel.cancelled() => {
            tracing::debug!(%op, node, %target, "Call cancelled");
            Err(cancelled(op, node, target))
        }

        result = call => result.map_err(|source| failed(op, node, target, source)),
    }
}

/// Run a call that must complete once issued.
///
/// Cancellation is honored only before the request goes out.
pub(crate) async fn dispatch_committed<T, F>(
    op: Operation,
    node: &str,
    target: &(dyn fmt::Display + Sync),
    cancel: &CancellationToken,
    call: F,
) -> Result<T>
where
    F: Future<Output = ClientResult<T>>,
{
    if cancel.is_cancelled() {
        tracing::debug!(%op, node, %target, "Call cancelled before issue");
        return Err(cancelled(op, node, target));
    }
    call.await.map_err(|source| failed(op, node, target, source))
}

pub(crate) fn cancelled(op: Operation, node: &str, target: &dyn fmt::Display) -> CoreError {
    CoreError::Cancelled {
        op,
        node: node.to_string(),
        target: target.to_string(),
    }
}

fn failed(op: Operation, node: &str, target: &dyn fmt::Display, source: ClientError) -> CoreError {
    CoreError::Hypervisor {
        op,
        node: node.to_string(),
        target: target.to_string(),
        source,
    }
}
