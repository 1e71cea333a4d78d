//! Error types for pvesync-core.

use crate::config::ConfigError;
use crate::hypervisor::ClientError;
use pvesync_vm::VmId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pvesync-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Hypervisor operation an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateVm,
    CreateVmTemplate,
    StartVm,
    StopVm,
    DeleteVm,
    CloneVm,
    UpdateVm,
    GetVmConfig,
    GetVmStatus,
    CreateVolume,
    ListVolumes,
    DeleteVolume,
    /// Polling a fresh clone until it is usable
    WaitClone,
    /// Polling a stopping guest until it is down
    WaitStop,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateVm => "create_vm",
            Self::CreateVmTemplate => "create_vm_template",
            Self::StartVm => "start_vm",
            Self::StopVm => "stop_vm",
            Self::DeleteVm => "delete_vm",
            Self::CloneVm => "clone_vm",
            Self::UpdateVm => "update_vm",
            Self::GetVmConfig => "get_vm_config",
            Self::GetVmStatus => "get_vm_current_status",
            Self::CreateVolume => "create_volume",
            Self::ListVolumes => "get_storage_volumes",
            Self::DeleteVolume => "delete_volume",
            Self::WaitClone => "wait_clone",
            Self::WaitStop => "wait_stop",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while reconciling a resource.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid declaration or persisted identifier
    #[error("invalid input: {0}")]
    Vm(#[from] pvesync_vm::VmError),

    /// A hypervisor call failed
    #[error("{op} failed on node '{node}' for '{target}': {source}")]
    Hypervisor {
        op: Operation,
        node: String,
        /// Guest id, volume id or storage name the call addressed
        target: String,
        #[source]
        source: ClientError,
    },

    /// Clone did not become usable in time
    #[error("clone of VM {vm_id} on node '{node}' not ready after {timeout:?}")]
    CloneTimeout {
        node: String,
        vm_id: VmId,
        timeout: Duration,
    },

    /// Guest was still running after the stop request
    #[error("VM {vm_id} on node '{node}' still running {timeout:?} after stop")]
    StopTimeout {
        node: String,
        vm_id: VmId,
        timeout: Duration,
    },

    /// The host cancelled the call
    #[error("{op} on node '{node}' for '{target}' cancelled")]
    Cancelled {
        op: Operation,
        node: String,
        target: String,
    },

    /// Invalid controller or provider configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CoreError {
    /// Wait timeouts: the operation may succeed if retried as a whole.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::CloneTimeout { .. } | Self::StopTimeout { .. })
    }

    /// The addressed guest or node no longer exists.
    pub fn is_absent(&self) -> bool {
        self.client_error().is_some_and(ClientError::is_absent)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The underlying client failure, if this error came from a call.
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            Self::Hypervisor { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The operation this error is attributed to, if any.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Hypervisor { op, .. } | Self::Cancelled { op, .. } => Some(*op),
            Self::CloneTimeout { .. } => Some(Operation::WaitClone),
            Self::StopTimeout { .. } => Some(Operation::WaitStop),
            Self::Vm(_) | Self::Config(_) => None,
        }
    }
}
