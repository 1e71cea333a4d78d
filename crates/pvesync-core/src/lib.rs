//! # pvesync-core
//!
//! Lifecycle reconciliation of Proxmox QEMU guests and storage volumes.
//!
//! A host owns declared resources and calls into the controllers here for
//! each create, read, update or delete. The controllers translate the
//! declaration into ordered hypervisor calls and keep the persisted
//! identifier consistent with what actually exists.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                     pvesync-core                           │
//! ├────────────────────────────────────────────────────────────┤
//! │                                                            │
//! │  ┌─────────────────┐     ┌──────────────────────────────┐  │
//! │  │  VmController   │────▶│  pvesync-vm                  │  │
//! │  │   - create()    │     │  (VmDeclaration -> VmConfig) │  │
//! │  │   - read()      │     └──────────────────────────────┘  │
//! │  │   - update()    │                                       │
//! │  │   - delete()    │────▶ poll_until (clone / stop waits)  │
//! │  └─────────────────┘                                       │
//! │           │              ┌──────────────────────────────┐  │
//! │  ┌─────────────────┐     │  dyn HypervisorClient        │  │
//! │  │VolumeController │────▶│  (supplied by the host)      │  │
//! │  └─────────────────┘     └──────────────────────────────┘  │
//! │                                                            │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use pvesync_core::{ControllerConfig, VmController, VmResource};
//! use pvesync_vm::VmDeclaration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(client: std::sync::Arc<dyn pvesync_core::HypervisorClient>) -> pvesync_core::Result<()> {
//! let controller = VmController::new(client, ControllerConfig::from_env())?;
//! let cancel = CancellationToken::new();
//!
//! let mut vm = VmResource::new(VmDeclaration {
//!     cores: Some(2),
//!     memory: Some(2048),
//!     ..VmDeclaration::new("pve1", 100)
//! });
//!
//! controller.create(&mut vm, &cancel).await?;
//! assert_eq!(vm.id(), Some("100"));
//!
//! controller.delete(&mut vm, &cancel).await?;
//! assert!(!vm.exists());
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Clone-then-patch**: clones wait for the hypervisor to release its lock
//!   before network devices, cores and memory are applied
//! - **Safe Teardown**: running guests are stopped and awaited before deletion
//! - **Drift Detection**: a vanished guest, node or volume clears the identifier
//! - **Cancellation**: every call and poll loop honors a `CancellationToken`

mod config;
mod error;
mod hypervisor;
mod lifecycle;
mod resource;
mod volume;
mod wait;

pub use config::{
    ConfigError, ControllerConfig, ControllerConfigBuilder, ProviderConfig,
    DEFAULT_CLONE_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_STOP_TIMEOUT,
};
pub use error::{CoreError, Operation, Result};
pub use hypervisor::{
    ClientError, ClientResult, HypervisorClient, PowerState, VmStatus, VolumeInfo,
};
pub use lifecycle::VmController;
pub use resource::{VmResource, VolumeResource};
pub use volume::VolumeController;
pub use wait::{poll_until, PollPolicy, WaitError};
