//! # pvesync-vm
//!
//! Device model and configuration builder for Proxmox QEMU guests.
//!
//! This crate turns the attributes a host declares for a guest into the
//! structured configuration the hypervisor API consumes. It performs no I/O;
//! everything here is pure validation and construction.
//!
//! ## Quick Start
//!
//! ```
//! use pvesync_vm::{builder, NetworkBlock, VmDeclaration};
//!
//! # fn example() -> pvesync_vm::Result<()> {
//! let decl = VmDeclaration {
//!     cores: Some(2),
//!     memory: Some(2048),
//!     network_devices: Some(vec![NetworkBlock {
//!         number: Some(0),
//!         model: Some("virtio".into()),
//!         bridge: Some("vmbr0".into()),
//!         ..Default::default()
//!     }]),
//!     ..VmDeclaration::new("pve1", 100)
//! };
//!
//! let config = builder::build(&decl)?;
//! let options = config.to_qm_options();
//! assert_eq!(options["cores"], "2");
//! assert_eq!(options["net0"], "virtio,bridge=vmbr0");
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Features
//!
//! - **Device Model**: IDE, network, serial and VirtIO devices keyed by slot
//! - **Closed Enums**: media kind and NIC model parsed strictly from strings
//! - **Absent vs. Zero**: every field distinguishes "not declared" from empty
//! - **Identifiers**: round-trippable guest and volume identifiers

pub mod builder;
mod config;
mod declare;
mod device;
mod error;
mod id;

pub use builder::VmConfigBuilder;
pub use config::{CloneConfig, VmConfig};
pub use declare::{
    CloneBlock, DeviceBlock, IdeBlock, NetworkBlock, SerialBlock, VirtioBlock, VmDeclaration,
    VolumeDeclaration,
};
pub use device::{
    Device, DeviceCategory, IdeDevice, MediaType, NetworkDevice, NetworkModel, SerialDevice,
    VirtioDevice,
};
pub use error::{Result, VmError};
pub use id::{VmId, VolumeId};
