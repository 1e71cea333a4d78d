//! Assembling a [`VmConfig`] from declared attributes.

use crate::config::{CloneConfig, VmConfig};
use crate::declare::{DeviceBlock, VmDeclaration};
use crate::device::{Device, DeviceCategory};
use crate::error::{Result, VmError};
use std::collections::BTreeMap;

/// Fluent builder for [`VmConfig`].
///
/// Devices are validated as they are added, so a duplicate or out-of-range
/// slot fails at the call that introduced it. On any error the builder is
/// consumed and nothing partial is handed back.
///
/// # Example
///
/// ```
/// use pvesync_vm::{NetworkDevice, NetworkModel, VmConfigBuilder};
///
/// # fn example() -> pvesync_vm::Result<()> {
/// let config = VmConfigBuilder::new()
///     .cores(2)
///     .memory_mib(2048)
///     .device(0, NetworkDevice::new(NetworkModel::Virtio).with_bridge("vmbr0"))?
///     .build()?;
///
/// assert_eq!(config.to_qm_options()["net0"], "virtio,bridge=vmbr0");
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct VmConfigBuilder {
    config: VmConfig,
}

impl VmConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn args(mut self, args: impl Into<String>) -> Self {
        self.config.args = Some(args.into());
        self
    }

    /// Set the number of cores (must be > 0).
    pub fn cores(mut self, cores: u32) -> Self {
        self.config.cores = Some(cores);
        self
    }

    /// Set the memory size in MiB.
    pub fn memory_mib(mut self, mib: u32) -> Self {
        self.config.memory = Some(mib);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn smbios1(mut self, smbios1: impl Into<String>) -> Self {
        self.config.smbios1 = Some(smbios1.into());
        self
    }

    pub fn start_at_boot(mut self, start: bool) -> Self {
        self.config.start_at_boot = Some(start);
        self
    }

    /// Mark a device category as declared, even if no device follows.
    pub fn declare(mut self, category: DeviceCategory) -> Self {
        match category {
            DeviceCategory::Ide => touch(&mut self.config.ide_devices),
            DeviceCategory::Network => touch(&mut self.config.network_devices),
            DeviceCategory::Serial => touch(&mut self.config.serial_devices),
            DeviceCategory::VirtIO => touch(&mut self.config.virtio_devices),
        }
        self
    }

    /// Add a device at `slot` in its category.
    ///
    /// # Errors
    /// Fails on a slot that is already taken or out of range.
    pub fn device(mut self, slot: u32, device: impl Into<Device>) -> Result<Self> {
        let device = device.into();
        tracing::debug!(
            category = %device.category(),
            slot,
            option = %device.qm_option_value(),
            "Adding device"
        );
        self.config.add_device(slot, device)?;
        Ok(self)
    }

    /// Add every declared block of one category.
    pub fn blocks<B: DeviceBlock>(mut self, blocks: Option<&[B]>) -> Result<Self> {
        let Some(blocks) = blocks else {
            return Ok(self);
        };
        self = self.declare(B::CATEGORY);
        for block in blocks {
            let (slot, device) = block.resolve()?;
            self = self.device(slot, device)?;
        }
        Ok(self)
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<VmConfig> {
        if self.config.cores == Some(0) {
            return Err(VmError::InvalidValue {
                field: "cores",
                reason: "must be greater than 0".into(),
            });
        }
        Ok(self.config)
    }
}

fn touch<T>(map: &mut Option<BTreeMap<u32, T>>) {
    map.get_or_insert_with(BTreeMap::new);
}

/// Build the full configuration for a declaration.
///
/// Only attributes the declaration actually sets are copied. Device blocks
/// are resolved category by category; the first invalid block aborts the
/// whole build.
pub fn build(decl: &VmDeclaration) -> Result<VmConfig> {
    let mut builder = VmConfigBuilder::new();

    if let Some(args) = &decl.args {
        builder = builder.args(args);
    }
    if let Some(cores) = decl.cores {
        builder = builder.cores(cores);
    }
    if let Some(memory) = decl.memory {
        builder = builder.memory_mib(memory);
    }
    if let Some(name) = &decl.name {
        builder = builder.name(name);
    }
    if let Some(smbios1) = &decl.smbios1 {
        builder = builder.smbios1(smbios1);
    }
    if let Some(start) = decl.start_at_boot {
        builder = builder.start_at_boot(start);
    }

    let config = builder
        .blocks(decl.ide_devices.as_deref())?
        .blocks(decl.network_devices.as_deref())?
        .blocks(decl.serial_devices.as_deref())?
        .blocks(decl.virtio_devices.as_deref())?
        .build()?;

    tracing::debug!(node = %decl.node, vm_id = decl.vm_id, ?config, "Built VM config");
    Ok(config)
}

/// Build the reduced configuration patched onto a freshly cloned guest:
/// network devices, cores and memory only.
pub fn build_update_only(decl: &VmDeclaration) -> Result<VmConfig> {
    let mut builder = VmConfigBuilder::new();

    if let Some(cores) = decl.cores {
        builder = builder.cores(cores);
    }
    if let Some(memory) = decl.memory {
        builder = builder.memory_mib(memory);
    }

    let config = builder.blocks(decl.network_devices.as_deref())?.build()?;

    tracing::debug!(node = %decl.node, vm_id = decl.vm_id, ?config, "Built post-clone update config");
    Ok(config)
}

/// Build the clone-time overrides: the declared name and the full-clone marker.
pub fn build_clone_config(decl: &VmDeclaration) -> CloneConfig {
    CloneConfig {
        name: decl.name.clone(),
        full: decl
            .clone
            .as_ref()
            .filter(|block| block.is_full())
            .map(|_| true),
    }
}
