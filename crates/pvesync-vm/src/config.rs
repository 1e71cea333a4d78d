//! Structured guest configuration.
//!
//! Every field is optional: `None` means "not declared, leave the live value
//! alone", which is different from an explicit `0`, `false` or `""`. The
//! same holds for the device maps, where `None` and an empty map differ.

use crate::device::{
    Device, DeviceCategory, IdeDevice, NetworkDevice, SerialDevice, VirtioDevice,
};
use crate::error::{Result, VmError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Desired or observed configuration of a QEMU guest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    /// Extra arguments passed to QEMU
    pub args: Option<String>,
    /// Cores per socket
    pub cores: Option<u32>,
    /// Memory in MiB
    pub memory: Option<u32>,
    pub name: Option<String>,
    /// SMBIOS type 1 fields
    pub smbios1: Option<String>,
    pub start_at_boot: Option<bool>,
    pub ide_devices: Option<BTreeMap<u32, IdeDevice>>,
    pub network_devices: Option<BTreeMap<u32, NetworkDevice>>,
    pub serial_devices: Option<BTreeMap<u32, SerialDevice>>,
    pub virtio_devices: Option<BTreeMap<u32, VirtioDevice>>,
}

impl VmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a device into its category's slot map.
    ///
    /// # Errors
    /// Fails if the slot is out of range or already taken; the config is
    /// left unchanged in that case.
    pub fn add_device(&mut self, slot: u32, device: Device) -> Result<()> {
        let category = device.category();
        category.check_slot(slot)?;
        match device {
            Device::Ide(d) => insert_slot(&mut self.ide_devices, category, slot, d),
            Device::Network(d) => insert_slot(&mut self.network_devices, category, slot, d),
            Device::Serial(d) => insert_slot(&mut self.serial_devices, category, slot, d),
            Device::VirtIO(d) => insert_slot(&mut self.virtio_devices, category, slot, d),
        }
    }

    pub fn add_ide_device(&mut self, slot: u32, device: IdeDevice) -> Result<()> {
        self.add_device(slot, device.into())
    }

    pub fn add_network_device(&mut self, slot: u32, device: NetworkDevice) -> Result<()> {
        self.add_device(slot, device.into())
    }

    pub fn add_serial_device(&mut self, slot: u32, device: SerialDevice) -> Result<()> {
        self.add_device(slot, device.into())
    }

    pub fn add_virtio_device(&mut self, slot: u32, device: VirtioDevice) -> Result<()> {
        self.add_device(slot, device.into())
    }

    /// All declared devices with their slot, ordered by category then slot.
    pub fn devices(&self) -> Vec<(u32, Device)> {
        let mut devices = Vec::new();
        collect(&mut devices, &self.ide_devices);
        collect(&mut devices, &self.network_devices);
        collect(&mut devices, &self.serial_devices);
        collect(&mut devices, &self.virtio_devices);
        devices
    }

    /// True when nothing at all is declared.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Flatten into the parameter map accepted by the hypervisor's config
    /// endpoints. Undeclared fields are omitted.
    pub fn to_qm_options(&self) -> BTreeMap<String, String> {
        let mut options = BTreeMap::new();
        if let Some(args) = &self.args {
            options.insert("args".to_string(), args.clone());
        }
        if let Some(cores) = self.cores {
            options.insert("cores".to_string(), cores.to_string());
        }
        if let Some(memory) = self.memory {
            options.insert("memory".to_string(), memory.to_string());
        }
        if let Some(name) = &self.name {
            options.insert("name".to_string(), name.clone());
        }
        if let Some(smbios1) = &self.smbios1 {
            options.insert("smbios1".to_string(), smbios1.clone());
        }
        if let Some(onboot) = self.start_at_boot {
            options.insert("onboot".to_string(), u8::from(onboot).to_string());
        }
        for (slot, device) in self.devices() {
            options.insert(
                device.category().option_key(slot),
                device.qm_option_value(),
            );
        }
        options
    }
}

fn insert_slot<T>(
    map: &mut Option<BTreeMap<u32, T>>,
    category: DeviceCategory,
    slot: u32,
    device: T,
) -> Result<()> {
    let map = map.get_or_insert_with(BTreeMap::new);
    if map.contains_key(&slot) {
        return Err(VmError::DuplicateSlot { category, slot });
    }
    map.insert(slot, device);
    Ok(())
}

fn collect<T>(out: &mut Vec<(u32, Device)>, map: &Option<BTreeMap<u32, T>>)
where
    T: Clone + Into<Device>,
{
    if let Some(map) = map {
        out.extend(map.iter().map(|(slot, d)| (*slot, d.clone().into())));
    }
}

/// Overrides applied when cloning a guest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneConfig {
    /// Name of the new guest
    pub name: Option<String>,
    /// Full copy instead of a linked clone; `None` keeps the hypervisor default
    pub full: Option<bool>,
}

impl CloneConfig {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.full.is_none()
    }

    pub fn to_qm_options(&self) -> BTreeMap<String, String> {
        let mut options = BTreeMap::new();
        if let Some(name) = &self.name {
            options.insert("name".to_string(), name.clone());
        }
        if let Some(full) = self.full {
            options.insert("full".to_string(), u8::from(full).to_string());
        }
        options
    }
}
