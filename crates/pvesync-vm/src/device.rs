//! Device model for QEMU guests.
//!
//! Every device lives in one of four categories and is addressed by a slot
//! number within that category. Each device renders to the single option
//! string the hypervisor API expects under the `<prefix><slot>` key, for
//! example `net0` = `virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0`.

use crate::error::{Result, VmError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category a device belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceCategory {
    /// IDE disks and CD-ROM drives
    Ide,
    /// Network interface cards
    Network,
    /// Serial ports
    Serial,
    /// VirtIO block devices
    VirtIO,
}

impl DeviceCategory {
    /// Name of the declared block this category is read from.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ide => "ide_device",
            Self::Network => "network_device",
            Self::Serial => "serial_device",
            Self::VirtIO => "virtio_device",
        }
    }

    /// Prefix of the API option key (`ide0`, `net1`, ...).
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Self::Ide => "ide",
            Self::Network => "net",
            Self::Serial => "serial",
            Self::VirtIO => "virtio",
        }
    }

    /// Number of slots the hypervisor exposes for this category.
    pub fn slot_count(&self) -> u32 {
        match self {
            Self::Ide => 4,
            Self::Network => 32,
            Self::Serial => 4,
            Self::VirtIO => 16,
        }
    }

    /// Full option key for a slot.
    pub fn option_key(&self, slot: u32) -> String {
        format!("{}{}", self.key_prefix(), slot)
    }

    /// Check that `slot` is addressable in this category.
    pub fn check_slot(&self, slot: u32) -> Result<()> {
        if slot >= self.slot_count() {
            return Err(VmError::SlotOutOfRange {
                category: *self,
                slot,
                max: self.slot_count() - 1,
            });
        }
        Ok(())
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Media kind of an IDE drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Cdrom,
    Disk,
}

impl MediaType {
    const ALL: [MediaType; 2] = [MediaType::Cdrom, MediaType::Disk];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cdrom => "cdrom",
            Self::Disk => "disk",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| VmError::InvalidEnumValue {
                field: "media",
                value: s.to_string(),
                valid: join_tokens(Self::ALL.iter().map(|m| m.as_str())),
            })
    }
}

/// Emulated network card model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkModel {
    #[serde(rename = "e1000")]
    E1000,
    #[serde(rename = "e1000-82540em")]
    E100082540em,
    #[serde(rename = "e1000-82544gc")]
    E100082544gc,
    #[serde(rename = "e1000-82545em")]
    E100082545em,
    #[serde(rename = "e1000e")]
    E1000e,
    #[serde(rename = "i82551")]
    I82551,
    #[serde(rename = "i82557b")]
    I82557b,
    #[serde(rename = "i82559er")]
    I82559er,
    #[serde(rename = "ne2k_isa")]
    Ne2kIsa,
    #[serde(rename = "ne2k_pci")]
    Ne2kPci,
    #[serde(rename = "pcnet")]
    Pcnet,
    #[serde(rename = "rtl8139")]
    Rtl8139,
    #[serde(rename = "virtio")]
    Virtio,
    #[serde(rename = "vmxnet3")]
    Vmxnet3,
}

impl NetworkModel {
    const ALL: [NetworkModel; 14] = [
        NetworkModel::E1000,
        NetworkModel::E100082540em,
        NetworkModel::E100082544gc,
        NetworkModel::E100082545em,
        NetworkModel::E1000e,
        NetworkModel::I82551,
        NetworkModel::I82557b,
        NetworkModel::I82559er,
        NetworkModel::Ne2kIsa,
        NetworkModel::Ne2kPci,
        NetworkModel::Pcnet,
        NetworkModel::Rtl8139,
        NetworkModel::Virtio,
        NetworkModel::Vmxnet3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E1000 => "e1000",
            Self::E100082540em => "e1000-82540em",
            Self::E100082544gc => "e1000-82544gc",
            Self::E100082545em => "e1000-82545em",
            Self::E1000e => "e1000e",
            Self::I82551 => "i82551",
            Self::I82557b => "i82557b",
            Self::I82559er => "i82559er",
            Self::Ne2kIsa => "ne2k_isa",
            Self::Ne2kPci => "ne2k_pci",
            Self::Pcnet => "pcnet",
            Self::Rtl8139 => "rtl8139",
            Self::Virtio => "virtio",
            Self::Vmxnet3 => "vmxnet3",
        }
    }
}

impl fmt::Display for NetworkModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkModel {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| VmError::InvalidEnumValue {
                field: "model",
                value: s.to_string(),
                valid: join_tokens(Self::ALL.iter().map(|m| m.as_str())),
            })
    }
}

fn join_tokens<'a>(tokens: impl Iterator<Item = &'a str>) -> String {
    tokens.collect::<Vec<_>>().join(", ")
}

/// IDE drive: a volume reference or ISO image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeDevice {
    /// Volume reference, e.g. `local:iso/debian.iso`
    pub file: String,
    pub media: Option<MediaType>,
}

impl IdeDevice {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            media: None,
        }
    }

    pub fn with_media(mut self, media: MediaType) -> Self {
        self.media = Some(media);
        self
    }

    pub fn qm_option_value(&self) -> String {
        let mut value = self.file.clone();
        if let Some(media) = self.media {
            value.push_str(&format!(",media={media}"));
        }
        value
    }
}

/// Network interface card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDevice {
    pub model: NetworkModel,
    /// Host bridge to attach to, e.g. `vmbr0`
    pub bridge: Option<String>,
    /// Fixed MAC address; unset lets the hypervisor assign one
    pub macaddr: Option<String>,
}

impl NetworkDevice {
    pub fn new(model: NetworkModel) -> Self {
        Self {
            model,
            bridge: None,
            macaddr: None,
        }
    }

    pub fn with_bridge(mut self, bridge: impl Into<String>) -> Self {
        self.bridge = Some(bridge.into());
        self
    }

    pub fn with_macaddr(mut self, macaddr: impl Into<String>) -> Self {
        self.macaddr = Some(macaddr.into());
        self
    }

    pub fn qm_option_value(&self) -> String {
        let mut value = self.model.to_string();
        if let Some(mac) = &self.macaddr {
            value.push('=');
            value.push_str(mac);
        }
        if let Some(bridge) = &self.bridge {
            value.push_str(&format!(",bridge={bridge}"));
        }
        value
    }
}

/// Serial port, passed through to the API verbatim (`socket`, `/dev/ttyS0`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialDevice {
    pub value: String,
}

impl SerialDevice {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn qm_option_value(&self) -> String {
        self.value.clone()
    }
}

/// VirtIO block device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtioDevice {
    /// Volume reference, e.g. `local-lvm:vm-100-disk-0`
    pub file: String,
    pub size: Option<String>,
    pub cache: Option<String>,
    pub backup: Option<bool>,
}

impl VirtioDevice {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            size: None,
            cache: None,
            backup: None,
        }
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn with_cache(mut self, cache: impl Into<String>) -> Self {
        self.cache = Some(cache.into());
        self
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn qm_option_value(&self) -> String {
        let mut value = self.file.clone();
        if let Some(cache) = &self.cache {
            value.push_str(&format!(",cache={cache}"));
        }
        if let Some(backup) = self.backup {
            value.push_str(&format!(",backup={}", u8::from(backup)));
        }
        if let Some(size) = &self.size {
            value.push_str(&format!(",size={size}"));
        }
        value
    }
}

/// A device of any category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    Ide(IdeDevice),
    Network(NetworkDevice),
    Serial(SerialDevice),
    VirtIO(VirtioDevice),
}

impl Device {
    pub fn category(&self) -> DeviceCategory {
        match self {
            Self::Ide(_) => DeviceCategory::Ide,
            Self::Network(_) => DeviceCategory::Network,
            Self::Serial(_) => DeviceCategory::Serial,
            Self::VirtIO(_) => DeviceCategory::VirtIO,
        }
    }

    /// Render the option string sent to the hypervisor for this device.
    pub fn qm_option_value(&self) -> String {
        match self {
            Self::Ide(d) => d.qm_option_value(),
            Self::Network(d) => d.qm_option_value(),
            Self::Serial(d) => d.qm_option_value(),
            Self::VirtIO(d) => d.qm_option_value(),
        }
    }
}

impl From<IdeDevice> for Device {
    fn from(device: IdeDevice) -> Self {
        Self::Ide(device)
    }
}

impl From<NetworkDevice> for Device {
    fn from(device: NetworkDevice) -> Self {
        Self::Network(device)
    }
}

impl From<SerialDevice> for Device {
    fn from(device: SerialDevice) -> Self {
        Self::Serial(device)
    }
}

impl From<VirtioDevice> for Device {
    fn from(device: VirtioDevice) -> Self {
        Self::VirtIO(device)
    }
}
