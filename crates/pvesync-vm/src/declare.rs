//! Declared attributes as handed over by the host.
//!
//! These types mirror the resource schema one-to-one. Every optional
//! attribute is an `Option` so "not declared" stays distinguishable from a
//! zero value, and device blocks keep their required fields optional too so
//! a missing field is reported as [`VmError::MissingField`] by the builder
//! instead of surfacing as an opaque deserialization failure.
//!
//! Keys a block does not map to the hypervisor API are collected in its
//! `unsupported` map and rejected when the block is turned into a device.

use crate::device::{
    Device, DeviceCategory, IdeDevice, NetworkDevice, SerialDevice, VirtioDevice,
};
use crate::error::{Result, VmError};
use crate::id::VmId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Declared attributes of a guest resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmDeclaration {
    pub node: String,
    pub vm_id: u32,
    /// Convert to a template after creation (one-way)
    #[serde(default)]
    pub template: bool,
    #[serde(default)]
    pub start_after_create: bool,
    #[serde(default)]
    pub clone: Option<CloneBlock>,
    #[serde(default)]
    pub args: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub smbios1: Option<String>,
    #[serde(default)]
    pub start_at_boot: Option<bool>,
    #[serde(default)]
    pub memory: Option<u32>,
    #[serde(default)]
    pub cores: Option<u32>,
    #[serde(default)]
    pub ide_devices: Option<Vec<IdeBlock>>,
    #[serde(default)]
    pub network_devices: Option<Vec<NetworkBlock>>,
    #[serde(default)]
    pub serial_devices: Option<Vec<SerialBlock>>,
    #[serde(default)]
    pub virtio_devices: Option<Vec<VirtioBlock>>,
}

impl VmDeclaration {
    /// A declaration with only the addressing attributes set.
    pub fn new(node: impl Into<String>, vm_id: u32) -> Self {
        Self {
            node: node.into(),
            vm_id,
            template: false,
            start_after_create: false,
            clone: None,
            args: None,
            name: None,
            smbios1: None,
            start_at_boot: None,
            memory: None,
            cores: None,
            ide_devices: None,
            network_devices: None,
            serial_devices: None,
            virtio_devices: None,
        }
    }
}

/// Clone source declaration.
///
/// `full` is a presence marker: any declared value requests a full clone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloneBlock {
    /// Source guest id, string-encoded
    pub source_id: Option<String>,
    pub full: Option<Value>,
}

impl CloneBlock {
    pub fn from_source(source_id: impl Into<String>) -> Self {
        Self {
            source_id: Some(source_id.into()),
            full: None,
        }
    }

    pub fn with_full(mut self) -> Self {
        self.full = Some(Value::Bool(true));
        self
    }

    pub fn is_full(&self) -> bool {
        self.full.is_some()
    }

    /// Parse the declared source guest id.
    ///
    /// # Errors
    /// [`VmError::MissingField`] when no `source_id` is declared and
    /// [`VmError::InvalidSourceId`] when it is not an integer.
    pub fn parse_source_id(&self) -> Result<VmId> {
        let raw = self.source_id.as_deref().ok_or(VmError::MissingField {
            category: "clone",
            field: "source_id",
        })?;
        raw.trim()
            .parse::<u32>()
            .map(VmId::new)
            .map_err(|_| VmError::InvalidSourceId(raw.to_string()))
    }
}

/// A declared device block of one category.
pub trait DeviceBlock {
    const CATEGORY: DeviceCategory;

    /// Declared slot number, if any.
    fn slot(&self) -> Option<u32>;

    /// Keys declared on the block that have no mapping.
    fn unsupported(&self) -> &BTreeMap<String, Value>;

    /// Validate required and enum fields and build the device.
    fn to_device(&self) -> Result<Device>;

    /// Validate the whole block and return its slot with the built device.
    fn resolve(&self) -> Result<(u32, Device)> {
        if let Some((field, _)) = self.unsupported().iter().find(|(_, v)| !v.is_null()) {
            return Err(VmError::UnsupportedField {
                category: Self::CATEGORY,
                field: field.clone(),
            });
        }
        let slot = self.slot().ok_or(VmError::MissingField {
            category: Self::CATEGORY.name(),
            field: "number",
        })?;
        Ok((slot, self.to_device()?))
    }
}

fn required<'a>(
    value: &'a Option<String>,
    category: DeviceCategory,
    field: &'static str,
) -> Result<&'a str> {
    value.as_deref().ok_or(VmError::MissingField {
        category: category.name(),
        field,
    })
}

/// Empty strings mean "let the hypervisor decide".
fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdeBlock {
    pub number: Option<u32>,
    pub file: Option<String>,
    pub media: Option<String>,
    #[serde(flatten)]
    pub unsupported: BTreeMap<String, Value>,
}

impl DeviceBlock for IdeBlock {
    const CATEGORY: DeviceCategory = DeviceCategory::Ide;

    fn slot(&self) -> Option<u32> {
        self.number
    }

    fn unsupported(&self) -> &BTreeMap<String, Value> {
        &self.unsupported
    }

    fn to_device(&self) -> Result<Device> {
        let file = required(&self.file, Self::CATEGORY, "file")?;
        let mut device = IdeDevice::new(file);
        if let Some(media) = non_empty(&self.media) {
            device = device.with_media(media.parse()?);
        }
        Ok(device.into())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkBlock {
    pub number: Option<u32>,
    pub model: Option<String>,
    pub bridge: Option<String>,
    pub macaddr: Option<String>,
    #[serde(flatten)]
    pub unsupported: BTreeMap<String, Value>,
}

impl DeviceBlock for NetworkBlock {
    const CATEGORY: DeviceCategory = DeviceCategory::Network;

    fn slot(&self) -> Option<u32> {
        self.number
    }

    fn unsupported(&self) -> &BTreeMap<String, Value> {
        &self.unsupported
    }

    fn to_device(&self) -> Result<Device> {
        let model = required(&self.model, Self::CATEGORY, "model")?.parse()?;
        Ok(NetworkDevice {
            model,
            bridge: non_empty(&self.bridge),
            macaddr: non_empty(&self.macaddr),
        }
        .into())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialBlock {
    pub number: Option<u32>,
    pub device: Option<String>,
    #[serde(flatten)]
    pub unsupported: BTreeMap<String, Value>,
}

impl DeviceBlock for SerialBlock {
    const CATEGORY: DeviceCategory = DeviceCategory::Serial;

    fn slot(&self) -> Option<u32> {
        self.number
    }

    fn unsupported(&self) -> &BTreeMap<String, Value> {
        &self.unsupported
    }

    fn to_device(&self) -> Result<Device> {
        let value = required(&self.device, Self::CATEGORY, "device")?;
        Ok(SerialDevice::new(value).into())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtioBlock {
    pub number: Option<u32>,
    pub file: Option<String>,
    pub size: Option<String>,
    pub cache: Option<String>,
    pub backup: Option<bool>,
    #[serde(flatten)]
    pub unsupported: BTreeMap<String, Value>,
}

impl DeviceBlock for VirtioBlock {
    const CATEGORY: DeviceCategory = DeviceCategory::VirtIO;

    fn slot(&self) -> Option<u32> {
        self.number
    }

    fn unsupported(&self) -> &BTreeMap<String, Value> {
        &self.unsupported
    }

    fn to_device(&self) -> Result<Device> {
        let file = required(&self.file, Self::CATEGORY, "file")?;
        Ok(VirtioDevice {
            file: file.to_string(),
            size: non_empty(&self.size),
            cache: non_empty(&self.cache),
            backup: self.backup,
        }
        .into())
    }
}

/// Declared attributes of a storage volume resource.
///
/// Every field forces replacement: a volume is never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDeclaration {
    pub node: String,
    pub storage_name: String,
    /// Owning guest id
    pub vm_id: u32,
    pub filename: String,
    /// Size with unit suffix, e.g. `10G`
    pub size: String,
}
