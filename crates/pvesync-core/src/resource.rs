//! Managed resources: declared attributes plus the persisted identifier.
//!
//! The host owns these values between calls and hands them to a controller
//! for each lifecycle operation. The identifier is the only state a
//! controller writes back, apart from attributes reflected by `read`.

use pvesync_vm::{Result, VmDeclaration, VmId, VolumeDeclaration, VolumeId};
use serde::{Deserialize, Serialize};

/// A managed guest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmResource {
    pub declared: VmDeclaration,
    /// Persisted identifier; `None` while the guest is absent.
    #[serde(default)]
    id: Option<String>,
}

impl VmResource {
    pub fn new(declared: VmDeclaration) -> Self {
        Self { declared, id: None }
    }

    /// Rebuild a resource from a previously persisted identifier.
    pub fn with_id(declared: VmDeclaration, id: impl Into<String>) -> Self {
        Self {
            declared,
            id: Some(id.into()),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.id.is_some()
    }

    pub(crate) fn set_id(&mut self, vm_id: VmId) {
        self.id = Some(vm_id.to_string());
    }

    pub(crate) fn clear_id(&mut self) {
        self.id = None;
    }

    /// The guest id to address: the persisted identifier when set, the
    /// declared id otherwise.
    pub fn vm_id(&self) -> Result<VmId> {
        match &self.id {
            Some(id) => id.parse(),
            None => Ok(VmId::new(self.declared.vm_id)),
        }
    }
}

/// A managed storage volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeResource {
    pub declared: VolumeDeclaration,
    #[serde(default)]
    id: Option<String>,
    /// Size in bytes last reported by the storage.
    #[serde(default)]
    pub observed_size: Option<u64>,
}

impl VolumeResource {
    pub fn new(declared: VolumeDeclaration) -> Self {
        Self {
            declared,
            id: None,
            observed_size: None,
        }
    }

    pub fn with_id(declared: VolumeDeclaration, id: impl Into<String>) -> Self {
        Self {
            declared,
            id: Some(id.into()),
            observed_size: None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.id.is_some()
    }

    /// The identifier the declared fields compose to.
    pub fn declared_volume_id(&self) -> VolumeId {
        VolumeId::new(
            self.declared.storage_name.clone(),
            self.declared.vm_id,
            self.declared.filename.clone(),
        )
    }

    /// Parse the persisted identifier, if any.
    pub fn volume_id(&self) -> Result<Option<VolumeId>> {
        self.id.as_deref().map(str::parse).transpose()
    }

    pub(crate) fn set_id(&mut self, id: &VolumeId) {
        self.id = Some(id.to_string());
    }

    pub(crate) fn clear_id(&mut self) {
        self.id = None;
        self.observed_size = None;
    }
}
