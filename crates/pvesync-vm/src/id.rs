//! Persisted resource identifiers.

use crate::error::{Result, VmError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric guest id, persisted as its decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VmId(u32);

impl VmId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl From<u32> for VmId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VmId {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u32>()
            .map(Self)
            .map_err(|_| VmError::InvalidIdentifier {
                kind: "vm",
                value: s.to_string(),
            })
    }
}

/// Storage volume identity: `<storage>:<vm_id>/<filename>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeId {
    pub storage: String,
    pub vm_id: VmId,
    pub filename: String,
}

impl VolumeId {
    pub fn new(storage: impl Into<String>, vm_id: impl Into<VmId>, filename: impl Into<String>) -> Self {
        Self {
            storage: storage.into(),
            vm_id: vm_id.into(),
            filename: filename.into(),
        }
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.storage, self.vm_id, self.filename)
    }
}

impl FromStr for VolumeId {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || VmError::InvalidIdentifier {
            kind: "volume",
            value: s.to_string(),
        };

        let (storage, rest) = s.split_once(':').ok_or_else(invalid)?;
        let (vm_id, filename) = rest.split_once('/').ok_or_else(invalid)?;
        if storage.is_empty() || filename.is_empty() {
            return Err(invalid());
        }
        let vm_id = vm_id.parse::<u32>().map_err(|_| invalid())?;

        Ok(Self::new(storage, vm_id, filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_id_round_trip() {
        let id = VmId::new(100);
        assert_eq!(id.to_string(), "100");
        assert_eq!("100".parse::<VmId>().unwrap(), id);
    }

    #[test]
    fn test_vm_id_rejects_garbage() {
        assert!("".parse::<VmId>().is_err());
        assert!("abc".parse::<VmId>().is_err());
        assert!("-1".parse::<VmId>().is_err());
    }

    #[test]
    fn test_volume_id_format() {
        let id = VolumeId::new("local-lvm", 100, "vm-100-disk-1");
        assert_eq!(id.to_string(), "local-lvm:100/vm-100-disk-1");
    }

    #[test]
    fn test_volume_id_parse() {
        let id: VolumeId = "local:200/vm-200-disk-0.qcow2".parse().unwrap();
        assert_eq!(id.storage, "local");
        assert_eq!(id.vm_id, VmId::new(200));
        assert_eq!(id.filename, "vm-200-disk-0.qcow2");
    }

    #[test]
    fn test_volume_id_parse_errors() {
        for bad in ["", "local", "local:abc/disk", ":100/disk", "local:100/", "local:100"] {
            assert_eq!(
                bad.parse::<VolumeId>(),
                Err(VmError::InvalidIdentifier {
                    kind: "volume",
                    value: bad.to_string(),
                }),
                "{bad:?} should not parse"
            );
        }
    }
}
