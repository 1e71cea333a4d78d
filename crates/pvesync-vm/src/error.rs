//! Error types for pvesync-vm.

use crate::device::DeviceCategory;
use thiserror::Error;

/// Result type alias for pvesync-vm operations.
pub type Result<T> = std::result::Result<T, VmError>;

/// Errors raised while validating declared attributes or assembling a config.
///
/// All of these are input errors: they are fatal to the current call and
/// are never worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// A required field was not declared
    #[error("{category}: missing required field '{field}'")]
    MissingField {
        category: &'static str,
        field: &'static str,
    },

    /// A closed-enum field was given a token outside its set
    #[error("invalid value '{value}' for '{field}', expected one of: {valid}")]
    InvalidEnumValue {
        field: &'static str,
        value: String,
        valid: String,
    },

    /// Two blocks of one category declared the same slot number
    #[error("{category}: slot {slot} declared more than once")]
    DuplicateSlot { category: DeviceCategory, slot: u32 },

    /// Slot number beyond what the hypervisor exposes for the category
    #[error("{category}: slot {slot} out of range (max {max})")]
    SlotOutOfRange {
        category: DeviceCategory,
        slot: u32,
        max: u32,
    },

    /// A field that is accepted by the schema but not mapped to the API
    #[error("{category}: field '{field}' is not supported")]
    UnsupportedField { category: DeviceCategory, field: String },

    /// A scalar value outside its allowed domain
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// The clone block's source_id is not an integer
    #[error("invalid clone source_id '{0}'")]
    InvalidSourceId(String),

    /// A persisted identifier that does not parse back to its parts
    #[error("invalid {kind} identifier '{value}'")]
    InvalidIdentifier { kind: &'static str, value: String },
}
