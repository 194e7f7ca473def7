//! Error kinds for the protobuf runtime core.
//!
//! Mirrors §7 of the core specification: codec-level corruption
//! ([`ProtoError::Malformed`]) propagates unchanged until the outermost
//! parse boundary, where [`crate::dynamic::DynamicBuilder::parse_from`]
//! wraps it (together with [`ProtoError::Uninitialized`]) into
//! [`ProtoError::InvalidProtocolBuffer`]. The remaining variants are local
//! programmer errors and are never caught or retried inside the crate.

use std::sync::Arc;

use crate::dynamic::DynamicMessage;

/// Errors produced by the field-set core, the wire codec, and the dynamic
/// message/builder pair.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    /// Corrupt wire data: truncated input, an overlong varint, invalid
    /// UTF-8 in a `string` field, a negative length, a limit violation, or
    /// recursion past [`ParseOptions::max_recursion_depth`].
    #[error("malformed protobuf wire data: {0}")]
    Malformed(String),

    /// `build()` was invoked while one or more `required` fields were
    /// unset. Carries the partial message for diagnostic introspection.
    #[error("message missing required fields: {0:?}")]
    Uninitialized {
        missing_fields: Vec<String>,
        partial: Arc<DynamicMessage>,
    },

    /// A value supplied to `set`/`add_repeated` failed `verify_type`.
    #[error("type mismatch on {containing_type}.{field_name}: expected {expected}, got {actual}")]
    TypeMismatch {
        containing_type: String,
        field_name: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Structural API misuse: `has` on a repeated field, indexed access on
    /// a singular field, etc.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// Indexed access past the end of a repeated sequence, or an indexed
    /// set on a field with no such repeated sequence yet.
    #[error("index {index} out of range (len {len})")]
    OutOfRange { index: usize, len: usize },

    /// Mutation attempted on a frozen `FieldSet` or `UnknownFieldSet`.
    #[error("mutation attempted on a frozen field set")]
    FrozenMutation,

    /// Top-level parse failure: wraps a `Malformed` or `Uninitialized`
    /// error encountered while parsing bytes into a message. All
    /// `parse_from` failures share this single category, per §7.
    #[error("invalid protocol buffer: {0}")]
    InvalidProtocolBuffer(Box<ProtoError>),
}

impl ProtoError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        ProtoError::Malformed(msg.into())
    }

    pub fn illegal_argument(msg: impl Into<String>) -> Self {
        ProtoError::IllegalArgument(msg.into())
    }

    /// Wraps `self` as the single top-level parse-failure category, unless
    /// it already is one.
    pub fn into_invalid_protocol_buffer(self) -> Self {
        match self {
            ProtoError::InvalidProtocolBuffer(_) => self,
            other => ProtoError::InvalidProtocolBuffer(Box::new(other)),
        }
    }
}

/// Caps recursion while merging nested sub-messages (§5, §9: default 100).
/// The only runtime-configurable knob the core specification names.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    pub max_recursion_depth: u32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            max_recursion_depth: 100,
        }
    }
}
