//! Runtime core of a Protocol Buffers library: the descriptor-driven
//! [`field_set::FieldSet`] abstraction underlying both a fully dynamic
//! message ([`dynamic::DynamicMessage`]) and the extension storage of a
//! code-generated one (see [`message::examples`] for a worked example of
//! the latter).
//!
//! # Scope
//!
//! In scope: the wire codec, the descriptor data model, unknown-field
//! preservation, the field-set core (get/set/merge/verify), the dynamic
//! message/builder pair, and the `Message`/`Builder` contract a generated
//! type implements to plug into the same reflective machinery.
//!
//! Out of scope: the `.proto` compiler and descriptor builder, code
//! generation, RPC, text format, JSON mapping, and reflection-based DTO
//! binding. Descriptors ([`descriptor::MessageDescriptor`] and friends) are
//! consumed as already-built data; nothing here parses `.proto` source.
//!
//! # Module map
//!
//! - [`wire`] — varints, fixed-width values, length-delimited framing,
//!   zigzag, tag composition
//! - [`descriptor`] — immutable, `Arc`-shared schema metadata
//! - [`value`] — the tagged-union field storage (`FieldValue`/`Value`)
//! - [`unknown`] — preserved-but-unrecognized wire data
//! - [`field_set`] — the mutable/frozen field-table core
//! - [`extension`] — extension field resolution
//! - [`dynamic`] — `DynamicMessage`/`DynamicBuilder` and the parse loop
//! - [`message`] — the `Message`/`Builder` contract
//! - [`error`] — the crate's single error enum
//! - [`test_utils`] — hand-built descriptor fixtures, for this crate's own
//!   tests and for downstream integration tests

pub mod descriptor;
pub mod dynamic;
pub mod error;
pub mod extension;
pub mod field_set;
pub mod message;
pub mod test_utils;
pub mod unknown;
pub mod value;
pub mod wire;
