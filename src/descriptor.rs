//! Read-only schema metadata consumed from the descriptor-compiler
//! collaborator (out of scope for this crate — see `crate` docs).
//!
//! Descriptor entities are immutable and process-global: constructing one
//! is cheap to clone (an [`Arc`] handle) and safe to share across threads
//! without synchronization, matching §5's concurrency contract.
//!
//! # Key Types
//!
//! - [`MessageDescriptor`]: fields ordered by tag, extension ranges, options
//! - [`FieldDescriptor`]: everything needed to decode/encode/verify one field
//! - [`EnumDescriptor`] / [`EnumValueDescriptor`]: enum schema metadata

use std::sync::Arc;

/// The eighteen wire-level field types a `.proto` field can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int32,
    Int64,
    UInt32,
    UInt64,
    SInt32,
    SInt64,
    Fixed32,
    Fixed64,
    SFixed32,
    SFixed64,
    Float,
    Double,
    Bool,
    String,
    Bytes,
    Enum,
    Message,
    Group,
}

/// `FieldType` collapsed to the storage category used by `FieldValue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappedType {
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    Bool,
    String,
    Bytes,
    Enum,
    Message,
}

impl FieldType {
    pub fn mapped_type(self) -> MappedType {
        use FieldType::*;
        match self {
            Int32 | SInt32 | SFixed32 => MappedType::Int32,
            Int64 | SInt64 | SFixed64 => MappedType::Int64,
            UInt32 | Fixed32 => MappedType::UInt32,
            UInt64 | Fixed64 => MappedType::UInt64,
            Float => MappedType::Float,
            Double => MappedType::Double,
            Bool => MappedType::Bool,
            String => MappedType::String,
            Bytes => MappedType::Bytes,
            Enum => MappedType::Enum,
            Message | Group => MappedType::Message,
        }
    }

    /// Wire type used when this field type is encoded unpacked (a packed
    /// repeated of any of these always uses `LengthDelimited`).
    pub fn wire_type(self) -> crate::wire::WireType {
        use crate::wire::WireType::*;
        use FieldType::*;
        match self {
            Int32 | Int64 | UInt32 | UInt64 | SInt32 | SInt64 | Bool | Enum => Varint,
            Fixed64 | SFixed64 | Double => Fixed64,
            String | Bytes | Message => LengthDelimited,
            Group => StartGroup,
            Fixed32 | SFixed32 | Float => Fixed32,
        }
    }

    /// Whether repeated fields of this type are eligible for packed
    /// encoding (scalar numeric/bool/enum types only).
    pub fn is_packable(self) -> bool {
        !matches!(self, FieldType::String | FieldType::Bytes | FieldType::Message | FieldType::Group)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Singular,
    Repeated,
}

/// A field's default value, applicable only to singular scalar types
/// (MESSAGE has no default — an absent singular message reads as "none").
#[derive(Debug, Clone)]
pub enum DefaultValue {
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Bool(bool),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
    /// Default enum value, by number (resolved against `enum_type` lazily).
    Enum(i32),
}

#[derive(Debug, Clone)]
pub struct FieldDescriptorData {
    pub number: i32,
    pub name: Arc<str>,
    pub full_name: Arc<str>,
    pub field_type: FieldType,
    pub cardinality: Cardinality,
    pub packed: bool,
    pub required: bool,
    pub is_extension: bool,
    pub containing_type_full_name: Arc<str>,
    pub message_type: Option<MessageDescriptor>,
    pub enum_type: Option<EnumDescriptor>,
    pub default_value: Option<DefaultValue>,
}

/// Immutable, cheaply-cloneable handle to a field's schema metadata.
pub type FieldDescriptor = Arc<FieldDescriptorData>;

impl FieldDescriptorData {
    pub fn mapped_type(&self) -> MappedType {
        self.field_type.mapped_type()
    }

    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    pub fn is_packed(&self) -> bool {
        self.is_repeated() && self.packed && self.field_type.is_packable()
    }

    pub fn wire_type(&self) -> crate::wire::WireType {
        self.field_type.wire_type()
    }

    pub fn tag(&self) -> u32 {
        let wt = if self.is_packed() {
            crate::wire::WireType::LengthDelimited
        } else {
            self.wire_type()
        };
        crate::wire::make_tag(self.number as u32, wt)
    }
}

#[derive(Debug, Default)]
pub struct MessageOptions {
    /// Legacy message-set wire format: extensions are wrapped in
    /// start-group/end-group tags with an explicit type-id varint.
    pub message_set_wire_format: bool,
}

#[derive(Debug)]
pub struct ExtensionRange {
    pub start: i32,
    /// Exclusive, matching `.proto` `extensions N to M` semantics.
    pub end: i32,
}

#[derive(Debug)]
pub struct MessageDescriptorData {
    pub full_name: Arc<str>,
    /// Ordered by tag, matching canonical iteration/serialization order.
    pub fields: Vec<FieldDescriptor>,
    pub extension_ranges: Vec<ExtensionRange>,
    pub options: MessageOptions,
}

pub type MessageDescriptor = Arc<MessageDescriptorData>;

impl MessageDescriptorData {
    pub fn find_field_by_number(&self, number: i32) -> Option<&FieldDescriptor> {
        // Fields are tag-ordered; linear scan is simplest and the set is small
        // for the vast majority of real message types.
        self.fields.iter().find(|f| f.number == number)
    }

    pub fn find_field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| &*f.name == name)
    }

    pub fn is_extension_number(&self, number: i32) -> bool {
        self.extension_ranges
            .iter()
            .any(|r| number >= r.start && number < r.end)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.required)
    }
}

#[derive(Debug)]
pub struct EnumValueDescriptorData {
    pub name: Arc<str>,
    pub number: i32,
    pub enum_type_full_name: Arc<str>,
}

pub type EnumValueDescriptor = Arc<EnumValueDescriptorData>;

#[derive(Debug)]
pub struct EnumDescriptorData {
    pub full_name: Arc<str>,
    pub values: Vec<EnumValueDescriptor>,
}

pub type EnumDescriptor = Arc<EnumDescriptorData>;

impl EnumDescriptorData {
    pub fn find_value_by_number(&self, number: i32) -> Option<&EnumValueDescriptor> {
        self.values.iter().find(|v| v.number == number)
    }
}
