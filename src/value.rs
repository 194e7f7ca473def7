//! The tagged union backing every slot of a [`crate::field_set::FieldSet`].
//!
//! [`FieldValue`] is the owned storage form; [`Value`] is the borrowed view
//! returned by reads. Keeping the two separate means a `get` on a repeated
//! field of a million strings is a slice borrow, not a clone.

use std::sync::Arc;

use crate::descriptor::{DefaultValue, EnumValueDescriptor, FieldDescriptor, MappedType};
use crate::error::ProtoError;
use crate::message::Message;

/// Owned field storage, discriminated by [`MappedType`]. Matches the data
/// model table in the core specification exactly: one variant per mapped
/// type, with a twin `Repeated*` variant holding the ordered sequence.
#[derive(Clone)]
pub enum FieldValue {
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Bool(bool),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
    Enum(EnumValueDescriptor),
    Message(Arc<dyn Message>),

    RepeatedInt32(Vec<i32>),
    RepeatedInt64(Vec<i64>),
    RepeatedUInt32(Vec<u32>),
    RepeatedUInt64(Vec<u64>),
    RepeatedFloat(Vec<f32>),
    RepeatedDouble(Vec<f64>),
    RepeatedBool(Vec<bool>),
    RepeatedString(Vec<Arc<str>>),
    RepeatedBytes(Vec<Arc<[u8]>>),
    RepeatedEnum(Vec<EnumValueDescriptor>),
    RepeatedMessage(Vec<Arc<dyn Message>>),
}

impl core::fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.as_ref().fmt(f)
    }
}

/// Borrowed view of a single field slot, returned by
/// [`crate::field_set::FieldSet::get`] and
/// [`crate::message::Message::get_field`].
pub enum Value<'a> {
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Bool(bool),
    String(&'a str),
    Bytes(&'a [u8]),
    Enum(&'a EnumValueDescriptor),
    Message(&'a Arc<dyn Message>),

    RepeatedInt32(&'a [i32]),
    RepeatedInt64(&'a [i64]),
    RepeatedUInt32(&'a [u32]),
    RepeatedUInt64(&'a [u64]),
    RepeatedFloat(&'a [f32]),
    RepeatedDouble(&'a [f64]),
    RepeatedBool(&'a [bool]),
    RepeatedString(&'a [Arc<str>]),
    RepeatedBytes(&'a [Arc<[u8]>]),
    RepeatedEnum(&'a [EnumValueDescriptor]),
    RepeatedMessage(&'a [Arc<dyn Message>]),
}

impl core::fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Value::Int32(v) => v.fmt(f),
            Value::Int64(v) => v.fmt(f),
            Value::UInt32(v) => v.fmt(f),
            Value::UInt64(v) => v.fmt(f),
            Value::Float(v) => v.fmt(f),
            Value::Double(v) => v.fmt(f),
            Value::Bool(v) => v.fmt(f),
            Value::String(v) => v.fmt(f),
            Value::Bytes(v) => v.fmt(f),
            Value::Enum(v) => v.name.fmt(f),
            Value::Message(v) => v.fmt(f),
            Value::RepeatedInt32(v) => v.fmt(f),
            Value::RepeatedInt64(v) => v.fmt(f),
            Value::RepeatedUInt32(v) => v.fmt(f),
            Value::RepeatedUInt64(v) => v.fmt(f),
            Value::RepeatedFloat(v) => v.fmt(f),
            Value::RepeatedDouble(v) => v.fmt(f),
            Value::RepeatedBool(v) => v.fmt(f),
            Value::RepeatedString(v) => v.fmt(f),
            Value::RepeatedBytes(v) => v.fmt(f),
            Value::RepeatedEnum(v) => f.debug_list().entries(v.iter().map(|e| &e.name)).finish(),
            Value::RepeatedMessage(v) => f.debug_list().entries(v.iter()).finish(),
        }
    }
}

impl FieldValue {
    pub fn as_ref(&self) -> Value<'_> {
        match self {
            FieldValue::Int32(v) => Value::Int32(*v),
            FieldValue::Int64(v) => Value::Int64(*v),
            FieldValue::UInt32(v) => Value::UInt32(*v),
            FieldValue::UInt64(v) => Value::UInt64(*v),
            FieldValue::Float(v) => Value::Float(*v),
            FieldValue::Double(v) => Value::Double(*v),
            FieldValue::Bool(v) => Value::Bool(*v),
            FieldValue::String(v) => Value::String(v),
            FieldValue::Bytes(v) => Value::Bytes(v),
            FieldValue::Enum(v) => Value::Enum(v),
            FieldValue::Message(v) => Value::Message(v),
            FieldValue::RepeatedInt32(v) => Value::RepeatedInt32(v),
            FieldValue::RepeatedInt64(v) => Value::RepeatedInt64(v),
            FieldValue::RepeatedUInt32(v) => Value::RepeatedUInt32(v),
            FieldValue::RepeatedUInt64(v) => Value::RepeatedUInt64(v),
            FieldValue::RepeatedFloat(v) => Value::RepeatedFloat(v),
            FieldValue::RepeatedDouble(v) => Value::RepeatedDouble(v),
            FieldValue::RepeatedBool(v) => Value::RepeatedBool(v),
            FieldValue::RepeatedString(v) => Value::RepeatedString(v),
            FieldValue::RepeatedBytes(v) => Value::RepeatedBytes(v),
            FieldValue::RepeatedEnum(v) => Value::RepeatedEnum(v),
            FieldValue::RepeatedMessage(v) => Value::RepeatedMessage(v),
        }
    }

    pub fn mapped_type_name(&self) -> &'static str {
        match self {
            FieldValue::Int32(_) | FieldValue::RepeatedInt32(_) => "int32",
            FieldValue::Int64(_) | FieldValue::RepeatedInt64(_) => "int64",
            FieldValue::UInt32(_) | FieldValue::RepeatedUInt32(_) => "uint32",
            FieldValue::UInt64(_) | FieldValue::RepeatedUInt64(_) => "uint64",
            FieldValue::Float(_) | FieldValue::RepeatedFloat(_) => "float",
            FieldValue::Double(_) | FieldValue::RepeatedDouble(_) => "double",
            FieldValue::Bool(_) | FieldValue::RepeatedBool(_) => "bool",
            FieldValue::String(_) | FieldValue::RepeatedString(_) => "string",
            FieldValue::Bytes(_) | FieldValue::RepeatedBytes(_) => "bytes",
            FieldValue::Enum(_) | FieldValue::RepeatedEnum(_) => "enum",
            FieldValue::Message(_) | FieldValue::RepeatedMessage(_) => "message",
        }
    }

    pub fn is_repeated(&self) -> bool {
        matches!(
            self,
            FieldValue::RepeatedInt32(_)
                | FieldValue::RepeatedInt64(_)
                | FieldValue::RepeatedUInt32(_)
                | FieldValue::RepeatedUInt64(_)
                | FieldValue::RepeatedFloat(_)
                | FieldValue::RepeatedDouble(_)
                | FieldValue::RepeatedBool(_)
                | FieldValue::RepeatedString(_)
                | FieldValue::RepeatedBytes(_)
                | FieldValue::RepeatedEnum(_)
                | FieldValue::RepeatedMessage(_)
        )
    }

    pub fn repeated_len(&self) -> usize {
        match self {
            FieldValue::RepeatedInt32(v) => v.len(),
            FieldValue::RepeatedInt64(v) => v.len(),
            FieldValue::RepeatedUInt32(v) => v.len(),
            FieldValue::RepeatedUInt64(v) => v.len(),
            FieldValue::RepeatedFloat(v) => v.len(),
            FieldValue::RepeatedDouble(v) => v.len(),
            FieldValue::RepeatedBool(v) => v.len(),
            FieldValue::RepeatedString(v) => v.len(),
            FieldValue::RepeatedBytes(v) => v.len(),
            FieldValue::RepeatedEnum(v) => v.len(),
            FieldValue::RepeatedMessage(v) => v.len(),
            _ => 0,
        }
    }

    /// Appends `element` (a non-repeated [`FieldValue`] of the matching
    /// scalar type) to `self`, which must already be the corresponding
    /// `Repeated*` variant.
    pub fn push_element(&mut self, element: FieldValue) -> Result<(), ProtoError> {
        match (self, element) {
            (FieldValue::RepeatedInt32(v), FieldValue::Int32(e)) => v.push(e),
            (FieldValue::RepeatedInt64(v), FieldValue::Int64(e)) => v.push(e),
            (FieldValue::RepeatedUInt32(v), FieldValue::UInt32(e)) => v.push(e),
            (FieldValue::RepeatedUInt64(v), FieldValue::UInt64(e)) => v.push(e),
            (FieldValue::RepeatedFloat(v), FieldValue::Float(e)) => v.push(e),
            (FieldValue::RepeatedDouble(v), FieldValue::Double(e)) => v.push(e),
            (FieldValue::RepeatedBool(v), FieldValue::Bool(e)) => v.push(e),
            (FieldValue::RepeatedString(v), FieldValue::String(e)) => v.push(e),
            (FieldValue::RepeatedBytes(v), FieldValue::Bytes(e)) => v.push(e),
            (FieldValue::RepeatedEnum(v), FieldValue::Enum(e)) => v.push(e),
            (FieldValue::RepeatedMessage(v), FieldValue::Message(e)) => v.push(e),
            (this, _) => return Err(ProtoError::illegal_argument(format!("cannot append to a {}", this.mapped_type_name()))),
        }
        Ok(())
    }

    /// Replaces the element at `index`, which must already be in range.
    pub fn set_element(&mut self, index: usize, element: FieldValue) -> Result<(), ProtoError> {
        macro_rules! replace {
            ($v:expr, $e:expr) => {{
                let len = $v.len();
                let slot = $v.get_mut(index).ok_or(ProtoError::OutOfRange { index, len })?;
                *slot = $e;
            }};
        }
        match (self, element) {
            (FieldValue::RepeatedInt32(v), FieldValue::Int32(e)) => replace!(v, e),
            (FieldValue::RepeatedInt64(v), FieldValue::Int64(e)) => replace!(v, e),
            (FieldValue::RepeatedUInt32(v), FieldValue::UInt32(e)) => replace!(v, e),
            (FieldValue::RepeatedUInt64(v), FieldValue::UInt64(e)) => replace!(v, e),
            (FieldValue::RepeatedFloat(v), FieldValue::Float(e)) => replace!(v, e),
            (FieldValue::RepeatedDouble(v), FieldValue::Double(e)) => replace!(v, e),
            (FieldValue::RepeatedBool(v), FieldValue::Bool(e)) => replace!(v, e),
            (FieldValue::RepeatedString(v), FieldValue::String(e)) => replace!(v, e),
            (FieldValue::RepeatedBytes(v), FieldValue::Bytes(e)) => replace!(v, e),
            (FieldValue::RepeatedEnum(v), FieldValue::Enum(e)) => replace!(v, e),
            (FieldValue::RepeatedMessage(v), FieldValue::Message(e)) => replace!(v, e),
            (this, _) => return Err(ProtoError::illegal_argument(format!("cannot index into a {}", this.mapped_type_name()))),
        }
        Ok(())
    }

    /// An empty `Repeated*` variant matching `mapped_type`, used as the
    /// starting point the first time a repeated field is appended to.
    pub fn empty_repeated(mapped_type: MappedType) -> FieldValue {
        match mapped_type {
            MappedType::Int32 => FieldValue::RepeatedInt32(Vec::new()),
            MappedType::Int64 => FieldValue::RepeatedInt64(Vec::new()),
            MappedType::UInt32 => FieldValue::RepeatedUInt32(Vec::new()),
            MappedType::UInt64 => FieldValue::RepeatedUInt64(Vec::new()),
            MappedType::Float => FieldValue::RepeatedFloat(Vec::new()),
            MappedType::Double => FieldValue::RepeatedDouble(Vec::new()),
            MappedType::Bool => FieldValue::RepeatedBool(Vec::new()),
            MappedType::String => FieldValue::RepeatedString(Vec::new()),
            MappedType::Bytes => FieldValue::RepeatedBytes(Vec::new()),
            MappedType::Enum => FieldValue::RepeatedEnum(Vec::new()),
            MappedType::Message => FieldValue::RepeatedMessage(Vec::new()),
        }
    }
}

impl Value<'_> {
    /// Snapshots a borrowed read into owned storage. Used by generic merge
    /// code that only has `&dyn Message` to work with (no access to the
    /// other side's internal `FieldValue`), e.g. [`crate::field_set::FieldSetBuilder::merge_from`].
    pub fn to_owned_value(&self) -> FieldValue {
        match self {
            Value::Int32(v) => FieldValue::Int32(*v),
            Value::Int64(v) => FieldValue::Int64(*v),
            Value::UInt32(v) => FieldValue::UInt32(*v),
            Value::UInt64(v) => FieldValue::UInt64(*v),
            Value::Float(v) => FieldValue::Float(*v),
            Value::Double(v) => FieldValue::Double(*v),
            Value::Bool(v) => FieldValue::Bool(*v),
            Value::String(v) => FieldValue::String(Arc::from(*v)),
            Value::Bytes(v) => FieldValue::Bytes(Arc::from(*v)),
            Value::Enum(v) => FieldValue::Enum((*v).clone()),
            Value::Message(v) => FieldValue::Message(Arc::clone(v)),
            Value::RepeatedInt32(v) => FieldValue::RepeatedInt32(v.to_vec()),
            Value::RepeatedInt64(v) => FieldValue::RepeatedInt64(v.to_vec()),
            Value::RepeatedUInt32(v) => FieldValue::RepeatedUInt32(v.to_vec()),
            Value::RepeatedUInt64(v) => FieldValue::RepeatedUInt64(v.to_vec()),
            Value::RepeatedFloat(v) => FieldValue::RepeatedFloat(v.to_vec()),
            Value::RepeatedDouble(v) => FieldValue::RepeatedDouble(v.to_vec()),
            Value::RepeatedBool(v) => FieldValue::RepeatedBool(v.to_vec()),
            Value::RepeatedString(v) => FieldValue::RepeatedString(v.to_vec()),
            Value::RepeatedBytes(v) => FieldValue::RepeatedBytes(v.to_vec()),
            Value::RepeatedEnum(v) => FieldValue::RepeatedEnum(v.to_vec()),
            Value::RepeatedMessage(v) => FieldValue::RepeatedMessage(v.to_vec()),
        }
    }
}

/// `VerifyType` (§4.3): checks that `value` conforms to `field`'s mapped
/// type and cardinality, raising `TypeMismatch` with full diagnostic
/// context on failure.
pub fn verify_type(field: &FieldDescriptor, value: &FieldValue) -> Result<(), ProtoError> {
    let expected_mapped = field.mapped_type();
    let ok = match (expected_mapped, field.is_repeated(), value) {
        (MappedType::Int32, false, FieldValue::Int32(_)) => true,
        (MappedType::Int32, true, FieldValue::RepeatedInt32(_)) => true,
        (MappedType::Int64, false, FieldValue::Int64(_)) => true,
        (MappedType::Int64, true, FieldValue::RepeatedInt64(_)) => true,
        (MappedType::UInt32, false, FieldValue::UInt32(_)) => true,
        (MappedType::UInt32, true, FieldValue::RepeatedUInt32(_)) => true,
        (MappedType::UInt64, false, FieldValue::UInt64(_)) => true,
        (MappedType::UInt64, true, FieldValue::RepeatedUInt64(_)) => true,
        (MappedType::Float, false, FieldValue::Float(_)) => true,
        (MappedType::Float, true, FieldValue::RepeatedFloat(_)) => true,
        (MappedType::Double, false, FieldValue::Double(_)) => true,
        (MappedType::Double, true, FieldValue::RepeatedDouble(_)) => true,
        (MappedType::Bool, false, FieldValue::Bool(_)) => true,
        (MappedType::Bool, true, FieldValue::RepeatedBool(_)) => true,
        (MappedType::String, false, FieldValue::String(_)) => true,
        (MappedType::String, true, FieldValue::RepeatedString(_)) => true,
        (MappedType::Bytes, false, FieldValue::Bytes(_)) => true,
        (MappedType::Bytes, true, FieldValue::RepeatedBytes(_)) => true,
        (MappedType::Enum, false, FieldValue::Enum(ev)) => {
            field_enum_type_matches(field, &ev.enum_type_full_name)
        }
        (MappedType::Enum, true, FieldValue::RepeatedEnum(evs)) => {
            evs.iter().all(|ev| field_enum_type_matches(field, &ev.enum_type_full_name))
        }
        (MappedType::Message, false, FieldValue::Message(msg)) => message_type_matches(field, msg),
        (MappedType::Message, true, FieldValue::RepeatedMessage(msgs)) => {
            msgs.iter().all(|msg| message_type_matches(field, msg))
        }
        _ => false,
    };

    if ok {
        Ok(())
    } else {
        Err(ProtoError::TypeMismatch {
            containing_type: field.containing_type_full_name.to_string(),
            field_name: if field.is_extension {
                field.full_name.to_string()
            } else {
                field.name.to_string()
            },
            expected: expected_mapped_name(expected_mapped),
            actual: value.mapped_type_name(),
        })
    }
}

fn field_enum_type_matches(field: &FieldDescriptor, actual_enum_full_name: &str) -> bool {
    match &field.enum_type {
        Some(enum_type) => &*enum_type.full_name == actual_enum_full_name,
        None => false,
    }
}

fn message_type_matches(field: &FieldDescriptor, msg: &Arc<dyn Message>) -> bool {
    match &field.message_type {
        Some(message_type) => {
            let actual = msg.descriptor_for_type();
            Arc::ptr_eq(message_type, actual) || message_type.full_name == actual.full_name
        }
        None => false,
    }
}

/// The canonical empty sequence view for an absent repeated field (§3
/// "Absence semantics", §4.3): read-only, no allocation.
pub fn empty_repeated_view<'a>(mapped_type: MappedType) -> Value<'a> {
    match mapped_type {
        MappedType::Int32 => Value::RepeatedInt32(&[]),
        MappedType::Int64 => Value::RepeatedInt64(&[]),
        MappedType::UInt32 => Value::RepeatedUInt32(&[]),
        MappedType::UInt64 => Value::RepeatedUInt64(&[]),
        MappedType::Float => Value::RepeatedFloat(&[]),
        MappedType::Double => Value::RepeatedDouble(&[]),
        MappedType::Bool => Value::RepeatedBool(&[]),
        MappedType::String => Value::RepeatedString(&[]),
        MappedType::Bytes => Value::RepeatedBytes(&[]),
        MappedType::Enum => Value::RepeatedEnum(&[]),
        MappedType::Message => Value::RepeatedMessage(&[]),
    }
}

/// The value an absent singular scalar/enum/string/bytes field reads as
/// (§3 "Absence semantics": "an absent singular scalar reports its
/// descriptor's default"). Falls back to the implicit protobuf zero value
/// (`0`/`0.0`/`false`/`""`/`[]`/the enum's first declared value) when
/// `field.default_value` carries no explicit override. Never called for a
/// MESSAGE field — an absent singular message reads as "none", handled by
/// the caller instead (see [`crate::message::Message::get_field_or_default`]).
pub fn default_value_view<'a>(field: &'a FieldDescriptor) -> Value<'a> {
    match field.mapped_type() {
        MappedType::Int32 => Value::Int32(match &field.default_value {
            Some(DefaultValue::Int32(v)) => *v,
            _ => 0,
        }),
        MappedType::Int64 => Value::Int64(match &field.default_value {
            Some(DefaultValue::Int64(v)) => *v,
            _ => 0,
        }),
        MappedType::UInt32 => Value::UInt32(match &field.default_value {
            Some(DefaultValue::UInt32(v)) => *v,
            _ => 0,
        }),
        MappedType::UInt64 => Value::UInt64(match &field.default_value {
            Some(DefaultValue::UInt64(v)) => *v,
            _ => 0,
        }),
        MappedType::Float => Value::Float(match &field.default_value {
            Some(DefaultValue::Float(v)) => *v,
            _ => 0.0,
        }),
        MappedType::Double => Value::Double(match &field.default_value {
            Some(DefaultValue::Double(v)) => *v,
            _ => 0.0,
        }),
        MappedType::Bool => Value::Bool(match &field.default_value {
            Some(DefaultValue::Bool(v)) => *v,
            _ => false,
        }),
        MappedType::String => Value::String(match &field.default_value {
            Some(DefaultValue::String(s)) => s.as_ref(),
            _ => "",
        }),
        MappedType::Bytes => Value::Bytes(match &field.default_value {
            Some(DefaultValue::Bytes(b)) => b.as_ref(),
            _ => &[],
        }),
        MappedType::Enum => {
            let enum_type = field.enum_type.as_ref().expect("ENUM field must carry an enum_type descriptor");
            let number = match &field.default_value {
                Some(DefaultValue::Enum(n)) => *n,
                _ => enum_type.values.first().map(|v| v.number).unwrap_or(0),
            };
            Value::Enum(
                enum_type
                    .find_value_by_number(number)
                    .unwrap_or_else(|| enum_type.values.first().expect("enum type must declare at least one value")),
            )
        }
        MappedType::Message => unreachable!("MESSAGE fields have no scalar default; caller handles absence separately"),
    }
}

fn expected_mapped_name(m: MappedType) -> &'static str {
    match m {
        MappedType::Int32 => "int32",
        MappedType::Int64 => "int64",
        MappedType::UInt32 => "uint32",
        MappedType::UInt64 => "uint64",
        MappedType::Float => "float",
        MappedType::Double => "double",
        MappedType::Bool => "bool",
        MappedType::String => "string",
        MappedType::Bytes => "bytes",
        MappedType::Enum => "enum",
        MappedType::Message => "message",
    }
}
