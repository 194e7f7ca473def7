//! The reflective field table backing [`crate::dynamic::DynamicMessage`]:
//! a sparse, tag-ordered map from field number to [`FieldValue`], plus the
//! [`UnknownFieldSet`] carried alongside it.
//!
//! [`FieldSetBuilder`] is the mutable accumulator used while a message is
//! under construction or being parsed; [`FieldSetBuilder::freeze`] produces
//! the immutable [`FieldSet`] a built message holds. Only set fields occupy
//! an entry — clearing a field removes it rather than writing a sentinel,
//! so `has`/`all_fields` never need to distinguish "set to the default"
//! from "unset".

use std::collections::BTreeMap;

use crate::descriptor::{FieldDescriptor, MappedType, MessageDescriptor};
use crate::error::ProtoError;
use crate::unknown::{UnknownFieldSet, UnknownFieldSetBuilder};
use crate::value::{verify_type, FieldValue, Value};
use crate::wire::CodedOutput;

fn check_repeated(field: &FieldDescriptor, expect_repeated: bool) -> Result<(), ProtoError> {
    if field.is_repeated() != expect_repeated {
        let which = if expect_repeated { "singular" } else { "repeated" };
        return Err(ProtoError::illegal_argument(format!(
            "{} is {which}, not {}",
            field.full_name,
            if expect_repeated { "repeated" } else { "singular" }
        )));
    }
    Ok(())
}

/// One occupied slot: the descriptor that resolved it (the containing
/// message's own field, or an extension resolved through a registry) paired
/// with its value. Extensions carry their own [`FieldDescriptor`] here
/// because, unlike a declared field, it cannot be recovered later from
/// `MessageDescriptor::fields` alone — §6's extension registry is only
/// consulted while parsing, not while writing.
type FieldEntry = (FieldDescriptor, FieldValue);

/// Mutable field table, used while building or parsing a message.
///
/// Keyed by field number rather than by descriptor identity: a `BTreeMap`
/// keeps entries in ascending field-number order for free, which is exactly
/// the canonical serialization order (§4.3) whether the entry is a
/// declared field or an extension slotted in between two of them.
#[derive(Debug)]
pub struct FieldSetBuilder {
    descriptor: MessageDescriptor,
    fields: BTreeMap<i32, FieldEntry>,
    unknown: UnknownFieldSetBuilder,
}

impl FieldSetBuilder {
    pub fn new(descriptor: MessageDescriptor) -> Self {
        FieldSetBuilder {
            descriptor,
            fields: BTreeMap::new(),
            unknown: UnknownFieldSetBuilder::new(),
        }
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    pub fn get(&self, field: &FieldDescriptor) -> Option<Value<'_>> {
        self.fields.get(&field.number).map(|(_, v)| v.as_ref())
    }

    pub fn has(&self, field: &FieldDescriptor) -> Result<bool, ProtoError> {
        check_repeated(field, false)?;
        Ok(self.fields.contains_key(&field.number))
    }

    pub fn get_repeated_count(&self, field: &FieldDescriptor) -> Result<usize, ProtoError> {
        check_repeated(field, true)?;
        Ok(self.fields.get(&field.number).map(|(_, v)| v.repeated_len()).unwrap_or(0))
    }

    /// Sets a singular field, or overwrites an entire repeated field with
    /// one element (matching protobuf reflection's `setField`, which
    /// accepts a `List` for repeated fields — here the caller passes the
    /// already-assembled `Repeated*` variant).
    pub fn set(&mut self, field: &FieldDescriptor, value: FieldValue) -> Result<(), ProtoError> {
        verify_type(field, &value)?;
        self.fields.insert(field.number, (field.clone(), value));
        Ok(())
    }

    pub fn set_element(&mut self, field: &FieldDescriptor, index: usize, element: FieldValue) -> Result<(), ProtoError> {
        check_repeated(field, true)?;
        let (_, slot) = self
            .fields
            .get_mut(&field.number)
            .ok_or(ProtoError::OutOfRange { index, len: 0 })?;
        verify_type(field, &wrap_single(field.mapped_type(), &element))?;
        slot.set_element(index, element)
    }

    pub fn add_repeated(&mut self, field: &FieldDescriptor, element: FieldValue) -> Result<(), ProtoError> {
        check_repeated(field, true)?;
        verify_type(field, &wrap_single(field.mapped_type(), &element))?;
        let entry = self
            .fields
            .entry(field.number)
            .or_insert_with(|| (field.clone(), FieldValue::empty_repeated(field.mapped_type())));
        entry.1.push_element(element)
    }

    pub fn clear(&mut self, field: &FieldDescriptor) {
        self.fields.remove(&field.number);
    }

    /// Ascending field-number order, declared fields and extensions
    /// interleaved as they sit in the map — the canonical serialization
    /// order (§4.3). Extensions have no entry in `descriptor.fields`, so
    /// this walks `self.fields` directly rather than the descriptor.
    pub fn all_fields(&self) -> Vec<(FieldDescriptor, &FieldValue)> {
        self.fields.values().map(|(f, v)| (f.clone(), v)).collect()
    }

    pub fn merge_unknown_field(&mut self, tag: u32, input: &mut crate::wire::CodedInput) -> Result<bool, ProtoError> {
        self.unknown.merge_field(tag, input)
    }

    pub fn merge_unknown_fields(&mut self, other: &UnknownFieldSet) {
        self.unknown.merge_from(other);
    }

    pub fn merge_unknown_varint(&mut self, field_number: u32, value: u64) {
        self.unknown.merge_varint(field_number, value);
    }

    pub fn merge_unknown_group(&mut self, field_number: u32, group: UnknownFieldSet) {
        self.unknown.merge_group(field_number, group);
    }

    /// `mergeFrom` (§4.3): for each of `other`'s set fields, repeated fields
    /// concatenate; a singular MESSAGE field already set on `self` merges
    /// recursively (a fresh builder of the sub-message's type, target then
    /// source); every other singular field is overwritten. Recursion past
    /// `max_recursion_depth` fails with `Malformed`, matching the parser's
    /// own cap (§5, §9).
    pub fn merge_from(&mut self, other: &dyn crate::message::Message) -> Result<(), ProtoError> {
        self.merge_from_with_options(other, crate::error::ParseOptions::default())
    }

    pub fn merge_from_with_options(&mut self, other: &dyn crate::message::Message, options: crate::error::ParseOptions) -> Result<(), ProtoError> {
        self.merge_from_depth(other, 0, options.max_recursion_depth)
    }

    fn merge_from_depth(&mut self, other: &dyn crate::message::Message, depth: u32, max_depth: u32) -> Result<(), ProtoError> {
        if depth > max_depth {
            return Err(ProtoError::malformed("exceeded max recursion depth while merging messages"));
        }
        for (field, value) in other.all_fields() {
            if field.is_repeated() {
                let entry = self
                    .fields
                    .entry(field.number)
                    .or_insert_with(|| (field.clone(), FieldValue::empty_repeated(field.mapped_type())));
                extend_repeated_value(&mut entry.1, &value)?;
            } else if let Value::Message(incoming) = &value {
                match self.fields.get(&field.number) {
                    Some((_, FieldValue::Message(existing))) => {
                        let merged = merge_singular_messages(&field, existing, incoming, depth + 1, max_depth)?;
                        self.fields.insert(field.number, (field.clone(), FieldValue::Message(merged)));
                    }
                    _ => {
                        self.fields
                            .insert(field.number, (field.clone(), FieldValue::Message(std::sync::Arc::clone(incoming))));
                    }
                }
            } else {
                self.fields.insert(field.number, (field.clone(), value.to_owned_value()));
            }
        }
        self.unknown.merge_from(other.unknown_fields());
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        for field in self.descriptor.required_fields() {
            if !self.fields.contains_key(&field.number) {
                return false;
            }
        }
        for (_, value) in self.all_fields() {
            if !message_values_initialized(value) {
                return false;
            }
        }
        true
    }

    pub fn missing_required_fields(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .descriptor
            .required_fields()
            .filter(|f| !self.fields.contains_key(&f.number))
            .map(|f| f.name.to_string())
            .collect();
        for (field, value) in self.all_fields() {
            collect_nested_missing(&field, value, &mut missing);
        }
        missing
    }

    pub fn write_to(&self, out: &mut CodedOutput) {
        let message_set_format = self.descriptor.options.message_set_wire_format;
        for (field, value) in self.fields.values() {
            write_field(field, value, message_set_format, out);
        }
        self.unknown.write_to(out);
    }

    pub fn serialized_size(&self) -> usize {
        let message_set_format = self.descriptor.options.message_set_wire_format;
        let mut size = 0;
        for (field, value) in self.fields.values() {
            size += field_size(field, value, message_set_format);
        }
        size + self.unknown.serialized_size()
    }

    pub fn freeze(self) -> FieldSet {
        log::debug!("freezing field set for {} ({} fields set)", self.descriptor.full_name, self.fields.len());
        FieldSet {
            descriptor: self.descriptor,
            fields: self.fields,
            unknown: self.unknown.freeze(),
        }
    }
}

/// `wrap_single` lets `set_element`/`add_repeated` reuse `verify_type`
/// (which expects a whole `FieldValue`, repeated or not) by momentarily
/// viewing a singular element's value against the field's repeated shape.
fn wrap_single(mapped_type: MappedType, element: &FieldValue) -> FieldValue {
    let mut container = FieldValue::empty_repeated(mapped_type);
    let _ = container.push_element(element.clone());
    container
}

/// Concatenates a borrowed repeated `Value` read from another message onto
/// an owned `FieldValue` slot of the same repeated shape.
fn extend_repeated_value(slot: &mut FieldValue, value: &Value) -> Result<(), ProtoError> {
    match (slot, value) {
        (FieldValue::RepeatedInt32(d), Value::RepeatedInt32(s)) => d.extend_from_slice(s),
        (FieldValue::RepeatedInt64(d), Value::RepeatedInt64(s)) => d.extend_from_slice(s),
        (FieldValue::RepeatedUInt32(d), Value::RepeatedUInt32(s)) => d.extend_from_slice(s),
        (FieldValue::RepeatedUInt64(d), Value::RepeatedUInt64(s)) => d.extend_from_slice(s),
        (FieldValue::RepeatedFloat(d), Value::RepeatedFloat(s)) => d.extend_from_slice(s),
        (FieldValue::RepeatedDouble(d), Value::RepeatedDouble(s)) => d.extend_from_slice(s),
        (FieldValue::RepeatedBool(d), Value::RepeatedBool(s)) => d.extend_from_slice(s),
        (FieldValue::RepeatedString(d), Value::RepeatedString(s)) => d.extend_from_slice(s),
        (FieldValue::RepeatedBytes(d), Value::RepeatedBytes(s)) => d.extend_from_slice(s),
        (FieldValue::RepeatedEnum(d), Value::RepeatedEnum(s)) => d.extend_from_slice(s),
        (FieldValue::RepeatedMessage(d), Value::RepeatedMessage(s)) => d.extend(s.iter().cloned()),
        _ => return Err(ProtoError::illegal_argument("mismatched repeated field types during merge")),
    }
    Ok(())
}

/// Recursive singular-MESSAGE merge (§4.3): builds a fresh `FieldSetBuilder`
/// of the field's own message type, merges `existing` into it and then
/// `incoming`, and freezes the result as a new [`crate::dynamic::DynamicMessage`].
/// The "target sub-message's type" a purely reflective runtime like this one
/// can construct is always a dynamic message — see `DESIGN.md`.
fn merge_singular_messages(
    field: &FieldDescriptor,
    existing: &std::sync::Arc<dyn crate::message::Message>,
    incoming: &std::sync::Arc<dyn crate::message::Message>,
    depth: u32,
    max_depth: u32,
) -> Result<std::sync::Arc<dyn crate::message::Message>, ProtoError> {
    let message_type = field
        .message_type
        .clone()
        .expect("MESSAGE/GROUP field must carry a message_type descriptor");
    let mut builder = FieldSetBuilder::new(message_type);
    builder.merge_from_depth(existing.as_ref(), depth, max_depth)?;
    builder.merge_from_depth(incoming.as_ref(), depth, max_depth)?;
    Ok(std::sync::Arc::new(crate::dynamic::DynamicMessage::from_field_set(builder.freeze())))
}

fn message_values_initialized(value: &FieldValue) -> bool {
    match value {
        FieldValue::Message(m) => m.is_initialized(),
        FieldValue::RepeatedMessage(ms) => ms.iter().all(|m| m.is_initialized()),
        _ => true,
    }
}

fn collect_nested_missing(field: &FieldDescriptor, value: &FieldValue, missing: &mut Vec<String>) {
    match value {
        FieldValue::Message(m) if !m.is_initialized() => {
            for name in nested_missing_names(m.as_ref()) {
                missing.push(format!("{}.{name}", field.name));
            }
        }
        FieldValue::RepeatedMessage(ms) => {
            for (i, m) in ms.iter().enumerate() {
                if !m.is_initialized() {
                    for name in nested_missing_names(m.as_ref()) {
                        missing.push(format!("{}[{i}].{name}", field.name));
                    }
                }
            }
        }
        _ => {}
    }
}

fn nested_missing_names(message: &dyn crate::message::Message) -> Vec<String> {
    let descriptor = message.descriptor_for_type();
    let mut missing: Vec<String> = descriptor
        .required_fields()
        .filter(|f| !message.has_field(f).unwrap_or(true))
        .map(|f| f.name.to_string())
        .collect();
    for (field, value) in message.all_fields() {
        match value {
            Value::Message(m) if !m.is_initialized() => {
                missing.extend(nested_missing_names(m.as_ref()).into_iter().map(|n| format!("{}.{n}", field.name)));
            }
            Value::RepeatedMessage(ms) => {
                for (i, m) in ms.iter().enumerate() {
                    if !m.is_initialized() {
                        missing.extend(nested_missing_names(m.as_ref()).into_iter().map(|n| format!("{}[{i}].{n}", field.name)));
                    }
                }
            }
            _ => {}
        }
    }
    missing
}

/// Writes `field`'s tag, honoring its declared wire type (including the
/// zigzag/fixed-width variants `FieldDescriptorData::tag` already accounts
/// for). Not used for the packed-payload tag, which is always
/// `LengthDelimited` regardless of the element type — see `write_packed`.
fn write_element_tag(field: &FieldDescriptor, out: &mut CodedOutput) {
    out.write_varint32(field.tag());
}

fn write_field(field: &FieldDescriptor, value: &FieldValue, message_set_format: bool, out: &mut CodedOutput) {
    use crate::descriptor::FieldType;
    if field.is_packed() {
        write_packed(field, value, out);
        return;
    }
    match value {
        FieldValue::Int32(v) => {
            write_element_tag(field, out);
            match field.field_type {
                FieldType::SInt32 => out.write_sint32(*v),
                FieldType::SFixed32 => out.write_fixed32(*v as u32),
                _ => out.write_varint64(*v as i64 as u64),
            }
        }
        FieldValue::Int64(v) => {
            write_element_tag(field, out);
            match field.field_type {
                FieldType::SInt64 => out.write_sint64(*v),
                FieldType::SFixed64 => out.write_fixed64(*v as u64),
                _ => out.write_varint64(*v as u64),
            }
        }
        FieldValue::UInt32(v) => {
            write_element_tag(field, out);
            if matches!(field.field_type, FieldType::Fixed32) {
                out.write_fixed32(*v);
            } else {
                out.write_varint32(*v);
            }
        }
        FieldValue::UInt64(v) => {
            write_element_tag(field, out);
            if matches!(field.field_type, FieldType::Fixed64) {
                out.write_fixed64(*v);
            } else {
                out.write_varint64(*v);
            }
        }
        FieldValue::Float(v) => {
            write_element_tag(field, out);
            out.write_float(*v);
        }
        FieldValue::Double(v) => {
            write_element_tag(field, out);
            out.write_double(*v);
        }
        FieldValue::Bool(v) => {
            write_element_tag(field, out);
            out.write_bool(*v);
        }
        FieldValue::String(v) => {
            write_element_tag(field, out);
            out.write_string_field(v);
        }
        FieldValue::Bytes(v) => {
            write_element_tag(field, out);
            out.write_bytes_field(v);
        }
        FieldValue::Enum(v) => {
            write_element_tag(field, out);
            out.write_varint32(v.number as u32);
        }
        FieldValue::Message(v) => write_message_or_group(field, v.as_ref(), message_set_format, out),
        FieldValue::RepeatedInt32(v) => {
            for &e in v {
                write_element_tag(field, out);
                match field.field_type {
                    FieldType::SInt32 => out.write_sint32(e),
                    FieldType::SFixed32 => out.write_fixed32(e as u32),
                    _ => out.write_varint64(e as i64 as u64),
                }
            }
        }
        FieldValue::RepeatedInt64(v) => {
            for &e in v {
                write_element_tag(field, out);
                match field.field_type {
                    FieldType::SInt64 => out.write_sint64(e),
                    FieldType::SFixed64 => out.write_fixed64(e as u64),
                    _ => out.write_varint64(e as u64),
                }
            }
        }
        FieldValue::RepeatedUInt32(v) => {
            for &e in v {
                write_element_tag(field, out);
                if matches!(field.field_type, FieldType::Fixed32) {
                    out.write_fixed32(e);
                } else {
                    out.write_varint32(e);
                }
            }
        }
        FieldValue::RepeatedUInt64(v) => {
            for &e in v {
                write_element_tag(field, out);
                if matches!(field.field_type, FieldType::Fixed64) {
                    out.write_fixed64(e);
                } else {
                    out.write_varint64(e);
                }
            }
        }
        FieldValue::RepeatedFloat(v) => {
            for &e in v {
                write_element_tag(field, out);
                out.write_float(e);
            }
        }
        FieldValue::RepeatedDouble(v) => {
            for &e in v {
                write_element_tag(field, out);
                out.write_double(e);
            }
        }
        FieldValue::RepeatedBool(v) => {
            for &e in v {
                write_element_tag(field, out);
                out.write_bool(e);
            }
        }
        FieldValue::RepeatedString(v) => {
            for e in v {
                write_element_tag(field, out);
                out.write_string_field(e);
            }
        }
        FieldValue::RepeatedBytes(v) => {
            for e in v {
                write_element_tag(field, out);
                out.write_bytes_field(e);
            }
        }
        FieldValue::RepeatedEnum(v) => {
            for e in v {
                write_element_tag(field, out);
                out.write_varint32(e.number as u32);
            }
        }
        FieldValue::RepeatedMessage(v) => {
            for m in v {
                write_message_or_group(field, m.as_ref(), message_set_format, out);
            }
        }
    }
}

fn write_message_or_group(field: &FieldDescriptor, message: &dyn crate::message::Message, message_set_format: bool, out: &mut CodedOutput) {
    use crate::descriptor::FieldType;
    use crate::wire::WireType;
    match field.field_type {
        FieldType::Group => {
            out.write_tag(field.number as u32, WireType::StartGroup);
            message.write_to(out);
            out.write_tag(field.number as u32, WireType::EndGroup);
        }
        _ if field.is_extension && message_set_format => {
            let encoded = message.to_bytes();
            out.write_message_set_extension(field.number as u32, &encoded);
        }
        _ => {
            out.write_tag(field.number as u32, WireType::LengthDelimited);
            let encoded = message.to_bytes();
            out.write_message_field(&encoded);
        }
    }
}

fn write_packed(field: &FieldDescriptor, value: &FieldValue, out: &mut CodedOutput) {
    use crate::descriptor::FieldType;
    use crate::wire::WireType;
    out.write_tag(field.number as u32, WireType::LengthDelimited);
    out.write_varint32(packed_payload_size(field, value) as u32);
    match value {
        FieldValue::RepeatedInt32(v) => match field.field_type {
            FieldType::SInt32 => v.iter().for_each(|&e| out.write_sint32(e)),
            FieldType::SFixed32 => v.iter().for_each(|&e| out.write_fixed32(e as u32)),
            _ => v.iter().for_each(|&e| out.write_varint64(e as i64 as u64)),
        },
        FieldValue::RepeatedInt64(v) => match field.field_type {
            FieldType::SInt64 => v.iter().for_each(|&e| out.write_sint64(e)),
            FieldType::SFixed64 => v.iter().for_each(|&e| out.write_fixed64(e as u64)),
            _ => v.iter().for_each(|&e| out.write_varint64(e as u64)),
        },
        FieldValue::RepeatedUInt32(v) => {
            if matches!(field.field_type, FieldType::Fixed32) {
                v.iter().for_each(|&e| out.write_fixed32(e))
            } else {
                v.iter().for_each(|&e| out.write_varint32(e))
            }
        }
        FieldValue::RepeatedUInt64(v) => {
            if matches!(field.field_type, FieldType::Fixed64) {
                v.iter().for_each(|&e| out.write_fixed64(e))
            } else {
                v.iter().for_each(|&e| out.write_varint64(e))
            }
        }
        FieldValue::RepeatedFloat(v) => v.iter().for_each(|&e| out.write_float(e)),
        FieldValue::RepeatedDouble(v) => v.iter().for_each(|&e| out.write_double(e)),
        FieldValue::RepeatedBool(v) => v.iter().for_each(|&e| out.write_bool(e)),
        FieldValue::RepeatedEnum(v) => v.iter().for_each(|e| out.write_varint32(e.number as u32)),
        _ => unreachable!("packed encoding only applies to packable scalar/enum repeated fields"),
    }
}

fn packed_payload_size(field: &FieldDescriptor, value: &FieldValue) -> usize {
    use crate::descriptor::FieldType;
    use crate::wire::{varint32_size, varint64_size};
    match value {
        FieldValue::RepeatedInt32(v) => match field.field_type {
            FieldType::SInt32 => v.iter().map(|&e| varint32_size(crate::wire::zigzag_encode32(e))).sum(),
            FieldType::SFixed32 => v.len() * 4,
            _ => v.iter().map(|&e| varint64_size(e as i64 as u64)).sum(),
        },
        FieldValue::RepeatedInt64(v) => match field.field_type {
            FieldType::SInt64 => v.iter().map(|&e| varint64_size(crate::wire::zigzag_encode64(e))).sum(),
            FieldType::SFixed64 => v.len() * 8,
            _ => v.iter().map(|&e| varint64_size(e as u64)).sum(),
        },
        FieldValue::RepeatedUInt32(v) => {
            if matches!(field.field_type, FieldType::Fixed32) {
                v.len() * 4
            } else {
                v.iter().map(|&e| varint32_size(e)).sum()
            }
        }
        FieldValue::RepeatedUInt64(v) => {
            if matches!(field.field_type, FieldType::Fixed64) {
                v.len() * 8
            } else {
                v.iter().map(|&e| varint64_size(e)).sum()
            }
        }
        FieldValue::RepeatedFloat(_) => value.repeated_len() * 4,
        FieldValue::RepeatedDouble(_) => value.repeated_len() * 8,
        FieldValue::RepeatedBool(_) => value.repeated_len(),
        FieldValue::RepeatedEnum(v) => v.iter().map(|e| varint32_size(e.number as u32)).sum(),
        _ => 0,
    }
}

fn field_size(field: &FieldDescriptor, value: &FieldValue, message_set_format: bool) -> usize {
    use crate::wire::{tag_size, varint32_size, varint64_size};
    let tag_len = tag_size(field.number as u32);
    if field.is_packed() {
        let payload = packed_payload_size(field, value);
        return tag_len + varint32_size(payload as u32) + payload;
    }
    match value {
        FieldValue::Int32(v) => {
            use crate::descriptor::FieldType;
            tag_len
                + match field.field_type {
                    FieldType::SInt32 => varint32_size(crate::wire::zigzag_encode32(*v)),
                    FieldType::SFixed32 => 4,
                    _ => varint64_size(*v as i64 as u64),
                }
        }
        FieldValue::Int64(v) => {
            use crate::descriptor::FieldType;
            tag_len
                + match field.field_type {
                    FieldType::SInt64 => varint64_size(crate::wire::zigzag_encode64(*v)),
                    FieldType::SFixed64 => 8,
                    _ => varint64_size(*v as u64),
                }
        }
        FieldValue::UInt32(v) => {
            tag_len
                + if matches!(field.field_type, crate::descriptor::FieldType::Fixed32) {
                    4
                } else {
                    varint32_size(*v)
                }
        }
        FieldValue::UInt64(v) => {
            tag_len
                + if matches!(field.field_type, crate::descriptor::FieldType::Fixed64) {
                    8
                } else {
                    varint64_size(*v)
                }
        }
        FieldValue::Float(_) => tag_len + 4,
        FieldValue::Double(_) => tag_len + 8,
        FieldValue::Bool(_) => tag_len + 1,
        FieldValue::String(v) => tag_len + varint32_size(v.len() as u32) + v.len(),
        FieldValue::Bytes(v) => tag_len + varint32_size(v.len() as u32) + v.len(),
        FieldValue::Enum(v) => tag_len + varint32_size(v.number as u32),
        FieldValue::Message(v) => message_or_group_size(field, v.as_ref(), tag_len, message_set_format),
        FieldValue::RepeatedInt32(v) => v
            .iter()
            .map(|&e| {
                use crate::descriptor::FieldType;
                tag_len
                    + match field.field_type {
                        FieldType::SInt32 => varint32_size(crate::wire::zigzag_encode32(e)),
                        FieldType::SFixed32 => 4,
                        _ => varint64_size(e as i64 as u64),
                    }
            })
            .sum(),
        FieldValue::RepeatedInt64(v) => v
            .iter()
            .map(|&e| {
                use crate::descriptor::FieldType;
                tag_len
                    + match field.field_type {
                        FieldType::SInt64 => varint64_size(crate::wire::zigzag_encode64(e)),
                        FieldType::SFixed64 => 8,
                        _ => varint64_size(e as u64),
                    }
            })
            .sum(),
        FieldValue::RepeatedUInt32(v) => v
            .iter()
            .map(|&e| {
                tag_len
                    + if matches!(field.field_type, crate::descriptor::FieldType::Fixed32) {
                        4
                    } else {
                        varint32_size(e)
                    }
            })
            .sum(),
        FieldValue::RepeatedUInt64(v) => v
            .iter()
            .map(|&e| {
                tag_len
                    + if matches!(field.field_type, crate::descriptor::FieldType::Fixed64) {
                        8
                    } else {
                        varint64_size(e)
                    }
            })
            .sum(),
        FieldValue::RepeatedFloat(v) => v.len() * (tag_len + 4),
        FieldValue::RepeatedDouble(v) => v.len() * (tag_len + 8),
        FieldValue::RepeatedBool(v) => v.len() * (tag_len + 1),
        FieldValue::RepeatedString(v) => v.iter().map(|e| tag_len + varint32_size(e.len() as u32) + e.len()).sum(),
        FieldValue::RepeatedBytes(v) => v.iter().map(|e| tag_len + varint32_size(e.len() as u32) + e.len()).sum(),
        FieldValue::RepeatedEnum(v) => v.iter().map(|e| tag_len + varint32_size(e.number as u32)).sum(),
        FieldValue::RepeatedMessage(v) => v
            .iter()
            .map(|m| message_or_group_size(field, m.as_ref(), tag_len, message_set_format))
            .sum(),
    }
}

fn message_or_group_size(field: &FieldDescriptor, message: &dyn crate::message::Message, tag_len: usize, message_set_format: bool) -> usize {
    use crate::descriptor::FieldType;
    use crate::wire::varint32_size;
    match field.field_type {
        FieldType::Group => 2 * tag_len + message.serialized_size(),
        _ if field.is_extension && message_set_format => crate::wire::message_set_extension_size(field.number as u32, message.serialized_size()),
        _ => {
            let len = message.serialized_size();
            tag_len + varint32_size(len as u32) + len
        }
    }
}

/// Frozen, shareable field table. Cloning is cheap for the common case
/// (mostly `Arc`-backed scalars and message handles); the `BTreeMap`
/// spine itself is the one part of a clone that is `O(set fields)`.
#[derive(Debug, Clone)]
pub struct FieldSet {
    descriptor: MessageDescriptor,
    fields: BTreeMap<i32, FieldEntry>,
    unknown: UnknownFieldSet,
}

impl FieldSet {
    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    pub fn get(&self, field: &FieldDescriptor) -> Option<Value<'_>> {
        self.fields.get(&field.number).map(|(_, v)| v.as_ref())
    }

    pub fn has(&self, field: &FieldDescriptor) -> Result<bool, ProtoError> {
        check_repeated(field, false)?;
        Ok(self.fields.contains_key(&field.number))
    }

    pub fn get_repeated_count(&self, field: &FieldDescriptor) -> Result<usize, ProtoError> {
        check_repeated(field, true)?;
        Ok(self.fields.get(&field.number).map(|(_, v)| v.repeated_len()).unwrap_or(0))
    }

    pub fn all_fields(&self) -> Vec<(FieldDescriptor, Value<'_>)> {
        self.fields.values().map(|(f, v)| (f.clone(), v.as_ref())).collect()
    }

    pub fn unknown_fields(&self) -> &UnknownFieldSet {
        &self.unknown
    }

    pub fn is_initialized(&self) -> bool {
        self.descriptor.required_fields().all(|f| self.fields.contains_key(&f.number))
            && self.fields.values().all(|(_, v)| message_values_initialized(v))
    }

    pub fn write_to(&self, out: &mut CodedOutput) {
        let message_set_format = self.descriptor.options.message_set_wire_format;
        for (field, value) in self.fields.values() {
            write_field(field, value, message_set_format, out);
        }
        self.unknown.write_to(out);
    }

    pub fn serialized_size(&self) -> usize {
        let message_set_format = self.descriptor.options.message_set_wire_format;
        let mut size = 0;
        for (field, value) in self.fields.values() {
            size += field_size(field, value, message_set_format);
        }
        size + self.unknown.serialized_size()
    }

    pub fn to_builder(&self) -> FieldSetBuilder {
        FieldSetBuilder {
            descriptor: self.descriptor.clone(),
            fields: self.fields.clone(),
            unknown: self.unknown.to_builder(),
        }
    }
}

impl PartialEq for FieldSet {
    fn eq(&self, other: &Self) -> bool {
        if self.descriptor.full_name != other.descriptor.full_name || self.unknown != other.unknown {
            return false;
        }
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|(number, (_, value))| other.fields.get(number).is_some_and(|(_, ov)| fields_equal(value, ov)))
    }
}

fn fields_equal(a: &FieldValue, b: &FieldValue) -> bool {
    crate::message::values_equal(&a.as_ref(), &b.as_ref())
}
