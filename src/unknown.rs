//! Preserved-but-unrecognized wire data, indexed by tag field number
//! instead of descriptor.
//!
//! Shares the mutable-then-frozen lifecycle of [`crate::field_set::FieldSet`]:
//! [`UnknownFieldSetBuilder`] accumulates during parsing, then
//! [`UnknownFieldSetBuilder::freeze`] produces an immutable
//! [`UnknownFieldSet`] that is cheap to clone (an `Arc` handle) and safe to
//! share across concurrent readers.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ProtoError;
use crate::wire::{CodedInput, CodedOutput, WireType};

/// The four ordered sequences (plus nested unknown groups) that can land on
/// one unrecognized field number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnknownField {
    pub varints: Vec<u64>,
    pub fixed32s: Vec<u32>,
    pub fixed64s: Vec<u64>,
    pub length_delimited: Vec<Arc<[u8]>>,
    pub groups: Vec<UnknownFieldSet>,
}

impl UnknownField {
    fn is_empty(&self) -> bool {
        self.varints.is_empty()
            && self.fixed32s.is_empty()
            && self.fixed64s.is_empty()
            && self.length_delimited.is_empty()
            && self.groups.is_empty()
    }
}

#[derive(Debug, Default)]
struct UnknownFieldSetData {
    fields: BTreeMap<u32, UnknownField>,
}

impl UnknownFieldSetData {
    fn write_to(&self, out: &mut CodedOutput) {
        for (&number, field) in &self.fields {
            for &v in &field.varints {
                out.write_tag(number, WireType::Varint);
                out.write_varint64(v);
            }
            for &v in &field.fixed32s {
                out.write_tag(number, WireType::Fixed32);
                out.write_fixed32(v);
            }
            for &v in &field.fixed64s {
                out.write_tag(number, WireType::Fixed64);
                out.write_fixed64(v);
            }
            for bytes in &field.length_delimited {
                out.write_tag(number, WireType::LengthDelimited);
                out.write_bytes_field(bytes);
            }
            for group in &field.groups {
                out.write_tag(number, WireType::StartGroup);
                group.write_to(out);
                out.write_tag(number, WireType::EndGroup);
            }
        }
    }

    fn serialized_size(&self) -> usize {
        let mut size = 0;
        for (&number, field) in &self.fields {
            let tag_len = crate::wire::tag_size(number);
            size += tag_len * field.varints.len();
            size += field.varints.iter().map(|&v| crate::wire::varint64_size(v)).sum::<usize>();
            size += (tag_len + 4) * field.fixed32s.len();
            size += (tag_len + 8) * field.fixed64s.len();
            for bytes in &field.length_delimited {
                size += tag_len + crate::wire::varint32_size(bytes.len() as u32) + bytes.len();
            }
            for group in &field.groups {
                size += 2 * tag_len + group.serialized_size();
            }
        }
        size
    }
}

/// Mutable accumulator for unrecognized wire data, used while parsing.
#[derive(Debug, Default)]
pub struct UnknownFieldSetBuilder {
    data: UnknownFieldSetData,
}

impl UnknownFieldSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge_varint(&mut self, field_number: u32, value: u64) {
        self.data.fields.entry(field_number).or_default().varints.push(value);
    }

    pub fn merge_fixed32(&mut self, field_number: u32, value: u32) {
        self.data.fields.entry(field_number).or_default().fixed32s.push(value);
    }

    pub fn merge_fixed64(&mut self, field_number: u32, value: u64) {
        self.data.fields.entry(field_number).or_default().fixed64s.push(value);
    }

    pub fn merge_length_delimited(&mut self, field_number: u32, bytes: Arc<[u8]>) {
        self.data.fields.entry(field_number).or_default().length_delimited.push(bytes);
    }

    pub fn merge_group(&mut self, field_number: u32, group: UnknownFieldSet) {
        self.data.fields.entry(field_number).or_default().groups.push(group);
    }

    /// Dispatches on the wire type carried by `tag`, appending the decoded
    /// value under `field_number`. Returns `Ok(false)` when it consumed an
    /// `END_GROUP` tag terminating the current scope — the sole mechanism
    /// by which a parser pops out of a nested group.
    pub fn merge_field(&mut self, tag: u32, input: &mut CodedInput) -> Result<bool, ProtoError> {
        let (field_number, wire_type) = crate::wire::split_tag(tag);
        match WireType::from_u32(wire_type)? {
            WireType::Varint => {
                let v = input.read_varint64()?;
                self.merge_varint(field_number, v);
            }
            WireType::Fixed32 => {
                let v = input.read_fixed32()?;
                self.merge_fixed32(field_number, v);
            }
            WireType::Fixed64 => {
                let v = input.read_fixed64()?;
                self.merge_fixed64(field_number, v);
            }
            WireType::LengthDelimited => {
                let bytes: Arc<[u8]> = Arc::from(input.read_bytes()?);
                self.merge_length_delimited(field_number, bytes);
            }
            WireType::StartGroup => {
                let mut group_builder = UnknownFieldSetBuilder::new();
                loop {
                    let Some(inner_tag) = input.read_tag()? else {
                        return Err(ProtoError::malformed("unterminated unknown group"));
                    };
                    if !group_builder.merge_field(inner_tag, input)? {
                        break;
                    }
                }
                self.merge_group(field_number, group_builder.freeze());
            }
            WireType::EndGroup => return Ok(false),
        }
        Ok(true)
    }

    /// Appends each category of `other` onto `self` (§4.2: "append-concatenate").
    pub fn merge_from(&mut self, other: &UnknownFieldSet) {
        for (&number, field) in &other.data.fields {
            let entry = self.data.fields.entry(number).or_default();
            entry.varints.extend_from_slice(&field.varints);
            entry.fixed32s.extend_from_slice(&field.fixed32s);
            entry.fixed64s.extend_from_slice(&field.fixed64s);
            entry.length_delimited.extend_from_slice(&field.length_delimited);
            entry.groups.extend_from_slice(&field.groups);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.fields.values().all(UnknownField::is_empty)
    }

    pub fn write_to(&self, out: &mut CodedOutput) {
        self.data.write_to(out)
    }

    pub fn serialized_size(&self) -> usize {
        self.data.serialized_size()
    }

    pub fn freeze(self) -> UnknownFieldSet {
        log::trace!("freezing unknown field set with {} tags", self.data.fields.len());
        UnknownFieldSet {
            data: Arc::new(self.data),
        }
    }
}

/// Frozen, shareable set of unrecognized wire data.
#[derive(Debug, Clone, Default)]
pub struct UnknownFieldSet {
    data: Arc<UnknownFieldSetData>,
}

impl UnknownFieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(&self, number: u32) -> Option<&UnknownField> {
        self.data.fields.get(&number)
    }

    pub fn is_empty(&self) -> bool {
        self.data.fields.values().all(UnknownField::is_empty)
    }

    pub fn write_to(&self, out: &mut CodedOutput) {
        self.data.write_to(out)
    }

    pub fn serialized_size(&self) -> usize {
        self.data.serialized_size()
    }

    pub fn to_builder(&self) -> UnknownFieldSetBuilder {
        let mut builder = UnknownFieldSetBuilder::new();
        builder.merge_from(self);
        builder
    }
}

impl PartialEq for UnknownFieldSet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data) || self.data.fields == other.data.fields
    }
}
