//! Reflection-only `Message`/`Builder` pair (§4.4): a message constructed
//! purely from a [`MessageDescriptor`] and a [`FieldSet`], with no generated
//! Rust type behind it.
//!
//! [`DynamicBuilder`] is also where the wire-format parsing loop lives:
//! [`FieldSet`]/[`FieldSetBuilder`] know how to read and write one already-
//! decoded value, but the tag-by-tag dispatch — resolving a field number
//! against the descriptor or an [`ExtensionRegistry`], tolerating packed vs.
//! unpacked repeated scalars, diverting an out-of-range enum value or an
//! unrecognized tag to the [`UnknownFieldSet`], and bounding recursion into
//! nested messages — belongs one level up, since it needs to construct new
//! sub-builders as it goes.

use std::sync::Arc;

use crate::descriptor::{FieldDescriptor, FieldType, MappedType, MessageDescriptor};
use crate::error::{ParseOptions, ProtoError};
use crate::extension::{EmptyExtensionRegistry, ExtensionRegistry};
use crate::field_set::{FieldSet, FieldSetBuilder};
use crate::message::{Builder, Message};
use crate::unknown::{UnknownFieldSet, UnknownFieldSetBuilder};
use crate::value::{FieldValue, Value};
use crate::wire::{self, CodedInput, CodedOutput, WireType};

/// An immutable message backed entirely by a [`FieldSet`] — the "dynamic
/// message" of §4.4, as opposed to a generated type that happens to
/// delegate to one (see `crate::message::examples` for a worked example of
/// the latter).
#[derive(Debug, Clone)]
pub struct DynamicMessage {
    fields: FieldSet,
}

impl DynamicMessage {
    /// The all-default instance for `descriptor`: no fields set, empty
    /// unknown data.
    pub fn new_default(descriptor: MessageDescriptor) -> Self {
        DynamicMessage {
            fields: FieldSetBuilder::new(descriptor).freeze(),
        }
    }

    pub fn from_field_set(fields: FieldSet) -> Self {
        DynamicMessage { fields }
    }

    pub fn field_set(&self) -> &FieldSet {
        &self.fields
    }

    pub fn to_builder(&self) -> DynamicBuilder {
        DynamicBuilder {
            fields: self.fields.to_builder(),
            parse_options: ParseOptions::default(),
        }
    }

    pub fn get(&self, field: &FieldDescriptor) -> Option<Value<'_>> {
        self.fields.get(field)
    }

    /// Default-value-aware read (§3/§4.3) — see [`Message::get_field_or_default`].
    pub fn get_or_default<'a>(&'a self, field: &'a FieldDescriptor) -> Option<Value<'a>> {
        self.get_field_or_default(field)
    }

    pub fn has(&self, field: &FieldDescriptor) -> Result<bool, ProtoError> {
        self.fields.has(field)
    }

    pub fn get_repeated_count(&self, field: &FieldDescriptor) -> Result<usize, ProtoError> {
        self.fields.get_repeated_count(field)
    }

    /// Parses `bytes` against `descriptor`, resolving extensions via
    /// `registry`. A `Malformed` wire error or an `Uninitialized` missing-
    /// required-field error are both reported as `InvalidProtocolBuffer`,
    /// the single top-level parse-failure category (§7).
    pub fn parse_from(bytes: &[u8], descriptor: MessageDescriptor, registry: &dyn ExtensionRegistry) -> Result<DynamicMessage, ProtoError> {
        let mut builder = DynamicBuilder::new(descriptor);
        builder.merge_from_bytes(bytes, registry).map_err(ProtoError::into_invalid_protocol_buffer)?;
        builder.build().map_err(ProtoError::into_invalid_protocol_buffer)
    }

    /// [`Self::parse_from`] against a registry with no registered
    /// extensions — any extension tag present in `bytes` lands in the
    /// unknown field set.
    pub fn parse_from_bytes(bytes: &[u8], descriptor: MessageDescriptor) -> Result<DynamicMessage, ProtoError> {
        Self::parse_from(bytes, descriptor, &EmptyExtensionRegistry)
    }
}

impl Message for DynamicMessage {
    fn descriptor_for_type(&self) -> &MessageDescriptor {
        self.fields.descriptor()
    }

    fn default_instance_for_type(&self) -> Arc<dyn Message> {
        Arc::new(DynamicMessage::new_default(self.fields.descriptor().clone()))
    }

    fn all_fields(&self) -> Vec<(FieldDescriptor, Value<'_>)> {
        self.fields.all_fields()
    }

    fn has_field(&self, field: &FieldDescriptor) -> Result<bool, ProtoError> {
        self.fields.has(field)
    }

    fn get_field(&self, field: &FieldDescriptor) -> Option<Value<'_>> {
        self.fields.get(field)
    }

    fn get_repeated_count(&self, field: &FieldDescriptor) -> Result<usize, ProtoError> {
        self.fields.get_repeated_count(field)
    }

    fn unknown_fields(&self) -> &UnknownFieldSet {
        self.fields.unknown_fields()
    }

    fn is_initialized(&self) -> bool {
        self.fields.is_initialized()
    }

    fn write_to(&self, out: &mut CodedOutput) {
        self.fields.write_to(out)
    }

    fn serialized_size(&self) -> usize {
        self.fields.serialized_size()
    }
}

impl PartialEq for DynamicMessage {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

/// The mutable counterpart to [`DynamicMessage`]: a [`FieldSetBuilder`] plus
/// the [`ParseOptions`] governing recursion while merging or parsing.
#[derive(Debug)]
pub struct DynamicBuilder {
    fields: FieldSetBuilder,
    parse_options: ParseOptions,
}

impl DynamicBuilder {
    pub fn new(descriptor: MessageDescriptor) -> Self {
        DynamicBuilder {
            fields: FieldSetBuilder::new(descriptor),
            parse_options: ParseOptions::default(),
        }
    }

    pub fn with_options(descriptor: MessageDescriptor, parse_options: ParseOptions) -> Self {
        DynamicBuilder {
            fields: FieldSetBuilder::new(descriptor),
            parse_options,
        }
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        self.fields.descriptor()
    }

    pub fn get(&self, field: &FieldDescriptor) -> Option<Value<'_>> {
        self.fields.get(field)
    }

    pub fn has(&self, field: &FieldDescriptor) -> Result<bool, ProtoError> {
        self.fields.has(field)
    }

    pub fn get_repeated_count(&self, field: &FieldDescriptor) -> Result<usize, ProtoError> {
        self.fields.get_repeated_count(field)
    }

    pub fn set_element(&mut self, field: &FieldDescriptor, index: usize, element: FieldValue) -> Result<(), ProtoError> {
        self.fields.set_element(field, index, element)
    }

    /// Parses `bytes` as an encoding of this builder's message type,
    /// merging into whatever is already set (matching `mergeFrom(bytes)` in
    /// every mainstream protobuf runtime — parsing never starts from a
    /// clean slate unless the builder itself is fresh).
    pub fn merge_from_bytes(&mut self, bytes: &[u8], registry: &dyn ExtensionRegistry) -> Result<(), ProtoError> {
        let mut input = CodedInput::new(bytes);
        match self.merge_from_input(&mut input, registry, 0)? {
            Some(_) => Err(ProtoError::malformed("unexpected END_GROUP at top level")),
            None => Ok(()),
        }
    }

    /// The core tag-dispatch loop (§4.4). Returns the field number carried
    /// by an `END_GROUP` tag that terminated this scope, or `None` at a
    /// clean end of input — the same "stop signal" convention
    /// [`UnknownFieldSetBuilder::merge_field`] uses.
    fn merge_from_input(&mut self, input: &mut CodedInput, registry: &dyn ExtensionRegistry, depth: u32) -> Result<Option<u32>, ProtoError> {
        if depth > self.parse_options.max_recursion_depth {
            return Err(ProtoError::malformed("exceeded max recursion depth while parsing"));
        }
        loop {
            let Some(tag) = input.read_tag()? else {
                return Ok(None);
            };
            let (field_number, wire_type_raw) = wire::split_tag(tag);
            let wire_type = WireType::from_u32(wire_type_raw)?;
            if wire_type == WireType::EndGroup {
                return Ok(Some(field_number));
            }
            if field_number == 0 {
                return Err(ProtoError::malformed("field number zero"));
            }

            let descriptor = self.fields.descriptor().clone();
            let field = descriptor.find_field_by_number(field_number as i32).cloned().or_else(|| {
                if descriptor.is_extension_number(field_number as i32) {
                    registry.find_extension(&descriptor.full_name, field_number as i32).cloned()
                } else {
                    None
                }
            });

            if field.is_none()
                && descriptor.options.message_set_wire_format
                && field_number == wire::MESSAGE_SET_ITEM_TAG
                && wire_type == WireType::StartGroup
            {
                self.merge_message_set_item(input, registry, depth)?;
                continue;
            }

            let Some(field) = field else {
                self.fields.merge_unknown_field(tag, input)?;
                continue;
            };

            self.merge_known_field(&field, tag, wire_type, input, registry, depth)?;
        }
    }

    fn merge_known_field(
        &mut self,
        field: &FieldDescriptor,
        tag: u32,
        wire_type: WireType,
        input: &mut CodedInput,
        registry: &dyn ExtensionRegistry,
        depth: u32,
    ) -> Result<(), ProtoError> {
        let declared = field.wire_type();

        // Packed/unpacked tolerance (§4.4, §8 scenario 2): a repeated
        // packable field may legally arrive length-delimited even though
        // its own declared wire type is its unpacked one, and vice versa —
        // `field.is_packed()` only controls what *we* write.
        if field.is_repeated() && field.field_type.is_packable() && wire_type == WireType::LengthDelimited && declared != WireType::LengthDelimited {
            return self.merge_packed_scalar(field, input);
        }

        if wire_type != declared {
            self.fields.merge_unknown_field(tag, input)?;
            return Ok(());
        }

        match field.mapped_type() {
            MappedType::Message => self.merge_message_field(field, input, registry, depth),
            MappedType::Enum => self.merge_enum_element_or_unknown(field, input),
            _ => self.merge_scalar_field(field, input),
        }
    }

    fn merge_scalar_field(&mut self, field: &FieldDescriptor, input: &mut CodedInput) -> Result<(), ProtoError> {
        let value = read_scalar_value(field.field_type, input)?;
        if field.is_repeated() {
            self.fields.add_repeated(field, value)
        } else {
            self.fields.set(field, value)
        }
    }

    fn merge_packed_scalar(&mut self, field: &FieldDescriptor, input: &mut CodedInput) -> Result<(), ProtoError> {
        let len = input.read_varint32()? as i64;
        let token = input.push_limit(len)?;
        while !input.reached_limit() {
            if field.mapped_type() == MappedType::Enum {
                self.merge_enum_element_or_unknown(field, input)?;
            } else {
                let value = read_scalar_value(field.field_type, input)?;
                self.fields.add_repeated(field, value)?;
            }
        }
        input.pop_limit(token);
        Ok(())
    }

    /// Reads one varint-encoded enum number. An out-of-range value is not a
    /// parse error (§4.4, §9): it is preserved verbatim in the unknown
    /// field set (individually, even inside a packed run) and the field is
    /// left untouched.
    fn merge_enum_element_or_unknown(&mut self, field: &FieldDescriptor, input: &mut CodedInput) -> Result<(), ProtoError> {
        let raw = input.read_varint64()?;
        let enum_type = field.enum_type.as_ref().expect("ENUM field must carry an enum_type descriptor");
        match enum_type.find_value_by_number(raw as i32) {
            Some(value_descriptor) => {
                let value = FieldValue::Enum(value_descriptor.clone());
                if field.is_repeated() {
                    self.fields.add_repeated(field, value)
                } else {
                    self.fields.set(field, value)
                }
            }
            None => {
                self.fields.merge_unknown_varint(field.number as u32, raw);
                Ok(())
            }
        }
    }

    fn merge_message_field(&mut self, field: &FieldDescriptor, input: &mut CodedInput, registry: &dyn ExtensionRegistry, depth: u32) -> Result<(), ProtoError> {
        if depth + 1 > self.parse_options.max_recursion_depth {
            return Err(ProtoError::malformed("exceeded max recursion depth while parsing nested message"));
        }
        let message_type = field.message_type.clone().expect("MESSAGE/GROUP field must carry a message_type descriptor");

        let built: Arc<dyn Message> = if matches!(field.field_type, FieldType::Group) {
            let mut sub = DynamicBuilder::with_options(message_type, self.parse_options);
            if !field.is_repeated() {
                if let Some(Value::Message(existing)) = self.fields.get(field) {
                    sub.merge_from(existing.as_ref())?;
                }
            }
            let end = sub.merge_from_input(input, registry, depth + 1)?;
            if end != Some(field.number as u32) {
                return Err(ProtoError::malformed("mismatched group end tag"));
            }
            Arc::new(sub.build_partial())
        } else {
            let bytes = input.read_bytes()?;
            let mut sub = DynamicBuilder::with_options(message_type, self.parse_options);
            if !field.is_repeated() {
                if let Some(Value::Message(existing)) = self.fields.get(field) {
                    sub.merge_from(existing.as_ref())?;
                }
            }
            let mut sub_input = CodedInput::new(bytes);
            if sub.merge_from_input(&mut sub_input, registry, depth + 1)?.is_some() {
                return Err(ProtoError::malformed("unexpected END_GROUP inside length-delimited message"));
            }
            Arc::new(sub.build_partial())
        };

        if field.is_repeated() {
            self.fields.add_repeated(field, FieldValue::Message(built))
        } else {
            self.fields.set(field, FieldValue::Message(built))
        }
    }

    /// Legacy message-set wire format (§4.2, §4.4, §8 scenario 3): the
    /// `message_set_item` group carries a `type_id` instead of a normal
    /// field number; the actual dispatch field is resolved by looking up
    /// `(containing_type, type_id)` in the extension registry.
    fn merge_message_set_item(&mut self, input: &mut CodedInput, registry: &dyn ExtensionRegistry, depth: u32) -> Result<(), ProtoError> {
        let mut type_id: Option<i32> = None;
        let mut message_bytes: Option<Arc<[u8]>> = None;
        loop {
            let Some(inner_tag) = input.read_tag()? else {
                return Err(ProtoError::malformed("unterminated message-set item"));
            };
            let (number, wt) = wire::split_tag(inner_tag);
            match WireType::from_u32(wt)? {
                WireType::EndGroup => break,
                WireType::Varint if number == wire::MESSAGE_SET_TYPE_ID_TAG => {
                    type_id = Some(input.read_varint32()? as i32);
                }
                WireType::LengthDelimited if number == wire::MESSAGE_SET_MESSAGE_TAG => {
                    message_bytes = Some(Arc::from(input.read_bytes()?));
                }
                other => input.skip_field(other)?,
            }
        }

        let (Some(type_id), Some(message_bytes)) = (type_id, message_bytes) else {
            // A partial item (missing type_id or message) carries nothing
            // we could dispatch or faithfully preserve; dropping it matches
            // the leniency every mainstream parser applies here.
            return Ok(());
        };

        let descriptor = self.fields.descriptor().clone();
        match registry.find_extension(&descriptor.full_name, type_id).cloned() {
            Some(field) => self.merge_message_bytes(&field, &message_bytes, registry, depth),
            None => {
                let mut item = UnknownFieldSetBuilder::new();
                item.merge_varint(wire::MESSAGE_SET_TYPE_ID_TAG, type_id as u64);
                item.merge_length_delimited(wire::MESSAGE_SET_MESSAGE_TAG, message_bytes);
                self.fields.merge_unknown_group(wire::MESSAGE_SET_ITEM_TAG, item.freeze());
                Ok(())
            }
        }
    }

    fn merge_message_bytes(&mut self, field: &FieldDescriptor, bytes: &[u8], registry: &dyn ExtensionRegistry, depth: u32) -> Result<(), ProtoError> {
        if depth + 1 > self.parse_options.max_recursion_depth {
            return Err(ProtoError::malformed("exceeded max recursion depth while parsing nested message"));
        }
        let message_type = field.message_type.clone().expect("MESSAGE field must carry a message_type descriptor");
        let mut sub = DynamicBuilder::with_options(message_type, self.parse_options);
        if !field.is_repeated() {
            if let Some(Value::Message(existing)) = self.fields.get(field) {
                sub.merge_from(existing.as_ref())?;
            }
        }
        let mut sub_input = CodedInput::new(bytes);
        if sub.merge_from_input(&mut sub_input, registry, depth + 1)?.is_some() {
            return Err(ProtoError::malformed("unexpected END_GROUP inside length-delimited message"));
        }
        let built: Arc<dyn Message> = Arc::new(sub.build_partial());
        if field.is_repeated() {
            self.fields.add_repeated(field, FieldValue::Message(built))
        } else {
            self.fields.set(field, FieldValue::Message(built))
        }
    }
}

impl Builder for DynamicBuilder {
    type Built = DynamicMessage;

    fn set_field(&mut self, field: &FieldDescriptor, value: FieldValue) -> Result<(), ProtoError> {
        self.fields.set(field, value)
    }

    fn clear_field(&mut self, field: &FieldDescriptor) -> Result<(), ProtoError> {
        self.fields.clear(field);
        Ok(())
    }

    fn add_repeated_field(&mut self, field: &FieldDescriptor, value: FieldValue) -> Result<(), ProtoError> {
        self.fields.add_repeated(field, value)
    }

    fn merge_from(&mut self, other: &dyn Message) -> Result<(), ProtoError> {
        self.fields.merge_from_with_options(other, self.parse_options)
    }

    fn merge_unknown_fields(&mut self, other: &UnknownFieldSet) {
        self.fields.merge_unknown_fields(other)
    }

    fn build(self) -> Result<DynamicMessage, ProtoError> {
        if !self.fields.is_initialized() {
            let missing_fields = self.fields.missing_required_fields();
            let partial = Arc::new(DynamicMessage::from_field_set(self.fields.freeze()));
            return Err(ProtoError::Uninitialized { missing_fields, partial });
        }
        Ok(DynamicMessage::from_field_set(self.fields.freeze()))
    }

    fn build_partial(self) -> DynamicMessage {
        DynamicMessage::from_field_set(self.fields.freeze())
    }
}

fn read_scalar_value(field_type: FieldType, input: &mut CodedInput) -> Result<FieldValue, ProtoError> {
    Ok(match field_type {
        FieldType::Int32 => FieldValue::Int32(input.read_varint32()? as i32),
        FieldType::SInt32 => FieldValue::Int32(input.read_sint32()?),
        FieldType::SFixed32 => FieldValue::Int32(input.read_fixed32()? as i32),
        FieldType::Int64 => FieldValue::Int64(input.read_varint64()? as i64),
        FieldType::SInt64 => FieldValue::Int64(input.read_sint64()?),
        FieldType::SFixed64 => FieldValue::Int64(input.read_fixed64()? as i64),
        FieldType::UInt32 => FieldValue::UInt32(input.read_varint32()?),
        FieldType::Fixed32 => FieldValue::UInt32(input.read_fixed32()?),
        FieldType::UInt64 => FieldValue::UInt64(input.read_varint64()?),
        FieldType::Fixed64 => FieldValue::UInt64(input.read_fixed64()?),
        FieldType::Float => FieldValue::Float(input.read_float()?),
        FieldType::Double => FieldValue::Double(input.read_double()?),
        FieldType::Bool => FieldValue::Bool(input.read_bool()?),
        FieldType::String => FieldValue::String(Arc::from(input.read_string()?)),
        FieldType::Bytes => FieldValue::Bytes(Arc::from(input.read_bytes()?)),
        FieldType::Enum | FieldType::Message | FieldType::Group => {
            unreachable!("enum/message/group fields are dispatched before reaching read_scalar_value")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Cardinality, EnumDescriptorData, EnumValueDescriptorData, FieldDescriptorData, MessageDescriptorData, MessageOptions};
    use crate::extension::MapExtensionRegistry;

    fn field(
        number: i32,
        name: &str,
        field_type: FieldType,
        cardinality: Cardinality,
        packed: bool,
        required: bool,
        message_type: Option<MessageDescriptor>,
        enum_type: Option<crate::descriptor::EnumDescriptor>,
    ) -> FieldDescriptor {
        Arc::new(FieldDescriptorData {
            number,
            name: Arc::from(name),
            full_name: Arc::from(format!("test.Msg.{name}")),
            field_type,
            cardinality,
            packed,
            required,
            is_extension: false,
            containing_type_full_name: Arc::from("test.Msg"),
            message_type,
            enum_type,
            default_value: None,
        })
    }

    fn descriptor(full_name: &str, fields: Vec<FieldDescriptor>) -> MessageDescriptor {
        Arc::new(MessageDescriptorData {
            full_name: Arc::from(full_name),
            fields,
            extension_ranges: vec![],
            options: MessageOptions::default(),
        })
    }

    #[test]
    fn round_trips_all_scalar_kinds() {
        let desc = descriptor(
            "test.Scalars",
            vec![
                field(1, "i", FieldType::Int32, Cardinality::Singular, false, false, None, None),
                field(2, "s", FieldType::String, Cardinality::Singular, false, false, None, None),
                field(3, "b", FieldType::Bool, Cardinality::Singular, false, false, None, None),
            ],
        );
        let i = desc.fields[0].clone();
        let s = desc.fields[1].clone();
        let b = desc.fields[2].clone();

        let mut builder = DynamicBuilder::new(desc.clone());
        builder.set_field(&i, FieldValue::Int32(-7)).unwrap();
        builder.set_field(&s, FieldValue::String(Arc::from("hi"))).unwrap();
        builder.set_field(&b, FieldValue::Bool(true)).unwrap();
        let built = builder.build().unwrap();

        let bytes = built.to_bytes();
        let reparsed = DynamicMessage::parse_from_bytes(&bytes, desc).unwrap();
        assert!(matches!(reparsed.get(&i), Some(Value::Int32(-7))));
        assert!(matches!(reparsed.get(&s), Some(Value::String("hi"))));
        assert!(matches!(reparsed.get(&b), Some(Value::Bool(true))));
        assert_eq!(reparsed.to_bytes(), bytes);
    }

    #[test]
    fn packed_and_unpacked_encodings_both_parse() {
        let desc = descriptor(
            "test.Repeated",
            vec![field(1, "values", FieldType::Int32, Cardinality::Repeated, true, false, None, None)],
        );
        let values = desc.fields[0].clone();

        // Hand-encode the field unpacked (three individual varint tags).
        let mut unpacked = CodedOutput::new();
        for v in [1i32, 2, 300] {
            unpacked.write_tag(1, WireType::Varint);
            unpacked.write_varint64(v as i64 as u64);
        }
        let unpacked = unpacked.into_vec();

        let parsed = DynamicMessage::parse_from_bytes(&unpacked, desc.clone()).unwrap();
        assert_eq!(parsed.get_repeated_count(&values).unwrap(), 3);

        // The packed encoding our own writer produces must parse back too.
        let mut builder = DynamicBuilder::new(desc.clone());
        builder.add_repeated_field(&values, FieldValue::Int32(1)).unwrap();
        builder.add_repeated_field(&values, FieldValue::Int32(2)).unwrap();
        builder.add_repeated_field(&values, FieldValue::Int32(300)).unwrap();
        let built = builder.build().unwrap();
        let packed_bytes = built.to_bytes();
        let reparsed = DynamicMessage::parse_from_bytes(&packed_bytes, desc).unwrap();
        assert_eq!(reparsed.get_repeated_count(&values).unwrap(), 3);
    }

    #[test]
    fn unrecognized_field_survives_as_unknown() {
        let desc = descriptor("test.Empty", vec![]);
        let mut out = CodedOutput::new();
        out.write_tag(999, WireType::Varint);
        out.write_varint64(17);
        let bytes = out.into_vec();

        let parsed = DynamicMessage::parse_from_bytes(&bytes, desc).unwrap();
        assert_eq!(parsed.unknown_fields().field(999).unwrap().varints, vec![17]);
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn unrecognized_enum_value_is_preserved_not_set() {
        let enum_type: crate::descriptor::EnumDescriptor = Arc::new(EnumDescriptorData {
            full_name: Arc::from("test.Color"),
            values: vec![Arc::new(EnumValueDescriptorData {
                name: Arc::from("RED"),
                number: 1,
                enum_type_full_name: Arc::from("test.Color"),
            })],
        });
        let desc = descriptor(
            "test.HasEnum",
            vec![field(1, "color", FieldType::Enum, Cardinality::Singular, false, false, None, Some(enum_type))],
        );
        let color = desc.fields[0].clone();

        let mut out = CodedOutput::new();
        out.write_tag(1, WireType::Varint);
        out.write_varint32(99); // not a declared enum value
        let bytes = out.into_vec();

        let parsed = DynamicMessage::parse_from_bytes(&bytes, desc).unwrap();
        assert!(parsed.get(&color).is_none());
        assert_eq!(parsed.unknown_fields().field(1).unwrap().varints, vec![99]);
    }

    #[test]
    fn required_field_enforcement() {
        let desc = descriptor(
            "test.Required",
            vec![field(1, "id", FieldType::Int32, Cardinality::Singular, false, true, None, None)],
        );
        let builder = DynamicBuilder::new(desc);
        match builder.build() {
            Err(ProtoError::Uninitialized { missing_fields, .. }) => {
                assert_eq!(missing_fields, vec!["id".to_string()]);
            }
            other => panic!("expected Uninitialized, got {other:?}"),
        }
    }

    #[test]
    fn build_partial_skips_required_check() {
        let desc = descriptor(
            "test.Required",
            vec![field(1, "id", FieldType::Int32, Cardinality::Singular, false, true, None, None)],
        );
        let builder = DynamicBuilder::new(desc);
        let partial = builder.build_partial();
        assert!(!partial.is_initialized());
    }

    #[test]
    fn nested_singular_message_merges_recursively() {
        let inner_desc = descriptor(
            "test.Inner",
            vec![
                field(1, "a", FieldType::Int32, Cardinality::Singular, false, false, None, None),
                field(2, "b", FieldType::Int32, Cardinality::Singular, false, false, None, None),
            ],
        );
        let a = inner_desc.fields[0].clone();
        let b = inner_desc.fields[1].clone();
        let outer_desc = descriptor(
            "test.Outer",
            vec![field(1, "inner", FieldType::Message, Cardinality::Singular, false, false, Some(inner_desc.clone()), None)],
        );
        let inner_field = outer_desc.fields[0].clone();

        let mut first_inner = DynamicBuilder::new(inner_desc.clone());
        first_inner.set_field(&a, FieldValue::Int32(1)).unwrap();
        let mut first = DynamicBuilder::new(outer_desc.clone());
        first.set_field(&inner_field, FieldValue::Message(Arc::new(first_inner.build_partial()))).unwrap();
        let first = first.build_partial();

        let mut second_inner = DynamicBuilder::new(inner_desc);
        second_inner.set_field(&b, FieldValue::Int32(2)).unwrap();
        let mut second = DynamicBuilder::new(outer_desc);
        second.set_field(&inner_field, FieldValue::Message(Arc::new(second_inner.build_partial()))).unwrap();
        let second = second.build_partial();

        let mut merged = first.to_builder();
        merged.merge_from(&second).unwrap();
        let merged = merged.build_partial();

        let Some(Value::Message(inner)) = merged.get(&inner_field) else {
            panic!("expected a merged inner message");
        };
        assert!(matches!(inner.get_field(&a), Some(Value::Int32(1))));
        assert!(matches!(inner.get_field(&b), Some(Value::Int32(2))));
    }

    #[test]
    fn message_set_extension_round_trips() {
        let ext_desc = descriptor(
            "test.Ext",
            vec![field(1, "value", FieldType::Int32, Cardinality::Singular, false, false, None, None)],
        );
        let value_field = ext_desc.fields[0].clone();

        let ext_field: FieldDescriptor = Arc::new(FieldDescriptorData {
            number: 4,
            name: Arc::from("ext"),
            full_name: Arc::from("test.Ext.ext"),
            field_type: FieldType::Message,
            cardinality: Cardinality::Singular,
            packed: false,
            required: false,
            is_extension: true,
            containing_type_full_name: Arc::from("test.MessageSet"),
            message_type: Some(ext_desc.clone()),
            enum_type: None,
            default_value: None,
        });

        let mut registry = MapExtensionRegistry::new();
        registry.register(ext_field.clone());

        let mut message_set_options = MessageOptions::default();
        message_set_options.message_set_wire_format = true;
        let message_set_desc = Arc::new(MessageDescriptorData {
            full_name: Arc::from("test.MessageSet"),
            fields: vec![],
            extension_ranges: vec![crate::descriptor::ExtensionRange { start: 1, end: i32::MAX }],
            options: message_set_options,
        });

        let mut inner = DynamicBuilder::new(ext_desc);
        inner.set_field(&value_field, FieldValue::Int32(42)).unwrap();
        let inner = inner.build_partial();

        let mut out = CodedOutput::new();
        out.write_message_set_extension(4, &inner.to_bytes());
        let bytes = out.into_vec();

        let parsed = DynamicMessage::parse_from(&bytes, message_set_desc, &registry).unwrap();
        let Some(Value::Message(ext)) = parsed.get(&ext_field) else {
            panic!("expected the message-set extension to be set");
        };
        assert!(matches!(ext.get_field(&value_field), Some(Value::Int32(42))));
    }

    #[test]
    fn unrecognized_message_set_extension_survives_as_unknown() {
        let mut message_set_options = MessageOptions::default();
        message_set_options.message_set_wire_format = true;
        let message_set_desc = Arc::new(MessageDescriptorData {
            full_name: Arc::from("test.MessageSet"),
            fields: vec![],
            extension_ranges: vec![crate::descriptor::ExtensionRange { start: 1, end: i32::MAX }],
            options: message_set_options,
        });

        let mut out = CodedOutput::new();
        out.write_message_set_extension(999, &[9, 9, 9]);
        let bytes = out.into_vec();

        let parsed = DynamicMessage::parse_from_bytes(&bytes, message_set_desc).unwrap();
        assert!(!parsed.unknown_fields().is_empty());
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn unset_singular_scalar_reads_as_default_but_has_is_false() {
        let desc = descriptor(
            "test.Defaults",
            vec![field(1, "i", FieldType::Int32, Cardinality::Singular, false, false, None, None)],
        );
        let i = desc.fields[0].clone();
        let message = DynamicMessage::new_default(desc);

        assert!(!message.has(&i).unwrap());
        assert!(message.get(&i).is_none());
        assert!(matches!(message.get_or_default(&i), Some(Value::Int32(0))));
    }

    #[test]
    fn unset_repeated_field_reads_as_empty_sequence() {
        let desc = descriptor(
            "test.Defaults",
            vec![field(1, "values", FieldType::Int32, Cardinality::Repeated, false, false, None, None)],
        );
        let values = desc.fields[0].clone();
        let message = DynamicMessage::new_default(desc);

        assert_eq!(message.get_repeated_count(&values).unwrap(), 0);
        assert!(matches!(message.get_or_default(&values), Some(Value::RepeatedInt32(&[]))));
    }

    #[test]
    fn unset_singular_message_reads_as_none() {
        let inner = descriptor("test.Inner", vec![]);
        let desc = descriptor(
            "test.Outer",
            vec![field(1, "inner", FieldType::Message, Cardinality::Singular, false, false, Some(inner), None)],
        );
        let inner_field = desc.fields[0].clone();
        let message = DynamicMessage::new_default(desc);

        assert!(message.get_or_default(&inner_field).is_none());
    }

    #[test]
    fn recursion_depth_is_bounded() {
        const DEPTH: usize = 150;
        // A chain of distinct descriptors, each one level deeper than the
        // last: level 0 has no fields, level N has a singular message field
        // "next" pointing at level N-1. A real self-referential descriptor
        // would need interior mutability this crate's immutable descriptor
        // types don't carry, so a long acyclic chain stands in for it here.
        let mut level = descriptor("test.Level0", vec![]);
        for depth in 1..=DEPTH {
            let next_field = field(1, "next", FieldType::Message, Cardinality::Singular, false, false, Some(level.clone()), None);
            level = descriptor(&format!("test.Level{depth}"), vec![next_field]);
        }
        let top = level;

        let mut bytes = Vec::new();
        for _ in 0..DEPTH {
            let mut out = CodedOutput::new();
            out.write_tag(1, WireType::LengthDelimited);
            out.write_bytes_field(&bytes);
            bytes = out.into_vec();
        }

        let mut builder = DynamicBuilder::with_options(top, ParseOptions { max_recursion_depth: 100 });
        let err = builder.merge_from_bytes(&bytes, &EmptyExtensionRegistry).unwrap_err();
        assert!(matches!(err, ProtoError::Malformed(_)));
    }
}
