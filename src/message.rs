//! The contract a generated message type (and [`crate::dynamic::DynamicMessage`])
//! both satisfy, letting reflection-based code ([`crate::field_set`],
//! extension handling, the conformance tests) operate uniformly over either.
//!
//! A real code generator emitting structs that implement [`Message`]/
//! [`Builder`] against hand-written `.proto` schemas is out of scope here
//! (see the crate-level docs); this module defines only the adapter trait
//! pair the generator's output would need to satisfy.

use std::sync::Arc;

use crate::descriptor::{FieldDescriptor, MappedType, MessageDescriptor};
use crate::error::ProtoError;
use crate::unknown::UnknownFieldSet;
use crate::value::Value;
use crate::wire::CodedOutput;

/// An immutable, reflectively-accessible protobuf message.
///
/// Every method here mirrors a `FieldSet` operation of the same name;
/// generated types typically hold a `FieldSet` internally and delegate.
pub trait Message: core::fmt::Debug + Send + Sync {
    fn descriptor_for_type(&self) -> &MessageDescriptor;

    /// The all-default instance for this message type, used as the starting
    /// point for a fresh builder and as the result of `clear_field` on a
    /// singular MESSAGE field.
    fn default_instance_for_type(&self) -> Arc<dyn Message>;

    /// Set fields only, ascending by field number — the canonical
    /// serialization order.
    fn all_fields(&self) -> Vec<(FieldDescriptor, Value<'_>)>;

    fn has_field(&self, field: &FieldDescriptor) -> Result<bool, ProtoError>;

    /// Raw presence: `None` when `field` is unset, with no default-value
    /// substitution. This is what `write_to`/`serialized_size`/`all_fields`
    /// build on — an absent field is skipped on the wire, never serialized
    /// as its default. For the default-value-aware read §4.3 describes as
    /// `get(field) → value`, see [`Message::get_field_or_default`].
    fn get_field(&self, field: &FieldDescriptor) -> Option<Value<'_>>;

    fn get_repeated_count(&self, field: &FieldDescriptor) -> Result<usize, ProtoError>;

    fn unknown_fields(&self) -> &UnknownFieldSet;

    /// `false` if any `required` field (transitively, through nested
    /// required sub-messages) is unset.
    fn is_initialized(&self) -> bool;

    fn write_to(&self, out: &mut CodedOutput);

    fn serialized_size(&self) -> usize;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = CodedOutput::with_capacity(self.serialized_size());
        self.write_to(&mut out);
        out.into_vec()
    }

    /// `get(field)` per §3/§4.3: unlike [`Message::get_field`], an absent
    /// singular scalar/enum/string/bytes field reads as its descriptor's
    /// default and an absent repeated field reads as the canonical empty
    /// sequence. An absent singular MESSAGE field still reads as "none".
    /// Implemented once here in terms of `get_field` so every `Message`
    /// impl gets it for free.
    fn get_field_or_default<'a>(&'a self, field: &'a FieldDescriptor) -> Option<Value<'a>> {
        match self.get_field(field) {
            Some(v) => Some(v),
            None if field.is_repeated() => Some(crate::value::empty_repeated_view(field.mapped_type())),
            None if field.mapped_type() == MappedType::Message => None,
            None => Some(crate::value::default_value_view(field)),
        }
    }
}

/// The mutable counterpart to [`Message`]. Builders are not `Sync`: the
/// concurrency contract (§5) treats a builder as single-actor-only, unlike
/// the frozen `Message` it eventually produces.
pub trait Builder {
    type Built: Message;

    fn set_field(&mut self, field: &FieldDescriptor, value: crate::value::FieldValue) -> Result<(), ProtoError>;

    fn clear_field(&mut self, field: &FieldDescriptor) -> Result<(), ProtoError>;

    fn add_repeated_field(&mut self, field: &FieldDescriptor, value: crate::value::FieldValue) -> Result<(), ProtoError>;

    fn merge_from(&mut self, other: &dyn Message) -> Result<(), ProtoError>;

    fn merge_unknown_fields(&mut self, other: &UnknownFieldSet);

    /// Fails with [`ProtoError::Uninitialized`] if a required field is unset.
    fn build(self) -> Result<Self::Built, ProtoError>;

    /// Freezes the builder regardless of whether required fields are set,
    /// matching `buildPartial` in every mainstream protobuf runtime.
    fn build_partial(self) -> Self::Built;
}

/// Structural equality per §6: same descriptor, same set fields with equal
/// values (message-valued fields compared recursively), same unknown fields.
pub fn messages_equal(a: &dyn Message, b: &dyn Message) -> bool {
    let (da, db) = (a.descriptor_for_type(), b.descriptor_for_type());
    if da.full_name != db.full_name {
        return false;
    }
    if a.unknown_fields() != b.unknown_fields() {
        return false;
    }
    let (fa, fb) = (a.all_fields(), b.all_fields());
    if fa.len() != fb.len() {
        return false;
    }
    fa.iter().zip(fb.iter()).all(|((fda, va), (fdb, vb))| fda.number == fdb.number && values_equal(va, vb))
}

/// A worked example of a code-generated message delegating to `FieldSet`,
/// standing in for what a real `.proto` compiler's output would look like
/// (out of scope for this crate — see the crate-level docs). Shows that
/// [`Message`]/[`Builder`] are satisfiable by more than `DynamicMessage`.
/// Not `#[cfg(test)]`: integration tests under `tests/` exercise it too, and
/// those compile this crate as an ordinary dependency.
pub mod examples {
    use std::sync::{Arc, OnceLock};

    use crate::descriptor::{Cardinality, FieldDescriptor, FieldDescriptorData, FieldType, MessageDescriptor, MessageDescriptorData, MessageOptions};
    use crate::error::ProtoError;
    use crate::field_set::{FieldSet, FieldSetBuilder};
    use crate::unknown::UnknownFieldSet;
    use crate::value::{FieldValue, Value};
    use crate::wire::CodedOutput;

    use super::{Builder, Message};

    /// A hand-written stand-in for what `protoc --rust_out` would emit for:
    ///
    /// ```proto
    /// message Greeting {
    ///   required string name = 1;
    ///   optional int32 volume = 2;
    /// }
    /// ```
    ///
    /// A real generated type would expose `name()`/`set_name()` accessors
    /// over these same two fields; this example keeps the descriptor-driven
    /// plumbing visible instead of hiding it behind codegen.
    #[derive(Debug, Clone)]
    pub struct Greeting {
        fields: FieldSet,
    }

    fn name_field() -> &'static FieldDescriptor {
        static FIELD: OnceLock<FieldDescriptor> = OnceLock::new();
        FIELD.get_or_init(|| {
            Arc::new(FieldDescriptorData {
                number: 1,
                name: Arc::from("name"),
                full_name: Arc::from("example.Greeting.name"),
                field_type: FieldType::String,
                cardinality: Cardinality::Singular,
                packed: false,
                required: true,
                is_extension: false,
                containing_type_full_name: Arc::from("example.Greeting"),
                message_type: None,
                enum_type: None,
                default_value: None,
            })
        })
    }

    fn volume_field() -> &'static FieldDescriptor {
        static FIELD: OnceLock<FieldDescriptor> = OnceLock::new();
        FIELD.get_or_init(|| {
            Arc::new(FieldDescriptorData {
                number: 2,
                name: Arc::from("volume"),
                full_name: Arc::from("example.Greeting.volume"),
                field_type: FieldType::Int32,
                cardinality: Cardinality::Singular,
                packed: false,
                required: false,
                is_extension: false,
                containing_type_full_name: Arc::from("example.Greeting"),
                message_type: None,
                enum_type: None,
                default_value: None,
            })
        })
    }

    fn descriptor() -> &'static MessageDescriptor {
        static DESCRIPTOR: OnceLock<MessageDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            Arc::new(MessageDescriptorData {
                full_name: Arc::from("example.Greeting"),
                fields: vec![name_field().clone(), volume_field().clone()],
                extension_ranges: vec![],
                options: MessageOptions::default(),
            })
        })
    }

    impl Greeting {
        pub fn name(&self) -> Option<&str> {
            match self.fields.get(name_field()) {
                Some(Value::String(s)) => Some(s),
                _ => None,
            }
        }

        pub fn volume(&self) -> i32 {
            match self.fields.get(volume_field()) {
                Some(Value::Int32(v)) => v,
                _ => 0,
            }
        }

        pub fn to_builder(&self) -> GreetingBuilder {
            GreetingBuilder {
                fields: self.fields.to_builder(),
            }
        }
    }

    impl Message for Greeting {
        fn descriptor_for_type(&self) -> &MessageDescriptor {
            descriptor()
        }

        fn default_instance_for_type(&self) -> Arc<dyn Message> {
            Arc::new(Greeting {
                fields: FieldSetBuilder::new(descriptor().clone()).freeze(),
            })
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

    pub struct GreetingBuilder {
        fields: FieldSetBuilder,
    }

    impl GreetingBuilder {
        pub fn new() -> Self {
            GreetingBuilder {
                fields: FieldSetBuilder::new(descriptor().clone()),
            }
        }

        pub fn set_name(&mut self, name: impl Into<Arc<str>>) -> Result<(), ProtoError> {
            self.fields.set(name_field(), FieldValue::String(name.into()))
        }

        pub fn set_volume(&mut self, volume: i32) -> Result<(), ProtoError> {
            self.fields.set(volume_field(), FieldValue::Int32(volume))
        }
    }

    impl Default for GreetingBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Builder for GreetingBuilder {
        type Built = Greeting;

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
            self.fields.merge_from(other)
        }

        fn merge_unknown_fields(&mut self, other: &UnknownFieldSet) {
            self.fields.merge_unknown_fields(other)
        }

        fn build(self) -> Result<Greeting, ProtoError> {
            if !self.fields.is_initialized() {
                return Err(ProtoError::Uninitialized {
                    missing_fields: self.fields.missing_required_fields(),
                    partial: Arc::new(crate::dynamic::DynamicMessage::from_field_set(self.fields.freeze())),
                });
            }
            Ok(Greeting { fields: self.fields.freeze() })
        }

        fn build_partial(self) -> Greeting {
            Greeting { fields: self.fields.freeze() }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn generated_message_round_trips_through_wire_bytes() {
            let mut builder = GreetingBuilder::new();
            builder.set_name("hello").unwrap();
            builder.set_volume(11).unwrap();
            let greeting = builder.build().unwrap();

            let bytes = greeting.to_bytes();
            let mut input = crate::wire::CodedInput::new(&bytes);
            let mut reparsed_fields = FieldSetBuilder::new(descriptor().clone());
            while let Some(tag) = input.read_tag().unwrap() {
                let (number, _) = crate::wire::split_tag(tag);
                let field = descriptor().find_field_by_number(number as i32).unwrap().clone();
                match field.field_type {
                    FieldType::String => {
                        let s = input.read_string().unwrap();
                        reparsed_fields.set(&field, FieldValue::String(Arc::from(s))).unwrap();
                    }
                    FieldType::Int32 => {
                        let v = input.read_varint32().unwrap() as i32;
                        reparsed_fields.set(&field, FieldValue::Int32(v)).unwrap();
                    }
                    _ => unreachable!(),
                }
            }
            let reparsed = Greeting {
                fields: reparsed_fields.freeze(),
            };
            assert_eq!(reparsed.name(), Some("hello"));
            assert_eq!(reparsed.volume(), 11);
        }

        #[test]
        fn missing_required_name_fails_build() {
            let builder = GreetingBuilder::new();
            assert!(matches!(builder.build(), Err(ProtoError::Uninitialized { .. })));
        }

        #[test]
        fn build_partial_ignores_missing_required_field() {
            let builder = GreetingBuilder::new();
            let partial = builder.build_partial();
            assert!(!partial.is_initialized());
            assert_eq!(partial.name(), None);
        }

        #[test]
        fn merge_from_overwrites_scalar_and_uses_dynamic_unknown_fields() {
            let mut first = GreetingBuilder::new();
            first.set_name("a").unwrap();
            let first = first.build_partial();

            let mut second = GreetingBuilder::new();
            second.set_name("b").unwrap();
            second.set_volume(5).unwrap();
            let second = second.build_partial();

            let mut merged = first.to_builder();
            merged.merge_from(&second).unwrap();
            let merged = merged.build_partial();
            assert_eq!(merged.name(), Some("b"));
            assert_eq!(merged.volume(), 5);
        }
    }
}

pub(crate) fn values_equal(a: &Value<'_>, b: &Value<'_>) -> bool {
    use Value::*;
    match (a, b) {
        (Int32(x), Int32(y)) => x == y,
        (Int64(x), Int64(y)) => x == y,
        (UInt32(x), UInt32(y)) => x == y,
        (UInt64(x), UInt64(y)) => x == y,
        (Float(x), Float(y)) => x == y,
        (Double(x), Double(y)) => x == y,
        (Bool(x), Bool(y)) => x == y,
        (String(x), String(y)) => x == y,
        (Bytes(x), Bytes(y)) => x == y,
        (Enum(x), Enum(y)) => x.number == y.number && x.enum_type_full_name == y.enum_type_full_name,
        (Message(x), Message(y)) => messages_equal(x.as_ref(), y.as_ref()),
        (RepeatedInt32(x), RepeatedInt32(y)) => x == y,
        (RepeatedInt64(x), RepeatedInt64(y)) => x == y,
        (RepeatedUInt32(x), RepeatedUInt32(y)) => x == y,
        (RepeatedUInt64(x), RepeatedUInt64(y)) => x == y,
        (RepeatedFloat(x), RepeatedFloat(y)) => x == y,
        (RepeatedDouble(x), RepeatedDouble(y)) => x == y,
        (RepeatedBool(x), RepeatedBool(y)) => x == y,
        (RepeatedString(x), RepeatedString(y)) => x == y,
        (RepeatedBytes(x), RepeatedBytes(y)) => x == y,
        (RepeatedEnum(x), RepeatedEnum(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|(a, b)| a.number == b.number && a.enum_type_full_name == b.enum_type_full_name)
        }
        (RepeatedMessage(x), RepeatedMessage(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| messages_equal(a.as_ref(), b.as_ref()))
        }
        _ => false,
    }
}
