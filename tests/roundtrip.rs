//! Cross-module integration tests for the concrete scenarios and universal
//! properties enumerated in the core specification's testable-properties
//! section: scalar round-trips, packed/unpacked tolerance, message-set
//! extensions, unknown-field survival, required-field enforcement, and
//! dynamic/generated byte-for-byte parity.

use std::sync::Arc;

use protoflex_core::descriptor::FieldType;
use protoflex_core::dynamic::{DynamicBuilder, DynamicMessage};
use protoflex_core::error::ProtoError;
use protoflex_core::extension::MapExtensionRegistry;
use protoflex_core::message::{examples::GreetingBuilder, Builder, Message};
use protoflex_core::test_utils::{assert_roundtrip, message_descriptor, message_set_descriptor, repeated_field, scalar_field};
use protoflex_core::value::{FieldValue, Value};
use protoflex_core::wire::{CodedOutput, WireType};

#[test]
fn round_trip_of_all_scalars() {
    let _ = env_logger::try_init();

    let descriptor = message_descriptor(
        "test.AllScalars",
        vec![
            scalar_field(1, "i32", FieldType::Int32, false),
            scalar_field(2, "s64", FieldType::SInt64, false),
            scalar_field(3, "s", FieldType::String, false),
            scalar_field(4, "b", FieldType::Bytes, false),
            scalar_field(5, "flag", FieldType::Bool, false),
            scalar_field(6, "d", FieldType::Double, false),
        ],
    );
    let i32_f = descriptor.fields[0].clone();
    let s64_f = descriptor.fields[1].clone();
    let s_f = descriptor.fields[2].clone();
    let b_f = descriptor.fields[3].clone();
    let flag_f = descriptor.fields[4].clone();
    let d_f = descriptor.fields[5].clone();

    let mut builder = DynamicBuilder::new(descriptor.clone());
    builder.set_field(&i32_f, FieldValue::Int32(42)).unwrap();
    builder.set_field(&s64_f, FieldValue::Int64(-1)).unwrap();
    builder.set_field(&s_f, FieldValue::String(Arc::from("hi"))).unwrap();
    builder.set_field(&b_f, FieldValue::Bytes(Arc::from(&[0x01u8, 0xff][..]))).unwrap();
    builder.set_field(&flag_f, FieldValue::Bool(true)).unwrap();
    builder.set_field(&d_f, FieldValue::Double(3.5)).unwrap();
    let message = builder.build().unwrap();

    let mut expected = CodedOutput::new();
    expected.write_tag(1, WireType::Varint);
    expected.write_varint64(42);
    expected.write_tag(2, WireType::Varint);
    expected.write_sint64(-1);
    expected.write_tag(3, WireType::LengthDelimited);
    expected.write_string_field("hi");
    expected.write_tag(4, WireType::LengthDelimited);
    expected.write_bytes_field(&[0x01, 0xff]);
    expected.write_tag(5, WireType::Varint);
    expected.write_bool(true);
    expected.write_tag(6, WireType::Fixed64);
    expected.write_double(3.5);
    let expected_bytes = expected.into_vec();

    assert_eq!(message.to_bytes(), expected_bytes);
    assert_roundtrip(&message);
}

#[test]
fn repeated_packed_int32_parses_either_encoding() {
    let packed_descriptor = message_descriptor("test.Packed", vec![repeated_field(5, "values", FieldType::Int32, true)]);
    let unpacked_descriptor = message_descriptor("test.Unpacked", vec![repeated_field(5, "values", FieldType::Int32, false)]);
    let packed_field = packed_descriptor.fields[0].clone();
    let unpacked_field = unpacked_descriptor.fields[0].clone();

    let mut builder = DynamicBuilder::new(packed_descriptor.clone());
    for v in [1, 2, 150] {
        builder.add_repeated_field(&packed_field, FieldValue::Int32(v)).unwrap();
    }
    let message = builder.build().unwrap();
    let bytes = message.to_bytes();

    let mut expected = CodedOutput::new();
    expected.write_tag(5, WireType::LengthDelimited);
    expected.write_varint32(4);
    expected.write_raw_bytes(&[0x01, 0x02, 0x96, 0x01]);
    assert_eq!(bytes, expected.into_vec());

    // The same bytes parse against a descriptor that declares the field
    // unpacked — the wire format tolerates either shape regardless of how
    // the receiving descriptor declares `packed`.
    let reparsed_as_unpacked = DynamicMessage::parse_from_bytes(&bytes, unpacked_descriptor).unwrap();
    assert_eq!(reparsed_as_unpacked.get_repeated_count(&unpacked_field).unwrap(), 3);
    let Some(Value::RepeatedInt32(values)) = reparsed_as_unpacked.get(&unpacked_field) else {
        panic!("expected a repeated int32 value");
    };
    assert_eq!(values, &[1, 2, 150]);

    // And a hand-encoded unpacked stream parses against the packed descriptor.
    let mut unpacked_bytes = CodedOutput::new();
    for v in [1i64, 2, 150] {
        unpacked_bytes.write_tag(5, WireType::Varint);
        unpacked_bytes.write_varint64(v as u64);
    }
    let reparsed_as_packed = DynamicMessage::parse_from_bytes(&unpacked_bytes.into_vec(), packed_descriptor).unwrap();
    assert_eq!(reparsed_as_packed.get_repeated_count(&packed_field).unwrap(), 3);
}

#[test]
fn message_set_extension_round_trip() {
    let payload_descriptor = message_descriptor("test.Payload", vec![scalar_field(1, "i", FieldType::Int32, false)]);
    let i_field = payload_descriptor.fields[0].clone();

    let ext_field = protoflex_core::test_utils::message_field(4, "payload_ext", false, payload_descriptor.clone());
    // message_field defaults `is_extension` to false via FieldDescriptorData's
    // builder helper shape, so construct the extension descriptor directly
    // to mark it as an extension of the message-set type.
    let ext_field = Arc::new(protoflex_core::descriptor::FieldDescriptorData {
        is_extension: true,
        containing_type_full_name: Arc::from("test.MessageSet"),
        ..(*ext_field).clone()
    });

    let mut registry = MapExtensionRegistry::new();
    registry.register(ext_field.clone());

    let mut payload_builder = DynamicBuilder::new(payload_descriptor);
    payload_builder.set_field(&i_field, FieldValue::Int32(123)).unwrap();
    let payload = payload_builder.build().unwrap();

    let message_set_descriptor = message_set_descriptor("test.MessageSet");
    let mut out = CodedOutput::new();
    out.write_message_set_extension(4, &payload.to_bytes());
    let bytes = out.into_vec();

    let parsed = DynamicMessage::parse_from(&bytes, message_set_descriptor, &registry).unwrap();
    let Some(Value::Message(parsed_payload)) = parsed.get(&ext_field) else {
        panic!("expected the message-set extension to resolve");
    };
    assert!(matches!(parsed_payload.get_field(&i_field), Some(Value::Int32(123))));
    assert_eq!(parsed.to_bytes(), bytes);
}

#[test]
fn unknown_field_survives_round_trip() {
    let descriptor = message_descriptor("test.Empty", vec![]);
    let mut out = CodedOutput::new();
    out.write_tag(999, WireType::Varint);
    out.write_varint64(17);
    let bytes = out.into_vec();

    let parsed = DynamicMessage::parse_from_bytes(&bytes, descriptor).unwrap();
    assert_eq!(parsed.unknown_fields().field(999).unwrap().varints, vec![17]);
    assert_eq!(parsed.to_bytes(), bytes);
}

#[test]
fn required_field_enforcement_through_a_full_cycle() {
    let descriptor = message_descriptor("test.Required", vec![scalar_field(1, "id", FieldType::Int32, true)]);
    let builder = DynamicBuilder::new(descriptor.clone());

    match builder.build() {
        Err(ProtoError::Uninitialized { missing_fields, .. }) => assert_eq!(missing_fields, vec!["id".to_string()]),
        other => panic!("expected Uninitialized, got {other:?}"),
    }

    let builder = DynamicBuilder::new(descriptor.clone());
    let partial = builder.build_partial();
    let bytes = partial.to_bytes();
    assert!(bytes.is_empty());

    let err = DynamicMessage::parse_from_bytes(&bytes, descriptor).unwrap_err();
    match err {
        ProtoError::InvalidProtocolBuffer(inner) => assert!(matches!(*inner, ProtoError::Uninitialized { .. })),
        other => panic!("expected InvalidProtocolBuffer, got {other:?}"),
    }
}

#[test]
fn dynamic_and_generated_messages_serialize_identically() {
    let mut generated = GreetingBuilder::new();
    generated.set_name("hello").unwrap();
    generated.set_volume(7).unwrap();
    let generated = generated.build().unwrap();

    let descriptor = generated.descriptor_for_type().clone();
    let name_field = descriptor.find_field_by_name("name").unwrap().clone();
    let volume_field = descriptor.find_field_by_name("volume").unwrap().clone();

    let mut dynamic_builder = DynamicBuilder::new(descriptor);
    dynamic_builder.set_field(&name_field, FieldValue::String(Arc::from("hello"))).unwrap();
    dynamic_builder.set_field(&volume_field, FieldValue::Int32(7)).unwrap();
    let dynamic = dynamic_builder.build().unwrap();

    assert_eq!(generated.to_bytes(), dynamic.to_bytes());
}

#[test]
fn merge_concatenates_repeated_and_overwrites_singular_scalars() {
    let descriptor = message_descriptor(
        "test.Merge",
        vec![scalar_field(1, "name", FieldType::String, false), repeated_field(2, "tags", FieldType::Int32, true)],
    );
    let name_field = descriptor.fields[0].clone();
    let tags_field = descriptor.fields[1].clone();

    let mut a = DynamicBuilder::new(descriptor.clone());
    a.set_field(&name_field, FieldValue::String(Arc::from("a"))).unwrap();
    a.add_repeated_field(&tags_field, FieldValue::Int32(1)).unwrap();
    let a = a.build_partial();

    let mut b = DynamicBuilder::new(descriptor);
    b.set_field(&name_field, FieldValue::String(Arc::from("b"))).unwrap();
    b.add_repeated_field(&tags_field, FieldValue::Int32(2)).unwrap();
    let b = b.build_partial();

    let mut merged = a.to_builder();
    merged.merge_from(&b).unwrap();
    let merged = merged.build_partial();

    assert!(matches!(merged.get(&name_field), Some(Value::String("b"))));
    assert_eq!(merged.get_repeated_count(&tags_field).unwrap(), 2);
}
