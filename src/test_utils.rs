//! Hand-built descriptor fixtures for this crate's own tests and for
//! downstream integration tests — available outside `#[cfg(test)]` since
//! nothing in this crate builds descriptors from `.proto` source for you.

use std::sync::Arc;

use crate::descriptor::{
    Cardinality, EnumDescriptor, EnumDescriptorData, EnumValueDescriptor, EnumValueDescriptorData, ExtensionRange, FieldDescriptor, FieldDescriptorData,
    FieldType, MessageDescriptor, MessageDescriptorData, MessageOptions,
};
use crate::dynamic::DynamicMessage;
use crate::message::{messages_equal, Message};

pub fn scalar_field(number: i32, name: &str, field_type: FieldType, required: bool) -> FieldDescriptor {
    Arc::new(FieldDescriptorData {
        number,
        name: Arc::from(name),
        full_name: Arc::from(format!("test.{name}")),
        field_type,
        cardinality: Cardinality::Singular,
        packed: false,
        required,
        is_extension: false,
        containing_type_full_name: Arc::from("test"),
        message_type: None,
        enum_type: None,
        default_value: None,
    })
}

pub fn repeated_field(number: i32, name: &str, field_type: FieldType, packed: bool) -> FieldDescriptor {
    Arc::new(FieldDescriptorData {
        number,
        name: Arc::from(name),
        full_name: Arc::from(format!("test.{name}")),
        field_type,
        cardinality: Cardinality::Repeated,
        packed,
        required: false,
        is_extension: false,
        containing_type_full_name: Arc::from("test"),
        message_type: None,
        enum_type: None,
        default_value: None,
    })
}

pub fn message_field(number: i32, name: &str, repeated: bool, message_type: MessageDescriptor) -> FieldDescriptor {
    Arc::new(FieldDescriptorData {
        number,
        name: Arc::from(name),
        full_name: Arc::from(format!("test.{name}")),
        field_type: FieldType::Message,
        cardinality: if repeated { Cardinality::Repeated } else { Cardinality::Singular },
        packed: false,
        required: false,
        is_extension: false,
        containing_type_full_name: Arc::from("test"),
        message_type: Some(message_type),
        enum_type: None,
        default_value: None,
    })
}

pub fn enum_field(number: i32, name: &str, repeated: bool, enum_type: EnumDescriptor) -> FieldDescriptor {
    Arc::new(FieldDescriptorData {
        number,
        name: Arc::from(name),
        full_name: Arc::from(format!("test.{name}")),
        field_type: FieldType::Enum,
        cardinality: if repeated { Cardinality::Repeated } else { Cardinality::Singular },
        packed: false,
        required: false,
        is_extension: false,
        containing_type_full_name: Arc::from("test"),
        message_type: None,
        enum_type: Some(enum_type),
        default_value: None,
    })
}

pub fn message_descriptor(full_name: &str, fields: Vec<FieldDescriptor>) -> MessageDescriptor {
    Arc::new(MessageDescriptorData {
        full_name: Arc::from(full_name),
        fields,
        extension_ranges: vec![],
        options: MessageOptions::default(),
    })
}

pub fn extendable_message_descriptor(full_name: &str, fields: Vec<FieldDescriptor>, extension_ranges: Vec<ExtensionRange>) -> MessageDescriptor {
    Arc::new(MessageDescriptorData {
        full_name: Arc::from(full_name),
        fields,
        extension_ranges,
        options: MessageOptions::default(),
    })
}

pub fn message_set_descriptor(full_name: &str) -> MessageDescriptor {
    Arc::new(MessageDescriptorData {
        full_name: Arc::from(full_name),
        fields: vec![],
        extension_ranges: vec![ExtensionRange { start: 1, end: i32::MAX }],
        options: MessageOptions { message_set_wire_format: true },
    })
}

pub fn enum_descriptor(full_name: &str, values: &[(&str, i32)]) -> EnumDescriptor {
    Arc::new(EnumDescriptorData {
        full_name: Arc::from(full_name),
        values: values
            .iter()
            .map(|&(name, number)| -> EnumValueDescriptor {
                Arc::new(EnumValueDescriptorData {
                    name: Arc::from(name),
                    number,
                    enum_type_full_name: Arc::from(full_name),
                })
            })
            .collect(),
    })
}

/// Encodes `message`, reparses the bytes as a [`DynamicMessage`] against
/// its own descriptor, and asserts the two are structurally equal and that
/// the encoding is stable (reparsed bytes match the original). Mirrors the
/// teacher's own `assert_roundtrip` helper, adapted to a reflective message
/// with no generated encode/decode tables to compare against.
pub fn assert_roundtrip(message: &dyn Message) {
    let bytes = message.to_bytes();
    assert_eq!(bytes.len(), message.serialized_size(), "serialized_size disagreed with the bytes actually written");

    let reparsed = DynamicMessage::parse_from_bytes(&bytes, message.descriptor_for_type().clone()).expect("round-tripped bytes must reparse");
    assert!(messages_equal(message, &reparsed), "reparsed message differs from the original");
    assert_eq!(reparsed.to_bytes(), bytes, "re-encoding the reparsed message changed the bytes");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_set::FieldSetBuilder;
    use crate::value::FieldValue;

    #[test]
    fn assert_roundtrip_passes_for_a_simple_message() {
        let descriptor = message_descriptor("test.Simple", vec![scalar_field(1, "a", FieldType::Int32, false)]);
        let field = descriptor.fields[0].clone();
        let mut builder = FieldSetBuilder::new(descriptor.clone());
        builder.set(&field, FieldValue::Int32(7)).unwrap();
        let message = DynamicMessage::from_field_set(builder.freeze());
        assert_roundtrip(&message);
    }
}
