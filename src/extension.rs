//! Extension field lookup.
//!
//! A `.proto` extension declares a field number against a message type it
//! does not itself define; resolving `(containing_type_full_name,
//! field_number)` to the [`FieldDescriptor`] that describes it requires a
//! registry, since the field lives outside the containing message's own
//! descriptor.

use std::collections::HashMap;

use crate::descriptor::FieldDescriptor;

/// Resolves extension field numbers against the message types they extend.
pub trait ExtensionRegistry {
    fn find_extension(&self, containing_type_full_name: &str, field_number: i32) -> Option<&FieldDescriptor>;
}

/// A registry with no registered extensions — parsing falls back to
/// `UnknownFieldSet` for every extension tag encountered.
#[derive(Debug, Default)]
pub struct EmptyExtensionRegistry;

impl ExtensionRegistry for EmptyExtensionRegistry {
    fn find_extension(&self, _containing_type_full_name: &str, _field_number: i32) -> Option<&FieldDescriptor> {
        None
    }
}

/// A simple in-memory registry, populated by whatever builds the descriptor
/// pool (out of scope here — see the crate-level docs).
#[derive(Debug, Default)]
pub struct MapExtensionRegistry {
    extensions: HashMap<(String, i32), FieldDescriptor>,
}

impl MapExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, field: FieldDescriptor) {
        let key = (field.containing_type_full_name.to_string(), field.number);
        self.extensions.insert(key, field);
    }
}

impl ExtensionRegistry for MapExtensionRegistry {
    fn find_extension(&self, containing_type_full_name: &str, field_number: i32) -> Option<&FieldDescriptor> {
        self.extensions.get(&(containing_type_full_name.to_string(), field_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Cardinality, FieldDescriptorData, FieldType};
    use std::sync::Arc;

    fn make_field(number: i32, containing: &str) -> FieldDescriptor {
        Arc::new(FieldDescriptorData {
            number,
            name: Arc::from("ext"),
            full_name: Arc::from("pkg.ext"),
            field_type: FieldType::Int32,
            cardinality: Cardinality::Singular,
            packed: false,
            required: false,
            is_extension: true,
            containing_type_full_name: Arc::from(containing),
            message_type: None,
            enum_type: None,
            default_value: None,
        })
    }

    #[test]
    fn empty_registry_finds_nothing() {
        let registry = EmptyExtensionRegistry;
        assert!(registry.find_extension("pkg.Foo", 100).is_none());
    }

    #[test]
    fn map_registry_resolves_registered_extension() {
        let mut registry = MapExtensionRegistry::new();
        registry.register(make_field(100, "pkg.Foo"));
        assert!(registry.find_extension("pkg.Foo", 100).is_some());
        assert!(registry.find_extension("pkg.Foo", 101).is_none());
        assert!(registry.find_extension("pkg.Bar", 100).is_none());
    }
}
