//! Field decoration pipeline.
//!
//! Every discovered member runs through a priority-ordered list of
//! decorators, each of which may enrich the field definition being built.
//! Priority ties are broken by insertion order, so registration order is
//! deterministic.

use crate::metadata::MemberMetadata;
use dgql_core::{CompileError, TypeRef};
use dgql_schema::{FieldDefinition, TypeDefinition};

/// Enriches a field definition discovered on a class member.
pub trait FieldDecorator: Send + Sync {
    fn decorate(
        &self,
        member: &MemberMetadata,
        field: &mut FieldDefinition,
        definition: &TypeDefinition,
    ) -> Result<(), CompileError>;
}

struct Entry {
    priority: i32,
    decorator: Box<dyn FieldDecorator>,
}

/// A priority-ordered decorator pipeline.
#[derive(Default)]
pub struct DecoratorPipeline {
    entries: Vec<Entry>,
}

impl DecoratorPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a decorator; higher priority runs first, ties keep insertion
    /// order.
    pub fn add(&mut self, priority: i32, decorator: impl FieldDecorator + 'static) {
        self.entries.push(Entry {
            priority,
            decorator: Box::new(decorator),
        });
        // Stable sort preserves insertion order within a priority.
        self.entries.sort_by_key(|entry| std::cmp::Reverse(entry.priority));
    }

    /// Runs the pipeline over one field.
    pub fn decorate(
        &self,
        member: &MemberMetadata,
        field: &mut FieldDefinition,
        definition: &TypeDefinition,
    ) -> Result<(), CompileError> {
        for entry in &self.entries {
            entry.decorator.decorate(member, field, definition)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for DecoratorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoratorPipeline")
            .field("decorators", &self.entries.len())
            .finish()
    }
}

/// The built-in decorator filling a field from its member's annotation.
#[derive(Debug, Default)]
pub struct MetadataFieldDecorator;

impl FieldDecorator for MetadataFieldDecorator {
    fn decorate(
        &self,
        member: &MemberMetadata,
        field: &mut FieldDefinition,
        _definition: &TypeDefinition,
    ) -> Result<(), CompileError> {
        field.name = member
            .field
            .as_ref()
            .and_then(|meta| meta.name.clone())
            .unwrap_or_else(|| member.property_name());

        let Some(meta) = &member.field else {
            return Ok(());
        };

        if let Some(type_str) = &meta.type_name {
            let ty = TypeRef::parse(type_str);
            field.type_name = ty.name;
            field.non_null = ty.non_null;
            field.list = ty.list;
            field.non_null_list = ty.non_null_list;
        }
        if meta.resolver.is_some() {
            field.resolver = meta.resolver.clone();
        }
        if meta.complexity.is_some() {
            field.complexity = meta.complexity;
        }
        if meta.max_concurrent_usage.is_some() {
            field.max_concurrent_usage = meta.max_concurrent_usage;
        }
        if !meta.roles.is_empty() {
            field.roles = meta.roles.clone();
        }
        if meta.description.is_some() {
            field.description = meta.description.clone();
        }
        if meta.deprecation_reason.is_some() {
            field.deprecation_reason = meta.deprecation_reason.clone();
        }
        for (key, value) in &meta.options {
            field.set_meta(key.clone(), value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FieldMeta;
    use dgql_schema::ObjectDefinition;

    struct TagDecorator(&'static str);

    impl FieldDecorator for TagDecorator {
        fn decorate(
            &self,
            _member: &MemberMetadata,
            field: &mut FieldDefinition,
            _definition: &TypeDefinition,
        ) -> Result<(), CompileError> {
            field.description = Some(match &field.description {
                Some(prev) => format!("{prev},{}", self.0),
                None => self.0.to_string(),
            });
            Ok(())
        }
    }

    #[test]
    fn priority_then_insertion_order() {
        let mut pipeline = DecoratorPipeline::new();
        pipeline.add(0, TagDecorator("low"));
        pipeline.add(10, TagDecorator("first"));
        pipeline.add(10, TagDecorator("second"));

        let definition = TypeDefinition::Object(ObjectDefinition::new("User"));
        let member = MemberMetadata::property("name");
        let mut field = FieldDefinition::default();
        pipeline.decorate(&member, &mut field, &definition).unwrap();
        assert_eq!(field.description.as_deref(), Some("first,second,low"));
    }

    #[test]
    fn metadata_decorator_fills_from_annotation() {
        let definition = TypeDefinition::Object(ObjectDefinition::new("User"));
        let member = MemberMetadata::method("getFriends").with_field(FieldMeta {
            type_name: Some("[User!]".to_string()),
            max_concurrent_usage: Some(1),
            ..FieldMeta::default()
        });
        let mut field = FieldDefinition::default();
        MetadataFieldDecorator
            .decorate(&member, &mut field, &definition)
            .unwrap();
        assert_eq!(field.name, "friends");
        assert_eq!(field.type_name, "User");
        assert!(field.list);
        assert!(field.non_null_list);
        assert!(!field.non_null);
        assert_eq!(field.max_concurrent_usage, Some(1));
    }

    #[test]
    fn bare_property_gets_its_name_only() {
        let definition = TypeDefinition::Object(ObjectDefinition::new("User"));
        let member = MemberMetadata::property("email");
        let mut field = FieldDefinition::default();
        MetadataFieldDecorator
            .decorate(&member, &mut field, &definition)
            .unwrap();
        assert_eq!(field.name, "email");
        assert!(field.type_name.is_empty());
    }
}
