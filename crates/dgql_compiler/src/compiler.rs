//! The definition compiler.
//!
//! Compiles one annotated class into a [`TypeDefinition`] and registers it
//! in the endpoint. Compilation merges the class hierarchy, copies fields
//! down from implemented interfaces (including abstract ancestors treated
//! as pseudo-interfaces), runs the field decoration pipeline, and applies
//! declarative overrides and virtual fields. Compiling a class whose type
//! name is already registered is a no-op, which makes incremental
//! multi-module assembly idempotent.

use crate::decorator::{DecoratorPipeline, FieldDecorator, MetadataFieldDecorator};
use crate::metadata::{
    property_name, ArgumentMeta, ClassMetadata, InterfaceTypeMeta, MemberMetadata, MetadataReader,
    OverrideFieldMeta, VirtualFieldMeta,
};
use dgql_core::{CompileError, TypeRef};
use dgql_schema::{
    ArgumentDefinition, Endpoint, ExclusionPolicy, FieldDefinition, InputObjectDefinition,
    InterfaceDefinition, MemberKind, ObjectDefinition, TypeDefinition, EXPRESSION_RESOLVER,
};
use std::sync::Arc;

/// Compiles annotated classes into endpoint type definitions.
pub struct DefinitionCompiler {
    reader: Arc<dyn MetadataReader>,
    decorators: DecoratorPipeline,
}

impl DefinitionCompiler {
    /// Creates a compiler with the built-in metadata decorator installed.
    pub fn new(reader: Arc<dyn MetadataReader>) -> Self {
        let mut decorators = DecoratorPipeline::new();
        decorators.add(0, MetadataFieldDecorator);
        Self { reader, decorators }
    }

    /// Registers an additional field decorator.
    pub fn with_decorator(
        mut self,
        priority: i32,
        decorator: impl FieldDecorator + 'static,
    ) -> Self {
        self.decorators.add(priority, decorator);
        self
    }

    /// Compiles a class into the endpoint.
    ///
    /// Classes without an object/input annotation are skipped; a type name
    /// already present in the endpoint makes the call a no-op.
    pub fn compile(&self, class_name: &str, endpoint: &mut Endpoint) -> Result<(), CompileError> {
        let meta = self.reader.read(class_name).ok_or_else(|| {
            CompileError::MissingMetadata {
                class: class_name.to_string(),
            }
        })?;
        let Some(object_meta) = &meta.object_type else {
            tracing::debug!(class = class_name, "no object annotation, skipping");
            return Ok(());
        };

        let name = object_meta
            .name
            .clone()
            .unwrap_or_else(|| meta.short_name().to_string());
        if endpoint.has_type(&name) {
            return Ok(());
        }

        let mut definition = if object_meta.input {
            let mut def = InputObjectDefinition::new(name.clone());
            def.description = object_meta.description.clone();
            def.exclusion_policy = object_meta.exclusion_policy;
            def.class_name = Some(meta.class_name.clone());
            def.metadata = object_meta.options.clone();
            TypeDefinition::Input(def)
        } else {
            let mut def = ObjectDefinition::new(name.clone());
            def.description = object_meta.description.clone();
            def.exclusion_policy = object_meta.exclusion_policy;
            def.class_name = Some(meta.class_name.clone());
            def.metadata = object_meta.options.clone();
            TypeDefinition::Object(def)
        };

        if matches!(definition, TypeDefinition::Object(_)) {
            self.resolve_definition_interfaces(meta, &mut definition, endpoint)?;
        }

        // Single merge walk up the class chain, most derived level first.
        let mut levels: Vec<&ClassMetadata> = vec![meta];
        let mut parent = meta.parent.as_deref();
        while let Some(parent_class) = parent {
            match self.reader.read(parent_class) {
                Some(parent_meta) => {
                    levels.push(parent_meta);
                    parent = parent_meta.parent.as_deref();
                }
                None => break,
            }
        }

        for level in &levels {
            self.resolve_fields(level, &mut definition)?;
        }
        Self::apply_overrides(&levels, &mut definition)?;
        Self::apply_virtual_fields(&levels, &mut definition)?;

        tracing::debug!(type_name = %name, class = class_name, "registered type definition");
        endpoint.add_type(definition);
        Ok(())
    }

    /// Resolves implemented interfaces and copies their fields down.
    ///
    /// Interface sources are declared interfaces, abstract ancestors
    /// (pseudo-interfaces), and the class itself when it is a discriminated
    /// interface. Parent interfaces are resolved one level deep to support
    /// interface-of-interface relations.
    fn resolve_definition_interfaces(
        &self,
        meta: &ClassMetadata,
        definition: &mut TypeDefinition,
        endpoint: &mut Endpoint,
    ) -> Result<(), CompileError> {
        let object_name = definition.name().to_string();
        let interface_metas = self.interface_metas(meta, true);

        let mut resolved = Vec::new();
        for (int_meta, annotation) in &interface_metas {
            let interface = self.build_interface(int_meta, annotation)?;
            let int_name = interface.name.clone();

            if let TypeDefinition::Object(object) = &mut *definition {
                if !object.implements.contains(&int_name) {
                    object.implements.push(int_name.clone());
                }
            }

            if !endpoint.has_type(&int_name) {
                endpoint.add_type(TypeDefinition::Interface(interface));
            }
            if let Some(TypeDefinition::Interface(existing)) = endpoint.get_type_mut(&int_name) {
                existing.add_implementor(&object_name);
            }

            let fields = interface_fields(endpoint, &int_name);
            copy_fields_from_interface(&int_name, &fields, definition);
            resolved.push((int_name, int_meta.class_name.clone()));
        }

        // Interface inheritance: resolve each interface's own parents one
        // level and propagate their fields to the child interface and to
        // the implementor.
        for (int_name, int_class) in resolved {
            let Some(int_meta) = self.reader.read(&int_class) else {
                continue;
            };
            for (parent_meta, annotation) in self.interface_metas(int_meta, false) {
                let parent = self.build_interface(parent_meta, annotation)?;
                let parent_name = parent.name.clone();

                if !endpoint.has_type(&parent_name) {
                    endpoint.add_type(TypeDefinition::Interface(parent));
                }
                if let Some(TypeDefinition::Interface(existing)) =
                    endpoint.get_type_mut(&parent_name)
                {
                    existing.add_implementor(&int_name);
                }

                let parent_fields = interface_fields(endpoint, &parent_name);
                if let Some(child) = endpoint.get_type_mut(&int_name) {
                    copy_fields_from_interface(&parent_name, &parent_fields, child);
                    if let TypeDefinition::Interface(child_int) = child {
                        if !child_int.implements.contains(&parent_name) {
                            child_int.implements.push(parent_name.clone());
                        }
                    }
                }
                copy_fields_from_interface(&parent_name, &parent_fields, definition);
            }
        }
        Ok(())
    }

    /// Collects the interface annotations reachable from a class.
    fn interface_metas<'a>(
        &'a self,
        meta: &'a ClassMetadata,
        include_self: bool,
    ) -> Vec<(&'a ClassMetadata, &'a InterfaceTypeMeta)> {
        let mut sources: Vec<&ClassMetadata> = Vec::new();
        for class in &meta.interfaces {
            if let Some(int_meta) = self.reader.read(class) {
                sources.push(int_meta);
            }
        }
        // Abstract ancestors act as pseudo-interfaces.
        let mut parent = meta.parent.as_deref();
        while let Some(parent_class) = parent {
            match self.reader.read(parent_class) {
                Some(parent_meta) => {
                    if parent_meta.is_abstract {
                        sources.push(parent_meta);
                    }
                    parent = parent_meta.parent.as_deref();
                }
                None => break,
            }
        }
        if include_self && meta.interface_type.is_some() {
            sources.push(meta);
        }

        sources
            .into_iter()
            .filter_map(|source| source.interface_type.as_ref().map(|ann| (source, ann)))
            .collect()
    }

    /// Builds an interface definition from its class metadata.
    fn build_interface(
        &self,
        meta: &ClassMetadata,
        annotation: &InterfaceTypeMeta,
    ) -> Result<InterfaceDefinition, CompileError> {
        let name = annotation.name.clone().unwrap_or_else(|| {
            meta.short_name()
                .strip_suffix("Interface")
                .unwrap_or(meta.short_name())
                .to_string()
        });
        let mut interface = InterfaceDefinition::new(name);
        interface.class_name = Some(meta.class_name.clone());
        interface.description = annotation.description.clone();
        interface.exclusion_policy = annotation.exclusion_policy;
        interface.discriminator_property = annotation.discriminator_property.clone();
        interface.discriminator_map = annotation.discriminator_map.clone();
        interface.metadata = annotation.options.clone();

        let mut definition = TypeDefinition::Interface(interface);
        self.resolve_fields(meta, &mut definition)?;
        let levels = [meta];
        Self::apply_overrides(&levels, &mut definition)?;
        Self::apply_virtual_fields(&levels, &mut definition)?;

        match definition {
            TypeDefinition::Interface(interface) => Ok(interface),
            _ => unreachable!("interface definitions keep their variant"),
        }
    }

    /// Discovers fields on one class level and merges them in.
    ///
    /// First registration wins positionally; rediscovering an existing
    /// field only attaches origin and newly declared arguments.
    fn resolve_fields(
        &self,
        meta: &ClassMetadata,
        definition: &mut TypeDefinition,
    ) -> Result<(), CompileError> {
        for member in &meta.members {
            if !is_exposed(definition, member) {
                continue;
            }

            let mut field = FieldDefinition::default();
            self.decorators.decorate(member, &mut field, definition)?;

            if let Some(existing) = definition.field_mut(&field.name) {
                if existing.origin_name.is_none() {
                    existing.origin_name = Some(member.name.clone());
                    existing.origin_kind = Some(member.kind);
                }
                for argument in &member.arguments {
                    if !existing.has_argument(&argument.name) {
                        existing.add_argument(to_argument(argument));
                    }
                }
            } else {
                field.origin_name = Some(member.name.clone());
                field.origin_kind = Some(member.kind);
                for argument in &member.arguments {
                    field.add_argument(to_argument(argument));
                }
                definition.add_field(field);
            }
        }
        Ok(())
    }

    /// Applies declarative overrides from every class level.
    fn apply_overrides(
        levels: &[&ClassMetadata],
        definition: &mut TypeDefinition,
    ) -> Result<(), CompileError> {
        for level in levels {
            for o in &level.overrides {
                if !in_scope(&o.in_definitions, &o.not_in_definitions, definition.name()) {
                    continue;
                }
                Self::apply_override(o, definition)?;
            }
        }
        Ok(())
    }

    fn apply_override(
        o: &OverrideFieldMeta,
        definition: &mut TypeDefinition,
    ) -> Result<(), CompileError> {
        if !definition.has_field(&o.name) {
            return Err(CompileError::OverrideTargetMissing {
                definition: definition.name().to_string(),
                field: o.name.clone(),
            });
        }
        if o.hidden {
            definition.remove_field(&o.name);
            return Ok(());
        }

        if let Some(field) = definition.field_mut(&o.name) {
            if let Some(type_str) = &o.type_name {
                let ty = TypeRef::parse(type_str);
                field.type_name = ty.name;
                field.non_null = ty.non_null;
                field.list = ty.list;
                field.non_null_list = ty.non_null_list;
            }
            if let Some(description) = &o.description {
                field.description = Some(description.clone());
            }
            if let Some(deprecation) = &o.deprecation_reason {
                field.deprecation_reason = deprecation.clone();
            }
            if let Some(complexity) = o.complexity {
                field.complexity = Some(complexity);
            }
            if !o.roles.is_empty() {
                field.roles = o.roles.clone();
            }
        }

        // Renames re-key the field map.
        if let Some(alias) = &o.alias {
            if let Some(mut field) = definition.remove_field(&o.name) {
                field.name = alias.clone();
                definition.add_field(field);
            }
        }
        Ok(())
    }

    /// Injects expression-backed virtual fields from every class level.
    fn apply_virtual_fields(
        levels: &[&ClassMetadata],
        definition: &mut TypeDefinition,
    ) -> Result<(), CompileError> {
        for level in levels {
            for v in &level.virtual_fields {
                if !in_scope(&v.in_definitions, &v.not_in_definitions, definition.name()) {
                    continue;
                }
                Self::inject_virtual_field(v, definition)?;
            }
        }
        Ok(())
    }

    fn inject_virtual_field(
        v: &VirtualFieldMeta,
        definition: &mut TypeDefinition,
    ) -> Result<(), CompileError> {
        if let Some(existing) = definition.field(&v.name) {
            // Re-injecting an expression-backed field is a no-op; colliding
            // with a concrete field is an authoring mistake.
            if existing.is_expression() {
                return Ok(());
            }
            return Err(CompileError::VirtualFieldCollision {
                definition: definition.name().to_string(),
                field: v.name.clone(),
            });
        }

        let ty = TypeRef::parse(&v.type_name);
        let mut field = FieldDefinition::new(v.name.clone(), ty.name);
        field.non_null = ty.non_null;
        field.list = ty.list;
        field.non_null_list = ty.non_null_list;
        field.description = v.description.clone();
        field.deprecation_reason = v.deprecation_reason.clone();
        field.complexity = v.complexity;
        field.roles = v.roles.clone();
        field.resolver = Some(EXPRESSION_RESOLVER.to_string());
        field.set_meta("expression", serde_json::Value::String(v.expression.clone()));
        definition.add_field(field);
        Ok(())
    }
}

impl std::fmt::Debug for DefinitionCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionCompiler")
            .field("decorators", &self.decorators)
            .finish()
    }
}

/// Snapshot of an interface's fields, cloned out of the registry.
fn interface_fields(endpoint: &Endpoint, name: &str) -> Vec<FieldDefinition> {
    endpoint
        .get_type(name)
        .map(|def| def.fields().values().cloned().collect())
        .unwrap_or_default()
}

/// Copies interface fields onto an implementor.
///
/// An already-present field only gains the interface in its provenance
/// set; otherwise the field is cloned (an independent copy, never a shared
/// reference) and the provenance recorded on the copy.
fn copy_fields_from_interface(
    interface: &str,
    fields: &[FieldDefinition],
    target: &mut TypeDefinition,
) {
    for field in fields {
        if let Some(existing) = target.field_mut(&field.name) {
            existing.add_inherited_from(interface);
        } else {
            let mut copy = field.clone();
            copy.add_inherited_from(interface);
            target.add_field(copy);
        }
    }
}

/// Decides whether a member is exposed on a definition.
fn is_exposed(definition: &TypeDefinition, member: &MemberMetadata) -> bool {
    let mut exposed = definition.exclusion_policy() == ExclusionPolicy::ExcludeNothing;

    // Methods are opt-in.
    if member.kind == MemberKind::Method {
        exposed = member.field.is_some();
    }

    if exposed && member.exclude {
        exposed = false;
    } else if !exposed && member.expose {
        exposed = true;
    }

    if let Some(field) = &member.field {
        exposed = true;
        if !field.in_definitions.is_empty() {
            exposed = field.in_definitions.iter().any(|d| d == definition.name());
        } else if !field.not_in_definitions.is_empty() {
            exposed = !field
                .not_in_definitions
                .iter()
                .any(|d| d == definition.name());
        }
    }

    if !exposed {
        // Members backing an interface-inherited field are always exposed.
        let member_name = member.property_name();
        exposed = definition.fields().values().any(|f| {
            !f.inherited_from.is_empty()
                && f.origin_name.as_deref().is_some_and(|origin| {
                    property_name(origin) == member.name || property_name(origin) == member_name
                })
        });
    }

    exposed
}

fn in_scope(in_definitions: &[String], not_in: &[String], name: &str) -> bool {
    if !in_definitions.is_empty() {
        return in_definitions.iter().any(|d| d == name);
    }
    if !not_in.is_empty() {
        return !not_in.iter().any(|d| d == name);
    }
    true
}

fn to_argument(meta: &ArgumentMeta) -> ArgumentDefinition {
    let ty = TypeRef::parse(&meta.type_name);
    let mut argument = ArgumentDefinition::new(meta.name.clone(), ty.name);
    argument.non_null = ty.non_null;
    argument.list = ty.list;
    argument.non_null_list = ty.non_null_list;
    argument.internal_name = meta.internal_name.clone();
    argument.description = meta.description.clone();
    argument.default_value = meta.default_value.clone();
    argument
}
