//! The per-schema type and operation registry.
//!
//! An [`Endpoint`] is a named schema namespace holding every compiled type
//! plus the top-level query and mutation definitions. It is populated during
//! the warm-up compile pass and read-only afterwards, so it can be shared
//! unlocked across concurrent request executions.

use crate::definition::{InterfaceDefinition, OperationDefinition, OperationKind, TypeDefinition};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value;

/// A named schema registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Endpoint {
    name: String,
    types: IndexMap<String, TypeDefinition>,
    queries: IndexMap<String, OperationDefinition>,
    mutations: IndexMap<String, OperationDefinition>,
    /// Bound class name -> type name.
    class_index: FxHashMap<String, String>,
}

impl Endpoint {
    /// Creates a new empty endpoint.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a type definition, indexing its bound class.
    pub fn add_type(&mut self, definition: TypeDefinition) {
        if let Some(class) = definition.class_name() {
            self.class_index
                .insert(class.to_string(), definition.name().to_string());
        }
        self.types
            .insert(definition.name().to_string(), definition);
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    pub fn get_type_mut(&mut self, name: &str) -> Option<&mut TypeDefinition> {
        self.types.get_mut(name)
    }

    /// Removes a type definition.
    pub fn remove_type(&mut self, name: &str) -> Option<TypeDefinition> {
        if let Some(def) = self.types.shift_remove(name) {
            if let Some(class) = def.class_name() {
                self.class_index.remove(class);
            }
            Some(def)
        } else {
            None
        }
    }

    /// All registered types, in registration order.
    pub fn types(&self) -> impl Iterator<Item = (&String, &TypeDefinition)> {
        self.types.iter()
    }

    pub fn has_type_for_class(&self, class: &str) -> bool {
        self.class_index.contains_key(class)
    }

    /// The type name bound to a class, if registered.
    pub fn type_for_class(&self, class: &str) -> Option<&str> {
        self.class_index.get(class).map(String::as_str)
    }

    /// Registers a top-level operation under its kind.
    pub fn add_operation(&mut self, operation: OperationDefinition) {
        let map = match operation.kind {
            OperationKind::Query => &mut self.queries,
            OperationKind::Mutation => &mut self.mutations,
        };
        map.insert(operation.name.clone(), operation);
    }

    pub fn query(&self, name: &str) -> Option<&OperationDefinition> {
        self.queries.get(name)
    }

    pub fn mutation(&self, name: &str) -> Option<&OperationDefinition> {
        self.mutations.get(name)
    }

    pub fn queries(&self) -> &IndexMap<String, OperationDefinition> {
        &self.queries
    }

    pub fn mutations(&self) -> &IndexMap<String, OperationDefinition> {
        &self.mutations
    }

    /// Replaces the query map. Used by the namespacing pass.
    pub fn set_queries(&mut self, queries: IndexMap<String, OperationDefinition>) {
        self.queries = queries;
    }

    /// Replaces the mutation map. Used by the namespacing pass.
    pub fn set_mutations(&mut self, mutations: IndexMap<String, OperationDefinition>) {
        self.mutations = mutations;
    }

    /// Resolves the concrete type name for a runtime value.
    ///
    /// Values carrying a `__typename` matching a registered type win.
    /// Otherwise each registered interface with a discriminator property is
    /// consulted: if the value exposes that property and its value appears
    /// in the discriminator map, the mapped type name is returned.
    pub fn concrete_type_for(&self, value: &Value) -> Option<&str> {
        let object = value.as_object()?;

        if let Some(typename) = object.get("__typename").and_then(Value::as_str) {
            if let Some(def) = self.types.get(typename) {
                return Some(def.name());
            }
        }

        for def in self.types.values() {
            let Some(interface) = def.as_interface() else {
                continue;
            };
            if let Some(concrete) = Self::dispatch_discriminator(interface, object) {
                return Some(concrete);
            }
        }
        None
    }

    fn dispatch_discriminator<'a>(
        interface: &'a InterfaceDefinition,
        object: &serde_json::Map<String, Value>,
    ) -> Option<&'a str> {
        let property = interface.discriminator_property.as_deref()?;
        let discriminator = object.get(property)?.as_str()?;
        interface
            .discriminator_map
            .get(discriminator)
            .map(String::as_str)
    }
}
