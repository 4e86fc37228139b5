//! Definition records for compiled schema types.
//!
//! These are built once during schema warm-up by the definition compiler and
//! are immutable after publication to the [`Endpoint`](crate::Endpoint)
//! registry. Field maps are insertion-ordered.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resolver name reserved for expression-backed virtual fields.
pub const EXPRESSION_RESOLVER: &str = "expression";

/// Exposure policy for a definition's members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExclusionPolicy {
    /// Members are exposed unless explicitly excluded.
    #[default]
    ExcludeNothing,
    /// Members are hidden unless explicitly exposed.
    ExcludeAll,
}

/// Kind of the class member a field originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberKind {
    Property,
    Method,
}

/// An argument declared by a field or operation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArgumentDefinition {
    pub name: String,
    /// Name the resolver knows the argument by; defaults to `name`.
    pub internal_name: Option<String>,
    pub type_name: String,
    pub non_null: bool,
    pub list: bool,
    pub non_null_list: bool,
    pub default_value: Option<Value>,
    pub description: Option<String>,
}

impl ArgumentDefinition {
    /// Creates a new argument definition.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    /// The name the resolver receives the argument under.
    pub fn internal_name(&self) -> &str {
        self.internal_name.as_deref().unwrap_or(&self.name)
    }
}

/// A single schema field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub type_name: String,
    pub non_null: bool,
    pub list: bool,
    pub non_null_list: bool,
    /// Name of the resolver in the resolver registry, if any.
    pub resolver: Option<String>,
    /// Name of the class member this field was discovered on.
    pub origin_name: Option<String>,
    pub origin_kind: Option<MemberKind>,
    pub arguments: IndexMap<String, ArgumentDefinition>,
    pub roles: Vec<String>,
    pub complexity: Option<u32>,
    pub max_concurrent_usage: Option<u32>,
    pub description: Option<String>,
    pub deprecation_reason: Option<String>,
    /// Names of the interfaces that contributed this field.
    pub inherited_from: Vec<String>,
    pub metadata: IndexMap<String, Value>,
}

impl FieldDefinition {
    /// Creates a new field definition.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    /// Records an interface as a provenance source, once.
    pub fn add_inherited_from(&mut self, interface: impl Into<String>) {
        let interface = interface.into();
        if !self.inherited_from.contains(&interface) {
            self.inherited_from.push(interface);
        }
    }

    /// Adds an argument, keyed by its public name.
    pub fn add_argument(&mut self, argument: ArgumentDefinition) {
        self.arguments.insert(argument.name.clone(), argument);
    }

    pub fn has_argument(&self, name: &str) -> bool {
        self.arguments.contains_key(name)
    }

    pub fn argument(&self, name: &str) -> Option<&ArgumentDefinition> {
        self.arguments.get(name)
    }

    /// Reads a metadata entry.
    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Sets a metadata entry.
    pub fn set_meta(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// True when this field is backed by an expression resolver.
    pub fn is_expression(&self) -> bool {
        self.resolver.as_deref() == Some(EXPRESSION_RESOLVER)
    }
}

/// An object type definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectDefinition {
    pub name: String,
    pub description: Option<String>,
    pub exclusion_policy: ExclusionPolicy,
    /// Name of the bound domain class.
    pub class_name: Option<String>,
    pub fields: IndexMap<String, FieldDefinition>,
    /// Names of implemented interfaces, resolved against the registry.
    pub implements: Vec<String>,
    pub metadata: IndexMap<String, Value>,
}

impl ObjectDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// An input object type definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InputObjectDefinition {
    pub name: String,
    pub description: Option<String>,
    pub exclusion_policy: ExclusionPolicy,
    pub class_name: Option<String>,
    pub fields: IndexMap<String, FieldDefinition>,
    pub metadata: IndexMap<String, Value>,
}

impl InputObjectDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// An interface type definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InterfaceDefinition {
    pub name: String,
    pub description: Option<String>,
    pub exclusion_policy: ExclusionPolicy,
    pub class_name: Option<String>,
    pub fields: IndexMap<String, FieldDefinition>,
    /// Parent interfaces (interface-of-interface, one level).
    pub implements: Vec<String>,
    /// Names of object types implementing this interface.
    pub implementors: Vec<String>,
    /// Root value property used for concrete type dispatch.
    pub discriminator_property: Option<String>,
    /// Discriminator value -> concrete type name.
    pub discriminator_map: IndexMap<String, String>,
    pub metadata: IndexMap<String, Value>,
}

impl InterfaceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Records an implementor, once.
    pub fn add_implementor(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.implementors.contains(&name) {
            self.implementors.push(name);
        }
    }
}

/// A compiled type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeDefinition {
    Object(ObjectDefinition),
    Input(InputObjectDefinition),
    Interface(InterfaceDefinition),
}

impl TypeDefinition {
    pub fn name(&self) -> &str {
        match self {
            Self::Object(def) => &def.name,
            Self::Input(def) => &def.name,
            Self::Interface(def) => &def.name,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Object(def) => def.description.as_deref(),
            Self::Input(def) => def.description.as_deref(),
            Self::Interface(def) => def.description.as_deref(),
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            Self::Object(def) => def.class_name.as_deref(),
            Self::Input(def) => def.class_name.as_deref(),
            Self::Interface(def) => def.class_name.as_deref(),
        }
    }

    pub fn exclusion_policy(&self) -> ExclusionPolicy {
        match self {
            Self::Object(def) => def.exclusion_policy,
            Self::Input(def) => def.exclusion_policy,
            Self::Interface(def) => def.exclusion_policy,
        }
    }

    pub fn fields(&self) -> &IndexMap<String, FieldDefinition> {
        match self {
            Self::Object(def) => &def.fields,
            Self::Input(def) => &def.fields,
            Self::Interface(def) => &def.fields,
        }
    }

    pub fn fields_mut(&mut self) -> &mut IndexMap<String, FieldDefinition> {
        match self {
            Self::Object(def) => &mut def.fields,
            Self::Input(def) => &mut def.fields,
            Self::Interface(def) => &mut def.fields,
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields().contains_key(name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields().get(name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldDefinition> {
        self.fields_mut().get_mut(name)
    }

    /// Adds a field, keyed by its name.
    pub fn add_field(&mut self, field: FieldDefinition) {
        self.fields_mut().insert(field.name.clone(), field);
    }

    /// Removes a field by name.
    pub fn remove_field(&mut self, name: &str) -> Option<FieldDefinition> {
        self.fields_mut().shift_remove(name)
    }

    pub fn as_object(&self) -> Option<&ObjectDefinition> {
        match self {
            Self::Object(def) => Some(def),
            _ => None,
        }
    }

    pub fn as_input(&self) -> Option<&InputObjectDefinition> {
        match self {
            Self::Input(def) => Some(def),
            _ => None,
        }
    }

    pub fn as_interface(&self) -> Option<&InterfaceDefinition> {
        match self {
            Self::Interface(def) => Some(def),
            _ => None,
        }
    }
}

/// Whether an operation is a query or a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Query,
    Mutation,
}

/// A top-level query or mutation definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDefinition {
    pub name: String,
    pub kind: OperationKind,
    /// Name of the returned type.
    pub type_name: String,
    pub list: bool,
    /// The node type this operation is about, when any.
    pub node: Option<String>,
    pub resolver: Option<String>,
    pub arguments: IndexMap<String, ArgumentDefinition>,
    pub roles: Vec<String>,
    pub complexity: Option<u32>,
    pub description: Option<String>,
    pub deprecation_reason: Option<String>,
    pub metadata: IndexMap<String, Value>,
}

impl OperationDefinition {
    /// Creates a new operation definition.
    pub fn new(name: impl Into<String>, kind: OperationKind, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            type_name: type_name.into(),
            list: false,
            node: None,
            resolver: None,
            arguments: IndexMap::new(),
            roles: Vec::new(),
            complexity: None,
            description: None,
            deprecation_reason: None,
            metadata: IndexMap::new(),
        }
    }

    /// Adds an argument, keyed by its public name.
    pub fn add_argument(&mut self, argument: ArgumentDefinition) {
        self.arguments.insert(argument.name.clone(), argument);
    }

    pub fn argument(&self, name: &str) -> Option<&ArgumentDefinition> {
        self.arguments.get(name)
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provenance_is_a_set() {
        let mut field = FieldDefinition::new("id", "ID");
        field.add_inherited_from("Node");
        field.add_inherited_from("Node");
        field.add_inherited_from("Timestamped");
        assert_eq!(field.inherited_from, vec!["Node", "Timestamped"]);
    }

    #[test]
    fn cloned_fields_are_independent() {
        let mut original = FieldDefinition::new("name", "String");
        let mut copy = original.clone();
        copy.add_inherited_from("Named");
        copy.type_name = "String!".to_string();
        assert!(original.inherited_from.is_empty());
        assert_eq!(original.type_name, "String");
        original.description = Some("the name".to_string());
        assert!(copy.description.is_none());
    }

    #[test]
    fn remove_field_preserves_order_of_rest() {
        let mut def = TypeDefinition::Object(ObjectDefinition::new("User"));
        def.add_field(FieldDefinition::new("a", "String"));
        def.add_field(FieldDefinition::new("b", "String"));
        def.add_field(FieldDefinition::new("c", "String"));
        def.remove_field("b");
        let names: Vec<_> = def.fields().keys().cloned().collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn argument_internal_name_falls_back_to_public() {
        let mut arg = ArgumentDefinition::new("inputData", "UserInput");
        assert_eq!(arg.internal_name(), "inputData");
        arg.internal_name = Some("input".to_string());
        assert_eq!(arg.internal_name(), "input");
    }
}
