//! Annotation-like class metadata.
//!
//! The compiler does not reflect over live types; it consumes explicit
//! metadata records describing a domain class: its members, the schema
//! annotations attached to them, declared interfaces and ancestry. A
//! [`MetadataReader`] is the collaborator that supplies these records.

use dgql_schema::{ExclusionPolicy, MemberKind};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value;

/// Metadata describing one domain class.
#[derive(Debug, Clone, Default)]
pub struct ClassMetadata {
    /// Fully qualified class name (any separator convention).
    pub class_name: String,
    /// Parent class name, when the class extends another.
    pub parent: Option<String>,
    pub is_abstract: bool,
    /// Class names of declared interfaces.
    pub interfaces: Vec<String>,
    /// Object or input-object annotation, when present.
    pub object_type: Option<ObjectTypeMeta>,
    /// Interface annotation; a class may carry both when it is a
    /// discriminated interface and a concrete object at once.
    pub interface_type: Option<InterfaceTypeMeta>,
    /// Properties and methods, in declaration order.
    pub members: Vec<MemberMetadata>,
    pub overrides: Vec<OverrideFieldMeta>,
    pub virtual_fields: Vec<VirtualFieldMeta>,
}

impl ClassMetadata {
    /// Creates metadata for a class.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            ..Self::default()
        }
    }

    /// The last path segment of the class name.
    pub fn short_name(&self) -> &str {
        self.class_name
            .rsplit(|c| c == ':' || c == '\\' || c == '.')
            .next()
            .unwrap_or(&self.class_name)
    }
}

/// The object/input-object type annotation.
#[derive(Debug, Clone, Default)]
pub struct ObjectTypeMeta {
    /// Explicit type name; defaults to the class short name.
    pub name: Option<String>,
    /// True for input object types.
    pub input: bool,
    pub description: Option<String>,
    pub exclusion_policy: ExclusionPolicy,
    pub options: IndexMap<String, Value>,
}

/// The interface type annotation.
#[derive(Debug, Clone, Default)]
pub struct InterfaceTypeMeta {
    /// Explicit name; defaults to the class short name with a trailing
    /// `Interface` stripped.
    pub name: Option<String>,
    pub description: Option<String>,
    pub exclusion_policy: ExclusionPolicy,
    pub discriminator_property: Option<String>,
    pub discriminator_map: IndexMap<String, String>,
    pub options: IndexMap<String, Value>,
}

/// One reflected property or method.
#[derive(Debug, Clone)]
pub struct MemberMetadata {
    pub name: String,
    pub kind: MemberKind,
    /// Field annotation; on methods this also acts as the exposure opt-in.
    pub field: Option<FieldMeta>,
    /// Explicit exclusion annotation.
    pub exclude: bool,
    /// Explicit exposure annotation.
    pub expose: bool,
    /// Argument annotations, methods only.
    pub arguments: Vec<ArgumentMeta>,
}

impl MemberMetadata {
    /// Creates a property member.
    pub fn property(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Property,
            field: None,
            exclude: false,
            expose: false,
            arguments: Vec::new(),
        }
    }

    /// Creates a method member.
    pub fn method(name: impl Into<String>) -> Self {
        Self {
            kind: MemberKind::Method,
            ..Self::property(name)
        }
    }

    /// Attaches a field annotation.
    pub fn with_field(mut self, field: FieldMeta) -> Self {
        self.field = Some(field);
        self
    }

    /// The schema-facing name for this member: accessor prefixes
    /// (`get`/`is`/`has`) are stripped and the first letter lowered.
    pub fn property_name(&self) -> String {
        property_name(&self.name)
    }
}

/// Strips accessor prefixes from a member name.
pub(crate) fn property_name(member: &str) -> String {
    for prefix in ["get", "is", "has"] {
        if let Some(rest) = member.strip_prefix(prefix) {
            if rest.chars().next().is_some_and(char::is_uppercase) {
                let mut chars = rest.chars();
                let first = chars.next().unwrap_or_default();
                return first.to_lowercase().collect::<String>() + chars.as_str();
            }
        }
    }
    member.to_string()
}

/// The field annotation.
#[derive(Debug, Clone, Default)]
pub struct FieldMeta {
    /// Explicit field name; defaults to the member's property name.
    pub name: Option<String>,
    /// Type string (`User`, `[ID!]!`, ...).
    pub type_name: Option<String>,
    /// Resolver registry name.
    pub resolver: Option<String>,
    pub complexity: Option<u32>,
    pub max_concurrent_usage: Option<u32>,
    pub roles: Vec<String>,
    pub description: Option<String>,
    pub deprecation_reason: Option<String>,
    /// Definition names this annotation applies to; empty means all.
    pub in_definitions: Vec<String>,
    /// Definition names this annotation does not apply to.
    pub not_in_definitions: Vec<String>,
    pub options: IndexMap<String, Value>,
}

impl FieldMeta {
    /// Creates a field annotation with a type string.
    pub fn typed(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::default()
        }
    }
}

/// The argument annotation on a method member.
#[derive(Debug, Clone, Default)]
pub struct ArgumentMeta {
    pub name: String,
    pub internal_name: Option<String>,
    pub type_name: String,
    pub description: Option<String>,
    pub default_value: Option<Value>,
}

impl ArgumentMeta {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            ..Self::default()
        }
    }
}

/// A declarative field override, applied after the merge walk.
#[derive(Debug, Clone, Default)]
pub struct OverrideFieldMeta {
    /// Target field name.
    pub name: String,
    /// Removes the field entirely.
    pub hidden: bool,
    /// Renames the field, re-keying the field map.
    pub alias: Option<String>,
    pub type_name: Option<String>,
    pub description: Option<String>,
    /// `Some(Some(reason))` deprecates, `Some(None)` clears a deprecation,
    /// `None` leaves it untouched.
    pub deprecation_reason: Option<Option<String>>,
    pub complexity: Option<u32>,
    pub roles: Vec<String>,
    pub in_definitions: Vec<String>,
    pub not_in_definitions: Vec<String>,
}

impl OverrideFieldMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A virtual field backed by an expression resolver.
#[derive(Debug, Clone, Default)]
pub struct VirtualFieldMeta {
    pub name: String,
    pub type_name: String,
    /// Expression evaluated against the root value.
    pub expression: String,
    pub description: Option<String>,
    pub deprecation_reason: Option<String>,
    pub complexity: Option<u32>,
    pub roles: Vec<String>,
    pub in_definitions: Vec<String>,
    pub not_in_definitions: Vec<String>,
}

impl VirtualFieldMeta {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            expression: expression.into(),
            ..Self::default()
        }
    }
}

/// Supplies class metadata to the compiler.
pub trait MetadataReader: Send + Sync {
    /// Returns the metadata for a class, if known.
    fn read(&self, class_name: &str) -> Option<&ClassMetadata>;
}

/// An in-memory metadata reader.
#[derive(Debug, Default)]
pub struct StaticMetadataReader {
    classes: FxHashMap<String, ClassMetadata>,
}

impl StaticMetadataReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers class metadata, keyed by class name.
    pub fn add(&mut self, metadata: ClassMetadata) {
        self.classes.insert(metadata.class_name.clone(), metadata);
    }

    /// Builder-style registration.
    pub fn with(mut self, metadata: ClassMetadata) -> Self {
        self.add(metadata);
        self
    }
}

impl MetadataReader for StaticMetadataReader {
    fn read(&self, class_name: &str) -> Option<&ClassMetadata> {
        self.classes.get(class_name)
    }
}
