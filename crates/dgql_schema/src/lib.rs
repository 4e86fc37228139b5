//! Schema definitions and the type registry for dgql.
//!
//! This crate provides:
//! - `definition`: type, field, argument and operation definition records
//! - `endpoint`: the per-schema registry, read-only after compilation
//! - `namespace`: regrouping of namespaced operations under container types

pub mod definition;
pub mod endpoint;
pub mod namespace;

pub use definition::{
    ArgumentDefinition, ExclusionPolicy, FieldDefinition, InputObjectDefinition,
    InterfaceDefinition, MemberKind, ObjectDefinition, OperationDefinition, OperationKind,
    TypeDefinition, EXPRESSION_RESOLVER,
};
pub use endpoint::Endpoint;
pub use namespace::{NamespaceConfig, NamespacePass, EMPTY_OBJECT_RESOLVER};
