//! Definition compiler for dgql.
//!
//! This crate turns annotation-like class metadata into compiled type
//! definitions:
//! - `metadata`: the metadata records and the reader collaborator
//! - `decorator`: the pluggable, priority-ordered field decoration pipeline
//! - `compiler`: the merge algorithm (interfaces, inheritance, overrides,
//!   virtual fields)

pub mod compiler;
pub mod decorator;
pub mod metadata;

pub use compiler::DefinitionCompiler;
pub use decorator::{DecoratorPipeline, FieldDecorator, MetadataFieldDecorator};
pub use metadata::{
    ArgumentMeta, ClassMetadata, FieldMeta, InterfaceTypeMeta, MemberMetadata, MetadataReader,
    ObjectTypeMeta, OverrideFieldMeta, StaticMetadataReader, VirtualFieldMeta,
};
