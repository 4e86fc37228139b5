//! Core utilities for dgql.
//!
//! This crate provides the shared leaf pieces of the schema engine:
//! - `error`: compile-time and resolution-time error types
//! - `id`: the pluggable opaque identifier/cursor codec
//! - `typing`: type-string parsing (`[User!]!` and friends)

pub mod error;
pub mod id;
pub mod typing;

pub use error::{CompileError, DeferredFetchError, ResolutionError};
pub use id::{Base64Codec, GlobalId, IdCodec, CURSOR_TYPE};
pub use typing::TypeRef;
