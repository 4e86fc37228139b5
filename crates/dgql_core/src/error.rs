//! Error types for dgql.
//!
//! Errors are split by lifecycle: `CompileError` aborts schema warm-up,
//! `ResolutionError` is scoped to the failing field at request time, and
//! `DeferredFetchError` degrades a batched load to null.

use thiserror::Error;

/// A schema-authoring mistake detected during compilation.
///
/// These are fatal at warm-up and are never surfaced during request
/// handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// An override targets a field that does not exist on the merged
    /// definition.
    #[error("the object definition \"{definition}\" does not have any field called \"{field}\" in any of its parent definitions")]
    OverrideTargetMissing { definition: String, field: String },

    /// A virtual field collides with an existing concrete field.
    #[error("the object definition \"{definition}\" already has a field called \"{field}\"")]
    VirtualFieldCollision { definition: String, field: String },

    /// A definition names a resolver that is not present in the resolver
    /// registry.
    #[error("the resolver \"{resolver}\" for \"{definition}\" is not registered")]
    UnknownResolver {
        resolver: String,
        definition: String,
    },

    /// Metadata for a referenced class is missing from the reader.
    #[error("no metadata available for class \"{class}\"")]
    MissingMetadata { class: String },
}

/// A runtime field-level failure.
///
/// Surfaced to the caller scoped to the failing field; sibling fields are
/// unaffected unless the failing field is declared non-null.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// Neither `first` nor `last` was supplied to a connection.
    #[error("you must provide a `first` or `last` value to properly paginate records in \"{connection}\" connection")]
    MissingPagination { connection: String },

    /// `first` or `last` exceeds the connection's page-size limit.
    #[error("requesting {requested} records for `{argument}` exceeds the limit of {limit} records for \"{connection}\" connection")]
    PaginationLimit {
        requested: u64,
        argument: &'static str,
        limit: u64,
        connection: String,
    },

    /// A field with max-concurrent-usage 1 was used more than once.
    #[error("the field \"{field}\" can be fetched only once per query. This field can't be used in a list")]
    ConcurrentUsageOnce { field: String },

    /// A field exceeded its max-concurrent-usage bound.
    #[error("the field \"{field}\" can't be fetched more than {max} times per query")]
    ConcurrentUsage { field: String, max: u32 },

    /// Access to the definition was denied.
    #[error("access denied to \"{definition}\"{}", message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Forbidden {
        definition: String,
        message: Option<String>,
    },

    /// No resolver could be located for the definition.
    #[error("the resolver \"{resolver}\" for \"{definition}\" is not a valid resolver")]
    UnknownResolver {
        resolver: String,
        definition: String,
    },

    /// An argument value could not be normalized.
    #[error("invalid value for argument \"{argument}\": {reason}")]
    InvalidArgument { argument: String, reason: String },

    /// A required argument was not supplied.
    #[error("missing required argument \"{argument}\"")]
    MissingArgument { argument: String },

    /// A nested connection has no configured parent relation field.
    #[error("missing parent field to filter \"{connection}\" by the given parent, a `parent_field` should be configured")]
    MissingParentRelation { connection: String },

    /// The `where` argument names a filter absent from the pipeline.
    #[error("unknown filter \"{filter}\" for \"{connection}\" connection")]
    UnknownFilter { filter: String, connection: String },

    /// A resolver-specific failure.
    #[error("{0}")]
    Custom(String),
}

impl ResolutionError {
    /// Creates a custom resolution error.
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

/// A failed bulk fetch behind the deferred load buffer.
///
/// Never fatal to the request: affected references resolve to null.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bulk fetch for type \"{type_name}\" failed: {message}")]
pub struct DeferredFetchError {
    pub type_name: String,
    pub message: String,
}

impl DeferredFetchError {
    /// Creates a new deferred fetch error.
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_limit_names_all_parts() {
        let err = ResolutionError::PaginationLimit {
            requested: 1000,
            argument: "first",
            limit: 50,
            connection: "allPosts".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("1000"));
        assert!(msg.contains("`first`"));
        assert!(msg.contains("50"));
        assert!(msg.contains("\"allPosts\""));
    }

    #[test]
    fn concurrent_usage_once_mentions_list_position() {
        let err = ResolutionError::ConcurrentUsageOnce {
            field: "viewer".to_string(),
        };
        assert!(err.to_string().contains("can't be used in a list"));
    }

    #[test]
    fn compile_error_names_definition_and_field() {
        let err = CompileError::OverrideTargetMissing {
            definition: "Post".to_string(),
            field: "title".to_string(),
        };
        assert!(err.to_string().contains("\"Post\""));
        assert!(err.to_string().contains("\"title\""));
    }
}
