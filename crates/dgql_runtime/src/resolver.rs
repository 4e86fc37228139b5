//! Resolver trait and registry.
//!
//! A resolver computes one field or operation value. Definitions reference
//! resolvers by name; the registry maps those names to implementations and
//! is validated against the endpoint at warm-up, so a dangling name is a
//! compile failure instead of a request-time surprise.

use crate::access::AccessSubject;
use crate::buffer::{DeferredBuffer, PendingReference};
use crate::store::{value_at_path, EntityStore};
use dgql_core::{CompileError, IdCodec, ResolutionError};
use dgql_schema::{Endpoint, FieldDefinition, EMPTY_OBJECT_RESOLVER, EXPRESSION_RESOLVER};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Normalized arguments handed to a resolver, keyed by internal name.
#[derive(Debug, Clone, Default)]
pub struct ResolverArgs {
    args: IndexMap<String, Value>,
}

impl ResolverArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates resolver args from (name, value) pairs.
    pub fn from_pairs(pairs: Vec<(String, Value)>) -> Self {
        Self {
            args: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Deserializes an argument into a concrete type.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.args
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// A required argument, as a resolution error when absent or malformed.
    pub fn require<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<T, ResolutionError> {
        let value = self
            .args
            .get(name)
            .ok_or_else(|| ResolutionError::MissingArgument {
                argument: name.to_string(),
            })?;
        serde_json::from_value(value.clone()).map_err(|e| ResolutionError::InvalidArgument {
            argument: name.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.args.insert(name.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.args.iter()
    }

    /// The whole argument map as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.args.clone().into_iter().collect())
    }
}

/// Shared request state handed to every resolver.
///
/// The buffer is the one owned by the request's execution scope.
#[derive(Clone)]
pub struct ResolverContext {
    pub endpoint: Arc<Endpoint>,
    pub store: Arc<dyn EntityStore>,
    pub buffer: DeferredBuffer,
    pub id_codec: Arc<dyn IdCodec>,
    pub subject: Option<AccessSubject>,
}

impl std::fmt::Debug for ResolverContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverContext")
            .field("endpoint", &self.endpoint.name())
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

/// Info about the field or operation being resolved.
#[derive(Debug, Clone)]
pub struct ResolverInfo {
    pub field_name: String,
    pub parent_type: String,
    pub return_type: String,
    /// The field definition, absent for top-level operations.
    pub field: Option<FieldDefinition>,
}

impl ResolverInfo {
    pub fn new(field_name: impl Into<String>, parent_type: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            parent_type: parent_type.into(),
            return_type: String::new(),
            field: None,
        }
    }

    pub fn with_return_type(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = return_type.into();
        self
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.field = Some(field);
        self
    }
}

/// Result type for resolvers.
pub type ResolverResult = Result<PendingReference, ResolutionError>;

/// Future type for async resolvers.
pub type ResolverFuture<'a> = Pin<Box<dyn Future<Output = ResolverResult> + Send + 'a>>;

/// Computes one field or operation value.
pub trait Resolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        root: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a ResolverContext,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a>;
}

/// Wraps a synchronous closure as a resolver.
pub struct FnResolver<F>
where
    F: Fn(&Value, &ResolverArgs, &ResolverContext, &ResolverInfo) -> ResolverResult
        + Send
        + Sync,
{
    func: F,
}

impl<F> FnResolver<F>
where
    F: Fn(&Value, &ResolverArgs, &ResolverContext, &ResolverInfo) -> ResolverResult
        + Send
        + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Resolver for FnResolver<F>
where
    F: Fn(&Value, &ResolverArgs, &ResolverContext, &ResolverInfo) -> ResolverResult
        + Send
        + Sync,
{
    fn resolve<'a>(
        &'a self,
        root: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a ResolverContext,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        let result = (self.func)(root, args, ctx, info);
        Box::pin(async move { result })
    }
}

/// Evaluates a dotted-path expression against the root value.
///
/// Backs virtual fields: the expression lives in the field metadata.
struct ExpressionResolver;

impl Resolver for ExpressionResolver {
    fn resolve<'a>(
        &'a self,
        root: &'a Value,
        _args: &'a ResolverArgs,
        _ctx: &'a ResolverContext,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        let result = info
            .field
            .as_ref()
            .and_then(|field| field.meta("expression"))
            .and_then(Value::as_str)
            .map(|expression| {
                value_at_path(root, expression)
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .map(PendingReference::Loaded)
            .ok_or_else(|| {
                ResolutionError::custom(format!(
                    "the field \"{}\" has no expression to evaluate",
                    info.field_name
                ))
            });
        Box::pin(async move { result })
    }
}

/// Returns an empty object; backs namespace container fields.
struct EmptyObjectResolver;

impl Resolver for EmptyObjectResolver {
    fn resolve<'a>(
        &'a self,
        _root: &'a Value,
        _args: &'a ResolverArgs,
        _ctx: &'a ResolverContext,
        _info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        Box::pin(async move { Ok(PendingReference::Loaded(Value::Object(Default::default()))) })
    }
}

/// Maps resolver names to implementations.
pub struct ResolverRegistry {
    resolvers: FxHashMap<String, Arc<dyn Resolver>>,
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverRegistry {
    /// Creates a registry with the built-in resolvers installed.
    pub fn new() -> Self {
        let mut registry = Self {
            resolvers: FxHashMap::default(),
        };
        registry.register(EXPRESSION_RESOLVER, ExpressionResolver);
        registry.register(EMPTY_OBJECT_RESOLVER, EmptyObjectResolver);
        registry
    }

    /// Registers a resolver under a name.
    pub fn register(&mut self, name: impl Into<String>, resolver: impl Resolver + 'static) {
        self.resolvers.insert(name.into(), Arc::new(resolver));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Resolver>> {
        self.resolvers.get(name).map(Arc::clone)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    /// Checks that every resolver named by the endpoint is registered.
    ///
    /// Run at warm-up, after compilation; a dangling resolver name is a
    /// schema-authoring mistake, not a request-time condition.
    pub fn validate(&self, endpoint: &Endpoint) -> Result<(), CompileError> {
        for (type_name, definition) in endpoint.types() {
            for field in definition.fields().values() {
                if let Some(resolver) = &field.resolver {
                    if !self.contains(resolver) {
                        return Err(CompileError::UnknownResolver {
                            resolver: resolver.clone(),
                            definition: format!("{type_name}.{}", field.name),
                        });
                    }
                }
            }
        }
        for operation in endpoint.queries().values().chain(endpoint.mutations().values()) {
            if let Some(resolver) = &operation.resolver {
                if !self.contains(resolver) {
                    return Err(CompileError::UnknownResolver {
                        resolver: resolver.clone(),
                        definition: operation.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("resolvers", &self.resolvers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use dgql_core::Base64Codec;
    use dgql_schema::{FieldDefinition, ObjectDefinition, OperationDefinition, OperationKind, TypeDefinition};
    use serde_json::json;

    fn context() -> ResolverContext {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        ResolverContext {
            endpoint: Arc::new(Endpoint::new("default")),
            buffer: DeferredBuffer::new(Arc::clone(&store)),
            store,
            id_codec: Arc::new(Base64Codec),
            subject: None,
        }
    }

    #[tokio::test]
    async fn expression_resolver_walks_dotted_paths() {
        let mut field = FieldDefinition::new("city", "String");
        field.resolver = Some(EXPRESSION_RESOLVER.to_string());
        field.set_meta("expression", json!("profile.address.city"));
        let info = ResolverInfo::new("city", "User").with_field(field);

        let root = json!({"profile": {"address": {"city": "Berlin"}}});
        let ctx = context();
        let resolved = ExpressionResolver
            .resolve(&root, &ResolverArgs::new(), &ctx, &info)
            .await
            .unwrap();
        assert_eq!(resolved, PendingReference::Loaded(json!("Berlin")));

        // Dangling path resolves to null, not an error.
        let resolved = ExpressionResolver
            .resolve(&json!({}), &ResolverArgs::new(), &ctx, &info)
            .await
            .unwrap();
        assert_eq!(resolved, PendingReference::Loaded(Value::Null));
    }

    #[tokio::test]
    async fn empty_object_resolver_backs_containers() {
        let ctx = context();
        let info = ResolverInfo::new("users", "Query");
        let resolved = EmptyObjectResolver
            .resolve(&Value::Null, &ResolverArgs::new(), &ctx, &info)
            .await
            .unwrap();
        assert_eq!(resolved, PendingReference::Loaded(json!({})));
    }

    #[test]
    fn validate_rejects_dangling_resolver_names() {
        let mut endpoint = Endpoint::new("default");
        let mut def = TypeDefinition::Object(ObjectDefinition::new("User"));
        let mut field = FieldDefinition::new("friends", "User");
        field.resolver = Some("user_friends".to_string());
        def.add_field(field);
        endpoint.add_type(def);

        let mut registry = ResolverRegistry::new();
        let err = registry.validate(&endpoint).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownResolver {
                resolver: "user_friends".to_string(),
                definition: "User.friends".to_string(),
            }
        );

        registry.register(
            "user_friends",
            FnResolver::new(|_, _, _, _| Ok(PendingReference::Loaded(Value::Null))),
        );
        assert!(registry.validate(&endpoint).is_ok());

        let mut op = OperationDefinition::new("allUsers", OperationKind::Query, "User");
        op.resolver = Some("all_users".to_string());
        endpoint.add_operation(op);
        assert!(registry.validate(&endpoint).is_err());
    }

    #[test]
    fn args_expose_typed_accessors() {
        let args = ResolverArgs::from_pairs(vec![
            ("first".to_string(), json!(10)),
            ("search".to_string(), json!("john")),
        ]);
        assert_eq!(args.get_as::<u64>("first"), Some(10));
        assert_eq!(args.require::<String>("search").unwrap(), "john");
        assert!(matches!(
            args.require::<String>("missing"),
            Err(ResolutionError::MissingArgument { .. })
        ));
        assert!(matches!(
            args.require::<u64>("search"),
            Err(ResolutionError::InvalidArgument { .. })
        ));
    }
}
