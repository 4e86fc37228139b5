//! Resolver executor.
//!
//! The executor is the request-time counterpart of the compiler: it looks up
//! the definition, enforces the concurrency guard and access control,
//! normalizes arguments (global-id decode, input materialization), dispatches
//! the resolver and post-processes the result (ID encoding, deferred loads).
//!
//! Usage counters and the deferred load buffer live in an [`Execution`]
//! created per request, never in shared state, so concurrent requests cannot
//! observe each other's counts or share a load wave.

use crate::access::{AccessChecker, AccessSubject, RoleChecker};
use crate::buffer::{Deferred, DeferredBuffer, PendingReference};
use crate::resolver::{Resolver, ResolverArgs, ResolverContext, ResolverInfo, ResolverRegistry};
use crate::store::EntityStore;
use dgql_core::{Base64Codec, IdCodec, ResolutionError};
use dgql_schema::{ArgumentDefinition, Endpoint, FieldDefinition, OperationKind};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-request execution scope.
///
/// Holds the per-field usage counters backing `max_concurrent_usage` and the
/// deferred load buffer for this request's waves.
#[derive(Debug)]
pub struct Execution {
    usage: Mutex<FxHashMap<String, u32>>,
    buffer: DeferredBuffer,
}

impl Execution {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            usage: Mutex::new(FxHashMap::default()),
            buffer: DeferredBuffer::new(store),
        }
    }

    /// The deferred load buffer scoped to this execution.
    pub fn buffer(&self) -> &DeferredBuffer {
        &self.buffer
    }

    /// Counts one usage of a guarded field.
    async fn register_usage(
        &self,
        key: &str,
        field: &FieldDefinition,
    ) -> Result<(), ResolutionError> {
        let Some(max) = field.max_concurrent_usage else {
            return Ok(());
        };
        let mut usage = self.usage.lock().await;
        let count = usage.entry(key.to_string()).or_insert(0);
        *count += 1;
        if *count > max {
            if max == 1 {
                return Err(ResolutionError::ConcurrentUsageOnce {
                    field: field.name.clone(),
                });
            }
            return Err(ResolutionError::ConcurrentUsage {
                field: field.name.clone(),
                max,
            });
        }
        Ok(())
    }
}

/// A field result, ready or still waiting on the deferred buffer.
///
/// Resolving a field never forces the buffer; the flush happens when the
/// first waiting value is read. Sibling fields resolved before that read
/// share the same wave and the same bulk fetch.
pub struct FieldValue {
    state: FieldState,
}

enum FieldState {
    Ready(Value),
    Waiting {
        handle: Deferred,
        codec: Arc<dyn IdCodec>,
        node_type: String,
        field_type: String,
    },
}

impl FieldValue {
    /// The field value; reading a waiting handle flushes the buffer.
    pub async fn value(self) -> Value {
        match self.state {
            FieldState::Ready(value) => value,
            FieldState::Waiting {
                handle,
                codec,
                node_type,
                field_type,
            } => encode_ids(&*codec, &node_type, &field_type, handle.value().await),
        }
    }
}

impl std::fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            FieldState::Ready(_) => "ready",
            FieldState::Waiting { .. } => "waiting",
        };
        f.debug_struct("FieldValue").field("state", &state).finish()
    }
}

/// Dispatches resolvers for fields and operations.
pub struct ResolverExecutor {
    endpoint: Arc<Endpoint>,
    registry: Arc<ResolverRegistry>,
    store: Arc<dyn EntityStore>,
    id_codec: Arc<dyn IdCodec>,
    access: Arc<dyn AccessChecker>,
}

impl ResolverExecutor {
    pub fn new(
        endpoint: Arc<Endpoint>,
        registry: Arc<ResolverRegistry>,
        store: Arc<dyn EntityStore>,
    ) -> Self {
        Self {
            endpoint,
            registry,
            store,
            id_codec: Arc::new(Base64Codec),
            access: Arc::new(RoleChecker),
        }
    }

    /// Replaces the identifier codec.
    pub fn with_codec(mut self, codec: impl IdCodec + 'static) -> Self {
        self.id_codec = Arc::new(codec);
        self
    }

    /// Replaces the access checker.
    pub fn with_access(mut self, access: impl AccessChecker + 'static) -> Self {
        self.access = Arc::new(access);
        self
    }

    /// Opens a fresh execution scope for one request.
    pub fn execution(&self) -> Execution {
        Execution::new(Arc::clone(&self.store))
    }

    /// Resolves one field on one root value.
    ///
    /// Returns a [`FieldValue`]; a field backed by a pending reference stays
    /// queued until the value is read.
    pub async fn resolve_field(
        &self,
        execution: &Execution,
        subject: Option<&AccessSubject>,
        parent_type: &str,
        root: &Value,
        field_name: &str,
        raw_args: Value,
    ) -> Result<FieldValue, ResolutionError> {
        let field = self.field_definition(parent_type, field_name)?;
        let qualified = format!("{parent_type}.{field_name}");
        execution.register_usage(&qualified, &field).await?;
        self.check_access(subject, &qualified, &field.roles)?;

        let args = self.normalize_args(&field.arguments, &raw_args)?;
        let ctx = self.context(subject, execution);
        let info = ResolverInfo::new(field_name, parent_type)
            .with_return_type(&field.type_name)
            .with_field(field.clone());

        let outcome = self.dispatch(&field, &qualified, root, &args, &ctx, &info).await?;
        Ok(match outcome {
            PendingReference::Loaded(value) => FieldValue {
                state: FieldState::Ready(encode_ids(
                    &*self.id_codec,
                    parent_type,
                    &field.type_name,
                    value,
                )),
            },
            PendingReference::Pending { type_name, id } => FieldValue {
                state: FieldState::Waiting {
                    handle: execution.buffer.defer(&type_name, &id).await,
                    codec: Arc::clone(&self.id_codec),
                    node_type: parent_type.to_string(),
                    field_type: field.type_name.clone(),
                },
            },
        })
    }

    /// Resolves one field across many sibling roots.
    ///
    /// All roots are dispatched before any value is read, so pending
    /// references collected over the batch land in one wave: a list of N
    /// parents costs one bulk fetch per target type instead of N.
    pub async fn resolve_fields(
        &self,
        execution: &Execution,
        subject: Option<&AccessSubject>,
        parent_type: &str,
        roots: &[Value],
        field_name: &str,
        raw_args: Value,
    ) -> Result<Vec<Value>, ResolutionError> {
        let mut outcomes = Vec::with_capacity(roots.len());
        for root in roots {
            outcomes.push(
                self.resolve_field(
                    execution,
                    subject,
                    parent_type,
                    root,
                    field_name,
                    raw_args.clone(),
                )
                .await?,
            );
        }
        let mut values = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            values.push(outcome.value().await);
        }
        Ok(values)
    }

    /// Resolves a top-level query or mutation.
    ///
    /// Mutation results are committed through the store before they are
    /// returned.
    pub async fn resolve_operation(
        &self,
        execution: &Execution,
        subject: Option<&AccessSubject>,
        kind: OperationKind,
        name: &str,
        raw_args: Value,
    ) -> Result<Value, ResolutionError> {
        let operation = match kind {
            OperationKind::Query => self.endpoint.query(name),
            OperationKind::Mutation => self.endpoint.mutation(name),
        }
        .ok_or_else(|| ResolutionError::custom(format!("unknown operation \"{name}\"")))?
        .clone();

        self.check_access(subject, &operation.name, &operation.roles)?;
        let args = self.normalize_args(&operation.arguments, &raw_args)?;
        let resolver_name =
            operation
                .resolver
                .as_deref()
                .ok_or_else(|| ResolutionError::UnknownResolver {
                    resolver: String::new(),
                    definition: operation.name.clone(),
                })?;
        let resolver =
            self.registry
                .get(resolver_name)
                .ok_or_else(|| ResolutionError::UnknownResolver {
                    resolver: resolver_name.to_string(),
                    definition: operation.name.clone(),
                })?;

        let ctx = self.context(subject, execution);
        let parent = match kind {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
        };
        let info = ResolverInfo::new(&operation.name, parent)
            .with_return_type(&operation.type_name);

        let value = match resolver.resolve(&Value::Null, &args, &ctx, &info).await? {
            PendingReference::Loaded(value) => value,
            PendingReference::Pending { type_name, id } => {
                execution.buffer.defer(&type_name, &id).await.value().await
            }
        };
        if matches!(kind, OperationKind::Mutation) {
            return self.commit_result(&operation.type_name, value).await;
        }
        Ok(value)
    }

    /// Persists a mutation result through the store.
    async fn commit_result(
        &self,
        type_name: &str,
        value: Value,
    ) -> Result<Value, ResolutionError> {
        match value {
            Value::Object(_) => self.store.commit(type_name, value).await,
            Value::Array(items) => {
                let mut committed = Vec::with_capacity(items.len());
                for item in items {
                    committed.push(match item {
                        Value::Object(_) => self.store.commit(type_name, item).await?,
                        other => other,
                    });
                }
                Ok(Value::Array(committed))
            }
            other => Ok(other),
        }
    }

    fn field_definition(
        &self,
        parent_type: &str,
        field_name: &str,
    ) -> Result<FieldDefinition, ResolutionError> {
        self.endpoint
            .get_type(parent_type)
            .and_then(|def| def.field(field_name))
            .cloned()
            .ok_or_else(|| {
                ResolutionError::custom(format!(
                    "unknown field \"{field_name}\" on \"{parent_type}\""
                ))
            })
    }

    fn context(&self, subject: Option<&AccessSubject>, execution: &Execution) -> ResolverContext {
        ResolverContext {
            endpoint: Arc::clone(&self.endpoint),
            store: Arc::clone(&self.store),
            buffer: execution.buffer.clone(),
            id_codec: Arc::clone(&self.id_codec),
            subject: subject.cloned(),
        }
    }

    fn check_access(
        &self,
        subject: Option<&AccessSubject>,
        qualified: &str,
        roles: &[String],
    ) -> Result<(), ResolutionError> {
        if !self.access.is_controlled(roles) {
            return Ok(());
        }
        if self.access.is_granted(subject, roles) {
            return Ok(());
        }
        Err(ResolutionError::Forbidden {
            definition: qualified.to_string(),
            message: self.access.message(),
        })
    }

    async fn dispatch(
        &self,
        field: &FieldDefinition,
        qualified: &str,
        root: &Value,
        args: &ResolverArgs,
        ctx: &ResolverContext,
        info: &ResolverInfo,
    ) -> Result<PendingReference, ResolutionError> {
        match &field.resolver {
            Some(name) => {
                let resolver: Arc<dyn Resolver> = self.registry.get(name).ok_or_else(|| {
                    ResolutionError::UnknownResolver {
                        resolver: name.clone(),
                        definition: qualified.to_string(),
                    }
                })?;
                resolver.resolve(root, args, ctx, info).await
            }
            // No resolver: read the backing member off the root value.
            None => {
                let value = field
                    .origin_name
                    .as_deref()
                    .and_then(|origin| root.get(origin))
                    .or_else(|| root.get(&field.name))
                    .cloned()
                    .unwrap_or(Value::Null);
                Ok(PendingReference::Loaded(value))
            }
        }
    }

    /// Normalizes raw arguments against the declared set.
    ///
    /// Declared-but-absent arguments fall back to their default; missing
    /// non-null arguments are an error. ID-typed values are decoded from
    /// their opaque form (element-wise for lists) and input objects are
    /// materialized recursively. Results are keyed by internal name.
    fn normalize_args(
        &self,
        declared: &IndexMap<String, ArgumentDefinition>,
        raw: &Value,
    ) -> Result<ResolverArgs, ResolutionError> {
        let empty = serde_json::Map::new();
        let supplied = raw.as_object().unwrap_or(&empty);

        let mut args = ResolverArgs::new();
        for (name, argument) in declared {
            let value = supplied
                .get(name)
                .cloned()
                .or_else(|| argument.default_value.clone());
            let Some(value) = value else {
                if argument.non_null {
                    return Err(ResolutionError::MissingArgument {
                        argument: name.clone(),
                    });
                }
                continue;
            };

            let value = if argument.list {
                let items = match value {
                    Value::Array(items) => items,
                    // A single value coerces to a one-element list.
                    other => vec![other],
                };
                let normalized = items
                    .into_iter()
                    .map(|item| self.normalize_value(name, &argument.type_name, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Array(normalized)
            } else {
                self.normalize_value(name, &argument.type_name, value)?
            };
            // Resolvers may look the value up under either name.
            if argument.internal_name() != name {
                args.set(name.clone(), value.clone());
            }
            args.set(argument.internal_name(), value);
        }
        Ok(args)
    }

    fn normalize_value(
        &self,
        argument: &str,
        type_name: &str,
        value: Value,
    ) -> Result<Value, ResolutionError> {
        if value.is_null() {
            return Ok(value);
        }
        if type_name == "ID" {
            return self.decode_id(argument, &value);
        }
        if self
            .endpoint
            .get_type(type_name)
            .is_some_and(|def| def.as_input().is_some())
        {
            return self.materialize_input(argument, type_name, &value);
        }
        Ok(value)
    }

    fn decode_id(&self, argument: &str, value: &Value) -> Result<Value, ResolutionError> {
        let opaque = value
            .as_str()
            .ok_or_else(|| ResolutionError::InvalidArgument {
                argument: argument.to_string(),
                reason: "expected an opaque identifier string".to_string(),
            })?;
        let global = self
            .id_codec
            .decode(opaque)
            .ok_or_else(|| ResolutionError::InvalidArgument {
                argument: argument.to_string(),
                reason: format!("\"{opaque}\" is not a valid global identifier"),
            })?;
        Ok(Value::String(global.id))
    }

    /// Rebuilds an input object keyed by the origin member names.
    fn materialize_input(
        &self,
        argument: &str,
        type_name: &str,
        value: &Value,
    ) -> Result<Value, ResolutionError> {
        let Some(definition) = self.endpoint.get_type(type_name) else {
            return Ok(value.clone());
        };
        let supplied = value
            .as_object()
            .ok_or_else(|| ResolutionError::InvalidArgument {
                argument: argument.to_string(),
                reason: format!("expected an input object of type \"{type_name}\""),
            })?;

        let mut materialized = serde_json::Map::new();
        for field in definition.fields().values() {
            let Some(item) = supplied.get(&field.name).filter(|v| !v.is_null()) else {
                if field.non_null {
                    return Err(ResolutionError::MissingArgument {
                        argument: format!("{argument}.{}", field.name),
                    });
                }
                continue;
            };

            let key = field
                .origin_name
                .clone()
                .unwrap_or_else(|| field.name.clone());
            let nested_argument = format!("{argument}.{}", field.name);
            let converted = if field.list {
                let items = match item {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                let normalized = items
                    .into_iter()
                    .map(|v| self.normalize_value(&nested_argument, &field.type_name, v))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Array(normalized)
            } else {
                self.normalize_value(&nested_argument, &field.type_name, item.clone())?
            };
            materialized.insert(key, converted);
        }
        Ok(Value::Object(materialized))
    }
}

/// Encodes ID-typed results into opaque global identifiers.
fn encode_ids(codec: &dyn IdCodec, node_type: &str, field_type: &str, value: Value) -> Value {
    if field_type != "ID" {
        return value;
    }
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| encode_id(codec, node_type, item))
                .collect(),
        ),
        other => encode_id(codec, node_type, other),
    }
}

fn encode_id(codec: &dyn IdCodec, node_type: &str, value: Value) -> Value {
    match value {
        Value::String(raw) => Value::String(codec.encode(node_type, &raw)),
        Value::Number(n) => Value::String(codec.encode(node_type, &n.to_string())),
        other => other,
    }
}

impl std::fmt::Debug for ResolverExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverExecutor")
            .field("endpoint", &self.endpoint.name())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
