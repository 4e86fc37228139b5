//! Persistence collaborator.
//!
//! The runtime never talks to a database directly; it builds a [`NodeQuery`]
//! and hands it to an [`EntityStore`]. The store decides how to execute the
//! predicate tree. An in-memory implementation backs the test suite and
//! doubles as a reference for the predicate semantics.

use async_trait::async_trait;
use dgql_core::{DeferredFetchError, ResolutionError};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Reads a dotted path out of a JSON value.
pub fn value_at_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// The identity of a row, when it carries one.
pub(crate) fn row_id(row: &Value) -> Option<String> {
    match row.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A filter predicate over node rows.
///
/// Predicates at the query level combine with AND; `Or` is the only
/// explicit combinator and exists for search groups.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field equals a value.
    Eq { field: String, value: Value },
    /// Field is one of the given values.
    In { field: String, values: Vec<Value> },
    /// Field is absent or null.
    IsNull { field: String },
    /// String field contains a substring, case-insensitively.
    Contains { field: String, needle: String },
    /// A list-valued field contains the value (to-many membership).
    Member { field: String, value: Value },
    /// Any of the inner predicates holds.
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Evaluates the predicate against a row.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Self::Eq { field, value } => value_at_path(row, field) == Some(value),
            Self::In { field, values } => value_at_path(row, field)
                .is_some_and(|actual| values.iter().any(|v| v == actual)),
            Self::IsNull { field } => {
                value_at_path(row, field).map_or(true, Value::is_null)
            }
            Self::Contains { field, needle } => value_at_path(row, field)
                .and_then(Value::as_str)
                .is_some_and(|s| s.to_lowercase().contains(&needle.to_lowercase())),
            Self::Member { field, value } => value_at_path(row, field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Self::Or(inner) => inner.iter().any(|p| p.matches(row)),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One ordering criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

/// A query for nodes of one type: predicates, ordering and a window.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeQuery {
    pub type_name: String,
    /// AND-combined predicates.
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<Order>,
    pub offset: u64,
    pub limit: Option<u64>,
}

impl NodeQuery {
    /// Creates a query matching every node of a type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            predicates: Vec::new(),
            order_by: Vec::new(),
            offset: 0,
            limit: None,
        }
    }

    /// Adds a predicate to the AND set.
    pub fn filter(&mut self, predicate: Predicate) -> &mut Self {
        self.predicates.push(predicate);
        self
    }

    /// Adds an ordering criterion.
    pub fn order(&mut self, field: impl Into<String>, direction: Direction) -> &mut Self {
        self.order_by.push(Order {
            field: field.into(),
            direction,
        });
        self
    }

    /// Sets the fetch window.
    pub fn window(&mut self, offset: u64, limit: u64) -> &mut Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// True when a row satisfies every predicate.
    pub fn accepts(&self, row: &Value) -> bool {
        self.predicates.iter().all(|p| p.matches(row))
    }
}

/// The persistence seam of the runtime.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Bulk-fetches nodes of one type by identity.
    ///
    /// The result does not have to preserve order or cover every id; callers
    /// re-associate rows by their `id`.
    async fn fetch_many(
        &self,
        type_name: &str,
        ids: &[String],
    ) -> Result<Vec<Value>, DeferredFetchError>;

    /// Counts the rows matching a query, ignoring its window.
    async fn count(&self, query: &NodeQuery) -> Result<u64, ResolutionError>;

    /// Fetches the rows matching a query, honoring its window.
    async fn fetch(&self, query: &NodeQuery) -> Result<Vec<Value>, ResolutionError>;

    /// Persists a node, returning the stored row.
    async fn commit(&self, type_name: &str, node: Value) -> Result<Value, ResolutionError>;
}

/// An in-memory store over JSON rows, keyed by type name.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<FxHashMap<String, Vec<Value>>>,
    bulk_fetches: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row for a type.
    pub async fn insert(&self, type_name: impl Into<String>, row: Value) {
        self.rows
            .write()
            .await
            .entry(type_name.into())
            .or_default()
            .push(row);
    }

    /// Number of bulk fetches executed so far.
    pub fn bulk_fetches(&self) -> usize {
        self.bulk_fetches.load(Ordering::SeqCst)
    }
}

fn compare(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn fetch_many(
        &self,
        type_name: &str,
        ids: &[String],
    ) -> Result<Vec<Value>, DeferredFetchError> {
        self.bulk_fetches.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.read().await;
        let matching = rows
            .get(type_name)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row_id(row).is_some_and(|id| ids.contains(&id)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(matching)
    }

    async fn count(&self, query: &NodeQuery) -> Result<u64, ResolutionError> {
        let rows = self.rows.read().await;
        let count = rows
            .get(&query.type_name)
            .map(|rows| rows.iter().filter(|row| query.accepts(row)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn fetch(&self, query: &NodeQuery) -> Result<Vec<Value>, ResolutionError> {
        let rows = self.rows.read().await;
        let mut matching: Vec<Value> = rows
            .get(&query.type_name)
            .map(|rows| rows.iter().filter(|row| query.accepts(row)).cloned().collect())
            .unwrap_or_default();

        for order in query.order_by.iter().rev() {
            matching.sort_by(|a, b| {
                let ordering = compare(
                    value_at_path(a, &order.field).unwrap_or(&Value::Null),
                    value_at_path(b, &order.field).unwrap_or(&Value::Null),
                );
                match order.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        let start = (query.offset as usize).min(matching.len());
        let mut windowed = matching.split_off(start);
        if let Some(limit) = query.limit {
            windowed.truncate(limit as usize);
        }
        Ok(windowed)
    }

    async fn commit(&self, type_name: &str, node: Value) -> Result<Value, ResolutionError> {
        let id = row_id(&node).ok_or_else(|| {
            ResolutionError::custom(format!(
                "can't commit a \"{type_name}\" node without an id"
            ))
        })?;
        let mut rows = self.rows.write().await;
        let rows = rows.entry(type_name.to_string()).or_default();
        match rows
            .iter_mut()
            .find(|row| row_id(row).as_deref() == Some(id.as_str()))
        {
            Some(existing) => *existing = node.clone(),
            None => rows.push(node.clone()),
        }
        Ok(node)
    }
}
