//! Cursor-based connection pagination.
//!
//! Connections follow the edges/node shape with opaque offset cursors. A
//! [`ConnectionConfig`] describes one connection: its node type, page-size
//! limit, searchable fields, filter pipeline and how to scope by a parent
//! node. [`CursorPaginator::paginate`] turns a request into a [`NodeQuery`],
//! asks the store for a count and a window, and assembles the connection.

use crate::resolver::ResolverArgs;
use crate::store::{EntityStore, NodeQuery, Predicate};
use dgql_core::{IdCodec, ResolutionError, CURSOR_TYPE};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Default page-size limit when a connection does not set one.
pub const DEFAULT_PAGE_LIMIT: u64 = 100;

/// How a connection relates to its parent node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParentRelation {
    /// The parent id is a member of a list-valued field on the node.
    Member,
    /// A field on the node equals the parent id.
    #[default]
    Equals,
}

/// Context handed to `where` filters.
#[derive(Debug, Clone)]
pub struct FilterContext {
    pub connection: String,
    pub node_type: String,
}

/// A named `where` filter contributing predicates to the query.
pub trait Filter: Send + Sync {
    fn apply(
        &self,
        ctx: &FilterContext,
        query: &mut NodeQuery,
        value: &Value,
    ) -> Result<(), ResolutionError>;
}

/// Static description of one connection.
pub struct ConnectionConfig {
    /// Display name, used in error messages.
    pub name: String,
    /// Type of the nodes behind the connection.
    pub node_type: String,
    /// Upper bound for `first`/`last`; zero disables the check.
    pub limit: u64,
    /// Fields consulted by free-text search.
    pub searchable_fields: Vec<String>,
    /// Fields accepted by the deprecated typed `filters` argument.
    pub typed_filters: Vec<String>,
    /// Node field holding the parent relation.
    pub parent_field: Option<String>,
    pub parent_relation: ParentRelation,
    /// Named `where` filters.
    pub filters: IndexMap<String, Arc<dyn Filter>>,
}

impl ConnectionConfig {
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_type: node_type.into(),
            limit: DEFAULT_PAGE_LIMIT,
            searchable_fields: Vec::new(),
            typed_filters: Vec::new(),
            parent_field: None,
            parent_relation: ParentRelation::default(),
            filters: IndexMap::new(),
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn searchable(mut self, fields: &[&str]) -> Self {
        self.searchable_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn typed_filter(mut self, field: impl Into<String>) -> Self {
        self.typed_filters.push(field.into());
        self
    }

    pub fn parent(mut self, field: impl Into<String>, relation: ParentRelation) -> Self {
        self.parent_field = Some(field.into());
        self.parent_relation = relation;
        self
    }

    pub fn filter(mut self, name: impl Into<String>, filter: impl Filter + 'static) -> Self {
        self.filters.insert(name.into(), Arc::new(filter));
        self
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("name", &self.name)
            .field("node_type", &self.node_type)
            .field("limit", &self.limit)
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// The pagination arguments of one request.
#[derive(Debug, Clone, Default)]
pub struct PaginationRequest {
    pub first: Option<u64>,
    pub last: Option<u64>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub search: Option<String>,
    /// Deprecated typed filters: `{field: value}`.
    pub filters: Option<Value>,
    /// Named filter clauses: `{filterName: value}`.
    pub where_clause: Option<Value>,
}

impl PaginationRequest {
    /// Reads the well-known pagination arguments off a resolver call.
    pub fn from_args(args: &ResolverArgs) -> Self {
        Self {
            first: args.get_as("first"),
            last: args.get_as("last"),
            after: args.get_as("after"),
            before: args.get_as("before"),
            search: args.get_as("search"),
            filters: args.get("filters").cloned(),
            where_clause: args.get("where").cloned(),
        }
    }
}

/// One edge of a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub node: Value,
    pub cursor: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

/// A page of nodes with its cursors and the unwindowed total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub total_count: u64,
    pub page_info: PageInfo,
    pub edges: Vec<Edge>,
}

impl Connection {
    /// The connection as a JSON value, for resolver results.
    pub fn into_value(self) -> Result<Value, ResolutionError> {
        serde_json::to_value(self).map_err(|e| ResolutionError::custom(e.to_string()))
    }
}

/// Executes connection queries with offset-based opaque cursors.
pub struct CursorPaginator {
    store: Arc<dyn EntityStore>,
    codec: Arc<dyn IdCodec>,
}

impl CursorPaginator {
    pub fn new(store: Arc<dyn EntityStore>, codec: Arc<dyn IdCodec>) -> Self {
        Self { store, codec }
    }

    /// Paginates one connection.
    ///
    /// `parent` scopes the query to one parent node for nested connections.
    pub async fn paginate(
        &self,
        config: &ConnectionConfig,
        request: &PaginationRequest,
        parent: Option<&Value>,
    ) -> Result<Connection, ResolutionError> {
        if request.first.is_none() && request.last.is_none() {
            return Err(ResolutionError::MissingPagination {
                connection: config.name.clone(),
            });
        }
        if let Some(first) = request.first {
            if config.limit > 0 && first > config.limit {
                return Err(ResolutionError::PaginationLimit {
                    requested: first,
                    argument: "first",
                    limit: config.limit,
                    connection: config.name.clone(),
                });
            }
        }
        if let Some(last) = request.last {
            if config.limit > 0 && last > config.limit {
                return Err(ResolutionError::PaginationLimit {
                    requested: last,
                    argument: "last",
                    limit: config.limit,
                    connection: config.name.clone(),
                });
            }
        }

        let mut query = self.build_query(config, request, parent)?;
        let total = self.store.count(&query).await?;

        let mut start = match &request.after {
            Some(cursor) => self.decode_cursor("after", cursor)?.saturating_add(1),
            None => 0,
        };
        let mut end = match &request.before {
            Some(cursor) => self.decode_cursor("before", cursor)?.min(total),
            None => total,
        };
        if let Some(first) = request.first {
            end = end.min(start.saturating_add(first));
        }
        if let Some(last) = request.last {
            start = start.max(end.saturating_sub(last));
        }
        if start > end {
            start = end;
        }

        query.window(start, end - start);
        let rows = self.store.fetch(&query).await?;

        let edges: Vec<Edge> = rows
            .into_iter()
            .enumerate()
            .map(|(i, node)| Edge {
                cursor: self
                    .codec
                    .encode(CURSOR_TYPE, &(start + i as u64).to_string()),
                node,
            })
            .collect();
        let page_info = PageInfo {
            start_cursor: edges.first().map(|e| e.cursor.clone()),
            end_cursor: edges.last().map(|e| e.cursor.clone()),
            has_previous_page: start > 0,
            has_next_page: end < total,
        };
        Ok(Connection {
            total_count: total,
            page_info,
            edges,
        })
    }

    fn build_query(
        &self,
        config: &ConnectionConfig,
        request: &PaginationRequest,
        parent: Option<&Value>,
    ) -> Result<NodeQuery, ResolutionError> {
        let mut query = NodeQuery::new(&config.node_type);

        if let Some(parent) = parent {
            let parent_field =
                config
                    .parent_field
                    .as_ref()
                    .ok_or_else(|| ResolutionError::MissingParentRelation {
                        connection: config.name.clone(),
                    })?;
            let parent_id = parent.get("id").cloned().unwrap_or(Value::Null);
            let predicate = match config.parent_relation {
                ParentRelation::Member => Predicate::Member {
                    field: parent_field.clone(),
                    value: parent_id,
                },
                ParentRelation::Equals => Predicate::Eq {
                    field: parent_field.clone(),
                    value: parent_id,
                },
            };
            query.filter(predicate);
        }

        // Free text: tokens AND-combined, each an OR-group over the
        // searchable fields.
        if let Some(search) = &request.search {
            if !config.searchable_fields.is_empty() {
                for token in search.split_whitespace() {
                    let group = config
                        .searchable_fields
                        .iter()
                        .map(|field| Predicate::Contains {
                            field: field.clone(),
                            needle: token.to_string(),
                        })
                        .collect();
                    query.filter(Predicate::Or(group));
                }
            }
        }

        if let Some(Value::Object(filters)) = &request.filters {
            for (field, value) in filters {
                if !config.typed_filters.iter().any(|f| f == field) {
                    tracing::debug!(
                        connection = %config.name,
                        field = %field,
                        "ignoring unconfigured typed filter"
                    );
                    continue;
                }
                let predicate = match value {
                    Value::Null => Predicate::IsNull {
                        field: field.clone(),
                    },
                    Value::Array(values) => Predicate::In {
                        field: field.clone(),
                        values: values.clone(),
                    },
                    other => Predicate::Eq {
                        field: field.clone(),
                        value: other.clone(),
                    },
                };
                query.filter(predicate);
            }
        }

        if let Some(Value::Object(clauses)) = &request.where_clause {
            let ctx = FilterContext {
                connection: config.name.clone(),
                node_type: config.node_type.clone(),
            };
            for (name, value) in clauses {
                let filter =
                    config
                        .filters
                        .get(name)
                        .ok_or_else(|| ResolutionError::UnknownFilter {
                            filter: name.clone(),
                            connection: config.name.clone(),
                        })?;
                filter.apply(&ctx, &mut query, value)?;
            }
        }

        Ok(query)
    }

    fn decode_cursor(&self, argument: &str, cursor: &str) -> Result<u64, ResolutionError> {
        self.codec
            .decode(cursor)
            .filter(|global| global.type_name == CURSOR_TYPE)
            .and_then(|global| global.id.parse().ok())
            .ok_or_else(|| ResolutionError::InvalidArgument {
                argument: argument.to_string(),
                reason: format!("\"{cursor}\" is not a valid cursor"),
            })
    }
}

impl std::fmt::Debug for CursorPaginator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorPaginator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use dgql_core::Base64Codec;
    use serde_json::json;

    async fn seeded_store(count: u32) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for i in 1..=count {
            store
                .insert("Post", json!({"id": i.to_string(), "title": format!("post {i}")}))
                .await;
        }
        store
    }

    fn paginator(store: Arc<MemoryStore>) -> CursorPaginator {
        CursorPaginator::new(store as Arc<dyn EntityStore>, Arc::new(Base64Codec))
    }

    fn request() -> PaginationRequest {
        PaginationRequest::default()
    }

    #[tokio::test]
    async fn first_pages_forward_with_cursors() {
        let paginator = paginator(seeded_store(10).await);
        let config = ConnectionConfig::new("allPosts", "Post");

        let page = paginator
            .paginate(
                &config,
                &PaginationRequest {
                    first: Some(3),
                    ..request()
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(page.total_count, 10);
        assert_eq!(page.edges.len(), 3);
        assert!(!page.page_info.has_previous_page);
        assert!(page.page_info.has_next_page);
        assert_eq!(page.edges[0].node["id"], json!("1"));

        // Resume after the last edge of the first page.
        let next = paginator
            .paginate(
                &config,
                &PaginationRequest {
                    first: Some(3),
                    after: page.page_info.end_cursor.clone(),
                    ..request()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(next.edges[0].node["id"], json!("4"));
        assert!(next.page_info.has_previous_page);
    }

    #[tokio::test]
    async fn last_pages_backward() {
        let paginator = paginator(seeded_store(10).await);
        let config = ConnectionConfig::new("allPosts", "Post");

        let page = paginator
            .paginate(
                &config,
                &PaginationRequest {
                    last: Some(2),
                    ..request()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(page.edges.len(), 2);
        assert_eq!(page.edges[0].node["id"], json!("9"));
        assert!(page.page_info.has_previous_page);
        assert!(!page.page_info.has_next_page);
    }

    #[tokio::test]
    async fn missing_pagination_arguments_are_rejected() {
        let paginator = paginator(seeded_store(1).await);
        let config = ConnectionConfig::new("allPosts", "Post");
        let err = paginator.paginate(&config, &request(), None).await.unwrap_err();
        assert_eq!(
            err,
            ResolutionError::MissingPagination {
                connection: "allPosts".to_string()
            }
        );
        assert!(err.to_string().contains("`first` or `last`"));
    }

    #[tokio::test]
    async fn page_size_limit_is_enforced_with_a_full_message() {
        let paginator = paginator(seeded_store(1).await);
        let config = ConnectionConfig::new("allPosts", "Post").with_limit(50);
        let err = paginator
            .paginate(
                &config,
                &PaginationRequest {
                    first: Some(1000),
                    ..request()
                },
                None,
            )
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("1000"));
        assert!(msg.contains("`first`"));
        assert!(msg.contains("50"));
        assert!(msg.contains("\"allPosts\""));
    }

    #[tokio::test]
    async fn search_tokens_and_over_or_groups() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert("User", json!({"id": "1", "name": "John Doe", "email": "jd@x"}))
            .await;
        store
            .insert("User", json!({"id": "2", "name": "Johnny", "email": "doe@x"}))
            .await;
        store
            .insert("User", json!({"id": "3", "name": "Jane Doe", "email": "jane@x"}))
            .await;
        let paginator = paginator(store);
        let config = ConnectionConfig::new("allUsers", "User").searchable(&["name", "email"]);

        // Every token must match somewhere; "jane" lacks "john".
        let page = paginator
            .paginate(
                &config,
                &PaginationRequest {
                    first: Some(10),
                    search: Some("john doe".to_string()),
                    ..request()
                },
                None,
            )
            .await
            .unwrap();
        let ids: Vec<_> = page.edges.iter().map(|e| e.node["id"].clone()).collect();
        assert_eq!(ids, vec![json!("1"), json!("2")]);
    }

    #[tokio::test]
    async fn typed_filters_build_predicates_by_value_kind() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert("Post", json!({"id": "1", "status": "draft", "deletedAt": null}))
            .await;
        store
            .insert("Post", json!({"id": "2", "status": "published", "deletedAt": "2026-01-01"}))
            .await;
        store
            .insert("Post", json!({"id": "3", "status": "archived"}))
            .await;
        let paginator = paginator(store);
        let config = ConnectionConfig::new("allPosts", "Post")
            .typed_filter("status")
            .typed_filter("deletedAt");

        let page = paginator
            .paginate(
                &config,
                &PaginationRequest {
                    first: Some(10),
                    filters: Some(json!({
                        "status": ["draft", "archived"],
                        "deletedAt": null,
                        "unconfigured": "ignored",
                    })),
                    ..request()
                },
                None,
            )
            .await
            .unwrap();
        let ids: Vec<_> = page.edges.iter().map(|e| e.node["id"].clone()).collect();
        assert_eq!(ids, vec![json!("1"), json!("3")]);
    }

    struct StatusFilter;

    impl Filter for StatusFilter {
        fn apply(
            &self,
            _ctx: &FilterContext,
            query: &mut NodeQuery,
            value: &Value,
        ) -> Result<(), ResolutionError> {
            query.filter(Predicate::Eq {
                field: "status".to_string(),
                value: value.clone(),
            });
            Ok(())
        }
    }

    #[tokio::test]
    async fn where_filters_dispatch_by_name() {
        let store = Arc::new(MemoryStore::new());
        store.insert("Post", json!({"id": "1", "status": "draft"})).await;
        store
            .insert("Post", json!({"id": "2", "status": "published"}))
            .await;
        let paginator = paginator(store);
        let config = ConnectionConfig::new("allPosts", "Post").filter("status", StatusFilter);

        let page = paginator
            .paginate(
                &config,
                &PaginationRequest {
                    first: Some(10),
                    where_clause: Some(json!({"status": "draft"})),
                    ..request()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(page.edges.len(), 1);
        assert_eq!(page.edges[0].node["id"], json!("1"));

        let err = paginator
            .paginate(
                &config,
                &PaginationRequest {
                    first: Some(10),
                    where_clause: Some(json!({"missing": true})),
                    ..request()
                },
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ResolutionError::UnknownFilter {
                filter: "missing".to_string(),
                connection: "allPosts".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn parent_scoping_by_equality_and_membership() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert("Comment", json!({"id": "c1", "post": "p1"}))
            .await;
        store
            .insert("Comment", json!({"id": "c2", "post": "p2"}))
            .await;
        store
            .insert("Group", json!({"id": "g1", "members": ["u1", "u2"]}))
            .await;
        store
            .insert("Group", json!({"id": "g2", "members": ["u3"]}))
            .await;
        let paginator = paginator(store);

        let comments = ConnectionConfig::new("comments", "Comment")
            .parent("post", ParentRelation::Equals);
        let page = paginator
            .paginate(
                &comments,
                &PaginationRequest {
                    first: Some(10),
                    ..request()
                },
                Some(&json!({"id": "p1"})),
            )
            .await
            .unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.edges[0].node["id"], json!("c1"));

        let groups = ConnectionConfig::new("groups", "Group")
            .parent("members", ParentRelation::Member);
        let page = paginator
            .paginate(
                &groups,
                &PaginationRequest {
                    first: Some(10),
                    ..request()
                },
                Some(&json!({"id": "u2"})),
            )
            .await
            .unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.edges[0].node["id"], json!("g1"));

        // Nested connection without a configured relation field.
        let broken = ConnectionConfig::new("comments", "Comment");
        let err = paginator
            .paginate(
                &broken,
                &PaginationRequest {
                    first: Some(10),
                    ..request()
                },
                Some(&json!({"id": "p1"})),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ResolutionError::MissingParentRelation {
                connection: "comments".to_string()
            }
        );
    }

    #[tokio::test]
    async fn malformed_cursors_are_rejected() {
        let paginator = paginator(seeded_store(3).await);
        let config = ConnectionConfig::new("allPosts", "Post");
        let err = paginator
            .paginate(
                &config,
                &PaginationRequest {
                    first: Some(2),
                    after: Some("!!garbage!!".to_string()),
                    ..request()
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::InvalidArgument { ref argument, .. } if argument == "after"
        ));
    }
}
