//! Namespacing pass for top-level operations.
//!
//! Operations tagged with a `namespace` metadata entry are regrouped as
//! fields of a synthetic container type, one per namespace key. Container
//! types are created lazily and reused, and are named with configurable
//! suffixes. Untagged operations stay at the top level. Namespaced
//! operations have the redundant node-name suffix (singular or pluralized)
//! stripped from their names.

use crate::definition::{
    FieldDefinition, ObjectDefinition, OperationDefinition, OperationKind, TypeDefinition,
};
use crate::endpoint::Endpoint;
use indexmap::IndexMap;
use serde_json::Value;

/// Resolver name for synthetic namespace roots; resolves to an empty object.
pub const EMPTY_OBJECT_RESOLVER: &str = "empty_object";

/// Configuration for the namespacing pass.
#[derive(Debug, Clone)]
pub struct NamespaceConfig {
    pub enabled: bool,
    /// Suffix for query container type names.
    pub query_suffix: String,
    /// Suffix for mutation container type names.
    pub mutation_suffix: String,
    /// Namespace keys left at the top level.
    pub ignore: Vec<String>,
    /// Namespace key renames, applied before grouping.
    pub aliases: IndexMap<String, String>,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            query_suffix: "Query".to_string(),
            mutation_suffix: "Mutation".to_string(),
            ignore: Vec::new(),
            aliases: IndexMap::new(),
        }
    }
}

/// Regroups namespaced operations under container types.
#[derive(Debug, Default)]
pub struct NamespacePass {
    config: NamespaceConfig,
}

impl NamespacePass {
    /// Creates a pass with the given configuration.
    pub fn new(config: NamespaceConfig) -> Self {
        Self { config }
    }

    /// Applies the pass to both operation maps of the endpoint.
    pub fn apply(&self, endpoint: &mut Endpoint) {
        if !self.config.enabled {
            return;
        }
        let queries = self.regroup(endpoint.queries().clone(), OperationKind::Query, endpoint);
        endpoint.set_queries(queries);
        let mutations = self.regroup(
            endpoint.mutations().clone(),
            OperationKind::Mutation,
            endpoint,
        );
        endpoint.set_mutations(mutations);
    }

    fn regroup(
        &self,
        operations: IndexMap<String, OperationDefinition>,
        kind: OperationKind,
        endpoint: &mut Endpoint,
    ) -> IndexMap<String, OperationDefinition> {
        let mut result: IndexMap<String, OperationDefinition> = IndexMap::new();

        for (_, mut operation) in operations {
            let Some(node) = self.namespace_key(&operation, endpoint) else {
                result.insert(operation.name.clone(), operation);
                continue;
            };

            let suffix = match kind {
                OperationKind::Query => &self.config.query_suffix,
                OperationKind::Mutation => &self.config.mutation_suffix,
            };
            let container_name = format!("{}{}", ucfirst(&node), suffix);
            if !endpoint.has_type(&container_name) {
                endpoint.add_type(TypeDefinition::Object(ObjectDefinition::new(
                    container_name.clone(),
                )));
            }

            strip_node_suffix(&mut operation.name, &node);

            let field = container_field(&operation);
            if let Some(container) = endpoint.get_type_mut(&container_name) {
                container.add_field(field);
            }

            let root_name = pluralize(&lcfirst(&node));
            result.entry(root_name.clone()).or_insert_with(|| {
                let mut root = OperationDefinition::new(root_name, kind, container_name);
                root.resolver = Some(EMPTY_OBJECT_RESOLVER.to_string());
                root
            });
        }

        result
    }

    /// Extracts the namespace key, honoring aliases and the ignore list.
    fn namespace_key(&self, operation: &OperationDefinition, endpoint: &Endpoint) -> Option<String> {
        let meta = operation.meta("namespace")?;
        let mut node = match meta {
            Value::String(node) => node.clone(),
            Value::Object(map) => map.get("node")?.as_str()?.to_string(),
            _ => return None,
        };
        // A namespace may be tagged with the bound class rather than the
        // type name.
        if let Some(type_name) = endpoint.type_for_class(&node) {
            node = type_name.to_string();
        }
        if let Some(alias) = self.config.aliases.get(&node) {
            node = alias.clone();
        }
        if self.config.ignore.contains(&node) {
            return None;
        }
        Some(node)
    }
}

/// Builds the container field carrying a namespaced operation.
fn container_field(operation: &OperationDefinition) -> FieldDefinition {
    let mut field = FieldDefinition::new(operation.name.clone(), operation.type_name.clone());
    field.list = operation.list;
    field.resolver = operation.resolver.clone();
    field.arguments = operation.arguments.clone();
    field.roles = operation.roles.clone();
    field.complexity = operation.complexity;
    field.description = operation.description.clone();
    field.deprecation_reason = operation.deprecation_reason.clone();
    field.metadata = operation.metadata.clone();
    field
}

/// Strips the redundant node suffix, pluralized or singular, from a name.
fn strip_node_suffix(name: &mut String, node: &str) {
    let node = ucfirst(node);
    for suffix in [pluralize(&node), node] {
        if name.len() > suffix.len() {
            if let Some(stripped) = name.strip_suffix(suffix.as_str()) {
                *name = stripped.to_string();
                return;
            }
        }
    }
}

fn ucfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn lcfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Naive English pluralization, enough for type-name suffixes.
fn pluralize(s: &str) -> String {
    if let Some(stem) = s.strip_suffix('y') {
        let vowel_before = stem
            .chars()
            .last()
            .map(|c| "aeiouAEIOU".contains(c))
            .unwrap_or(false);
        if !vowel_before {
            return format!("{stem}ies");
        }
    }
    for suffix in ["s", "x", "z", "ch", "sh"] {
        if s.ends_with(suffix) {
            return format!("{s}es");
        }
    }
    format!("{s}s")
}
