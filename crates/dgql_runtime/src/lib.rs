//! Resolver execution engine for dgql.
//!
//! This crate runs compiled schemas:
//! - `resolver`: the resolver trait, the validated registry and built-ins
//! - `executor`: request-scoped dispatch, argument normalization, guards
//! - `buffer`: the deferred load buffer batching related-node fetches
//! - `pagination`: cursor connections, search and the filter pipeline
//! - `store`: the persistence seam and its in-memory implementation
//! - `access`: the access-control seam

pub mod access;
pub mod buffer;
pub mod executor;
pub mod pagination;
pub mod resolver;
pub mod store;

pub use access::{AccessChecker, AccessSubject, RoleChecker};
pub use buffer::{Deferred, DeferredBuffer, PendingReference};
pub use executor::{Execution, FieldValue, ResolverExecutor};
pub use pagination::{
    Connection, ConnectionConfig, CursorPaginator, Edge, Filter, FilterContext, PageInfo,
    PaginationRequest, ParentRelation, DEFAULT_PAGE_LIMIT,
};
pub use resolver::{
    FnResolver, Resolver, ResolverArgs, ResolverContext, ResolverFuture, ResolverInfo,
    ResolverRegistry, ResolverResult,
};
pub use store::{
    Direction, EntityStore, MemoryStore, NodeQuery, Order, Predicate, value_at_path,
};
