//! Collection store and related execution capabilities.

use async_trait::async_trait;

use crate::error::QueryResult;
use crate::filter::FilterSpec;
use crate::normalize::Record;
use crate::properties::{PackageSpec, Projection, SortDirection, Value};

/// One filtered, sorted, paginated read against a named collection.
///
/// This is the normalized plan the compiler produces; the store translates
/// it into whatever its engine executes.
#[derive(Debug, Clone, Default)]
pub struct CollectionQuery {
    pub select: Projection,
    pub filters: FilterSpec,
    /// `None` means unlimited.
    pub limit: Option<u64>,
    pub offset: u64,
    pub sort: Option<(String, SortDirection)>,
}

impl CollectionQuery {
    pub fn filtered(filters: FilterSpec) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }
}

/// Result of a raw-SQL execution.
#[derive(Debug, Clone, Default)]
pub struct RawRows {
    pub rows: Vec<Record>,
    /// Total matched rows irrespective of any LIMIT in the statement.
    pub matched: u64,
}

/// Generic read access to named collections.
///
/// Unknown collection names must produce [`QueryError::CollectionNotFound`]
/// rather than an empty result.
///
/// [`QueryError::CollectionNotFound`]: crate::error::QueryError::CollectionNotFound
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Native column names of a collection, in schema order.
    async fn fields(&self, collection: &str) -> QueryResult<Vec<String>>;

    /// Count the records matching `filters`, ignoring limit/offset.
    async fn count(&self, collection: &str, filters: &FilterSpec) -> QueryResult<u64>;

    /// Execute a plain read.
    async fn select(&self, collection: &str, query: &CollectionQuery) -> QueryResult<Vec<Record>>;

    /// Execute a graph-aware read: records carry their related objects as
    /// nested values, shaped by the host's traversal spec.
    async fn select_graph(
        &self,
        collection: &str,
        graph: &str,
        query: &CollectionQuery,
    ) -> QueryResult<Vec<Record>>;

    /// Execute a raw SQL statement, returning rows plus the exact matched
    /// row count irrespective of limit.
    async fn query_raw(&self, sql: &str) -> QueryResult<RawRows>;
}

/// User-defined value modifiers (named transforms).
#[async_trait]
pub trait TransformRunner: Send + Sync {
    /// Run the named transform with `{input, options}` and return its value.
    async fn run(&self, name: &str, input: &str, options: &str) -> anyhow::Result<Value>;
}

/// Extends which collections are resolvable (`_pkg`).
#[async_trait]
pub trait PackageLoader: Send + Sync {
    async fn add_package(&self, spec: &PackageSpec) -> QueryResult<()>;
}
