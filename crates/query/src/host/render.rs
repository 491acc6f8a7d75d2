//! Template, view, and pagination-link rendering capabilities.

use async_trait::async_trait;

use crate::error::QueryResult;
use crate::normalize::Record;
use crate::pagination::{PaginationState, PaginationStyle};

/// Chunk (reusable template) rendering.
#[async_trait]
pub trait ChunkRenderer: Send + Sync {
    /// Whether a reusable template exists under this name. Decides the
    /// named-vs-inline resolution for `_tpl`/`_tplOuter`.
    async fn exists(&self, name: &str) -> bool;

    /// Render the named template with the given bindings.
    async fn render_named(&self, name: &str, vars: &Record) -> QueryResult<String>;

    /// Treat `template` itself as an inline formatting string.
    async fn render_inline(&self, template: &str, vars: &Record) -> QueryResult<String>;
}

/// Named view fallback used when no explicit templates are set.
#[async_trait]
pub trait ViewRenderer: Send + Sync {
    /// Render the full result set through the named view. Unknown names
    /// must produce [`QueryError::ViewNotFound`].
    ///
    /// [`QueryError::ViewNotFound`]: crate::error::QueryError::ViewNotFound
    async fn render_view(
        &self,
        name: &str,
        rows: &[Record],
        pagination: &PaginationState,
    ) -> QueryResult<String>;
}

/// Builds the styled pagination link structure. Opaque to the pipeline.
pub trait LinkBuilder: Send + Sync {
    fn links(
        &self,
        base_url: &str,
        record_count: u64,
        offset: u64,
        limit: u64,
        style: &PaginationStyle,
    ) -> String;
}
