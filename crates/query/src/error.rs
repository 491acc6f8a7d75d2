//! Extension error types.

use thiserror::Error;

/// Errors raised while compiling or executing a query invocation.
///
/// Configuration errors (unresolvable names) fail the invocation fast; the
/// entry points convert every variant into a diagnostic output string so the
/// caller always receives renderable text.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("attribute not found: {0}")]
    AttributeNotFound(String),

    #[error("the view '{0}' does not exist")]
    ViewNotFound(String),

    #[error("package not found: {0}")]
    PackageNotFound(String),

    #[error("invalid property '{key}': {reason}")]
    InvalidProperty { key: String, reason: String },

    #[error("store error")]
    Store(#[source] anyhow::Error),

    #[error("render error")]
    Render(#[source] anyhow::Error),

    #[error(transparent)]
    Host(#[from] anyhow::Error),
}

/// Result type alias using QueryError.
pub type QueryResult<T> = Result<T, QueryError>;
