//! Request-scoped input access.

use indexmap::IndexMap;

use crate::properties::Value;

/// Read access to the current request's query and body parameter maps.
///
/// The full maps feed the result-cache fingerprint: resolved values can
/// change even when the property set itself is static.
pub trait RequestInput: Send + Sync {
    fn query_param(&self, name: &str) -> Option<Value>;

    fn body_param(&self, name: &str) -> Option<Value>;

    fn query_map(&self) -> IndexMap<String, Value>;

    fn body_map(&self) -> IndexMap<String, Value>;

    /// Absolute URL of the current page, used as the pagination base.
    fn base_url(&self) -> String;
}
