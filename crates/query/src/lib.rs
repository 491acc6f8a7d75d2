//! Query: a collection-query extension for content management systems.
//!
//! Takes a flat set of string "script properties", decodes the embedded
//! mini-language of input modifiers (`sortby:get=title`) and comparison
//! operators (`price:GTE`), resolves values against request inputs, and runs
//! the compiled plan against a host-provided collection store. Results are
//! normalized, paginated, rendered through chunks or a named view, and the
//! rendered output is memoized until the host flushes the cache.
//!
//! Two entry points are provided: [`Query`] for arbitrary collections and
//! [`QueryResources`] for the primary resource collection with its
//! attribute-value sidecar table ("virtual columns").

pub mod cache;
pub mod error;
pub mod filter;
pub mod host;
pub mod memory;
pub mod modifier;
pub mod normalize;
pub mod pagination;
pub mod planner;
pub mod properties;
pub mod render;
pub mod resources;
pub mod snippet;

pub use error::{QueryError, QueryResult};
pub use host::Host;
pub use normalize::Record;
pub use properties::{ControlParams, PropertySet, Value};
pub use resources::AttributeLookup;
pub use snippet::{Invocation, Query, QueryResources};
