//! Host capability traits.
//!
//! The extension core never touches the CMS directly; every outward call
//! goes through one of these traits. The host wires concrete services into
//! a [`Host`] aggregate and hands it to the entry points.

pub mod cache;
pub mod render;
pub mod request;
pub mod store;

use std::sync::Arc;

pub use cache::CacheBackend;
pub use render::{ChunkRenderer, LinkBuilder, ViewRenderer};
pub use request::RequestInput;
pub use store::{CollectionQuery, CollectionStore, PackageLoader, RawRows, TransformRunner};

/// The full set of host capabilities for one deployment.
#[derive(Clone)]
pub struct Host {
    pub store: Arc<dyn CollectionStore>,
    pub request: Arc<dyn RequestInput>,
    pub cache: Arc<dyn CacheBackend>,
    pub chunks: Arc<dyn ChunkRenderer>,
    pub views: Arc<dyn ViewRenderer>,
    pub links: Arc<dyn LinkBuilder>,
    pub transforms: Arc<dyn TransformRunner>,
    pub packages: Arc<dyn PackageLoader>,
}
