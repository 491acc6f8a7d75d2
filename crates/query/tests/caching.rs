//! Result-cache behavior: hits short-circuit the pipeline, fingerprints
//! track request inputs, and the flush hook clears everything.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use query::memory::MemoryCache;
use query::{PropertySet, Query, QueryResources, Value};
use query_test_utils::{MemoryHost, test_resource};

fn props(entries: &[(&str, &str)]) -> PropertySet {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(*v)))
        .collect()
}

fn seeded_builder() -> query_test_utils::MemoryHostBuilder {
    MemoryHost::builder()
        .resources(vec![
            test_resource(1, "Alpha"),
            test_resource(2, "Beta"),
            test_resource(3, "Gamma").unpublished(),
        ])
        .attributes(&[("city", 1)], &[(1, 1, "Boston"), (2, 1, "Chicago")])
}

#[tokio::test]
async fn second_identical_invocation_is_served_from_cache() {
    let host = seeded_builder().build();
    let snippet = Query::new();
    let call = props(&[("published", "1"), ("_sortby", "id"), ("_tpl", "[[+id]];")]);

    let first = snippet.invoke(&host, call.clone()).await;
    assert!(!first.from_cache);
    let reads_after_first = host.select_calls();

    let second = snippet.invoke(&host, call).await;
    assert!(second.from_cache);
    assert_eq!(second.output, first.output);
    assert_eq!(second.page_count, first.page_count);
    assert_eq!(second.pagination_links, first.pagination_links);
    // The query layer was not touched again.
    assert_eq!(host.select_calls(), reads_after_first);
}

#[tokio::test]
async fn resource_variant_caches_too() {
    let host = seeded_builder().build();
    let snippet = QueryResources::new();
    let call = props(&[("city", "Boston"), ("_tpl", "[[+id]];")]);

    let first = snippet.invoke(&host, call.clone()).await;
    assert!(!first.from_cache);
    let second = snippet.invoke(&host, call).await;
    assert!(second.from_cache);
    assert_eq!(second.output, first.output);
}

#[tokio::test]
async fn differing_request_params_miss_the_cache() {
    // Same properties, same shared cache, different request inputs: the
    // fingerprint must differ even when no modifier reads the parameter.
    let cache = Arc::new(MemoryCache::new());
    let call = props(&[("published", "1"), ("_tpl", "[[+id]];")]);

    let first_request = seeded_builder().shared_cache(cache.clone()).build();
    let snippet = Query::new();
    let first = snippet.invoke(&first_request, call.clone()).await;
    assert!(!first.from_cache);

    let same_request = seeded_builder().shared_cache(cache.clone()).build();
    let hit = snippet.invoke(&same_request, call.clone()).await;
    assert!(hit.from_cache);

    let noisy_request = seeded_builder()
        .shared_cache(cache)
        .query_param("utm_source", "newsletter")
        .build();
    let miss = snippet.invoke(&noisy_request, call).await;
    assert!(!miss.from_cache);
}

#[tokio::test]
async fn entry_points_never_share_entries() {
    let cache = Arc::new(MemoryCache::new());
    let call = props(&[("published", "1"), ("_tpl", "[[+id]];")]);

    let host = seeded_builder().shared_cache(cache.clone()).build();
    let generic = Query::new().invoke(&host, call.clone()).await;
    assert!(!generic.from_cache);

    let host = seeded_builder().shared_cache(cache).build();
    let resources = QueryResources::new().invoke(&host, call).await;
    assert!(!resources.from_cache);
}

#[tokio::test]
async fn flush_forces_a_recompute() {
    let host = seeded_builder().build();
    let snippet = Query::new();
    let call = props(&[("published", "1"), ("_tpl", "[[+id]];")]);

    snippet.invoke(&host, call.clone()).await;
    assert!(snippet.invoke(&host, call.clone()).await.from_cache);

    snippet.flush(&host).await;
    assert!(!snippet.invoke(&host, call).await.from_cache);
}

#[tokio::test]
async fn debug_invocations_are_never_cached() {
    let host = seeded_builder().build();
    let snippet = Query::new();
    let call = props(&[("published", "1"), ("_debug", "1")]);

    let first = snippet.invoke(&host, call.clone()).await;
    assert!(first.output.starts_with("Query debug"));
    let second = snippet.invoke(&host, call).await;
    assert!(!second.from_cache);
}

#[tokio::test]
async fn empty_result_sets_are_not_cached() {
    let host = seeded_builder().build();
    let snippet = Query::new();
    let call = props(&[("pagetitle", "No Such"), ("_tpl", "[[+id]]")]);

    let first = snippet.invoke(&host, call.clone()).await;
    assert_eq!(first.output, "");
    let second = snippet.invoke(&host, call).await;
    assert!(!second.from_cache);
}
