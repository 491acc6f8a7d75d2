//! End-to-end tests for the resource-search entry point: native plus
//! virtual-column filtering with identifier-set intersection.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use query::{PropertySet, QueryResources, Value};
use query_test_utils::{MemoryHost, test_resource};
use serde_json::json;

fn props(entries: &[(&str, &str)]) -> PropertySet {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(*v)))
        .collect()
}

/// Three resources; 1 and 2 published. Virtual columns: `city` and `state`.
/// Boston rows are 1 (published) and 3 (unpublished).
fn seeded_host() -> MemoryHost {
    MemoryHost::builder()
        .resources(vec![
            test_resource(1, "Alpha").with_description("First"),
            test_resource(2, "Beta").with_description("Second"),
            test_resource(3, "Gamma").unpublished(),
        ])
        .attributes(
            &[("city", 1), ("state", 2)],
            &[
                (1, 1, "Boston"),
                (2, 1, "Chicago"),
                (3, 1, "Boston"),
                (1, 2, "MA"),
                (2, 2, "IL"),
            ],
        )
        .build()
}

#[tokio::test]
async fn native_and_virtual_filters_intersect() {
    let host = seeded_host();
    let invocation = QueryResources::new()
        .invoke(
            &host,
            props(&[("published", "1"), ("city", "Boston"), ("_tpl", "[[+id]];")]),
        )
        .await;

    // published ∩ Boston = {1, 2} ∩ {1, 3} = {1}
    assert_eq!(invocation.output, "1;");
}

#[tokio::test]
async fn single_filter_type_stands_alone() {
    let host = seeded_host();

    let virtual_only = QueryResources::new()
        .invoke(
            &host,
            props(&[("city", "Boston"), ("_sortby", "id"), ("_tpl", "[[+id]];")]),
        )
        .await;
    assert_eq!(virtual_only.output, "1;3;");

    let native_only = QueryResources::new()
        .invoke(
            &host,
            props(&[("published", "1"), ("_sortby", "id"), ("_tpl", "[[+id]];")]),
        )
        .await;
    assert_eq!(native_only.output, "1;2;");
}

#[tokio::test]
async fn no_filters_means_all_records() {
    let host = seeded_host();
    let invocation = QueryResources::new()
        .invoke(&host, props(&[("_sortby", "id"), ("_tpl", "[[+id]];")]))
        .await;
    assert_eq!(invocation.output, "1;2;3;");
}

#[tokio::test]
async fn empty_intersection_yields_zero_records_not_an_error() {
    let host = seeded_host();
    let invocation = QueryResources::new()
        .invoke(
            &host,
            props(&[("city", "Springfield"), ("_tpl", "[[+id]];")]),
        )
        .await;
    assert_eq!(invocation.output, "");
    assert_eq!(invocation.page_count, 1);
}

#[tokio::test]
async fn virtual_filters_support_operators() {
    let host = seeded_host();
    let invocation = QueryResources::new()
        .invoke(
            &host,
            props(&[("city:LIKE", "Bos"), ("_sortby", "id"), ("_tpl", "[[+id]];")]),
        )
        .await;
    assert_eq!(invocation.output, "1;3;");
}

#[tokio::test]
async fn blank_virtual_values_restrict_nothing() {
    // An empty search-form field arrives as an empty string.
    let host = seeded_host();
    let invocation = QueryResources::new()
        .invoke(
            &host,
            props(&[
                ("published", "1"),
                ("city", ""),
                ("_sortby", "id"),
                ("_tpl", "[[+id]];"),
            ]),
        )
        .await;
    assert_eq!(invocation.output, "1;2;");
}

#[tokio::test]
async fn select_star_merges_all_attributes() {
    let host = seeded_host();
    let invocation = QueryResources::new()
        .invoke(
            &host,
            props(&[("published", "1"), ("_sortby", "id"), ("_view", "json")]),
        )
        .await;

    let rows: serde_json::Value = serde_json::from_str(&invocation.output).unwrap();
    assert_eq!(rows[0]["pagetitle"], json!("Alpha"));
    assert_eq!(rows[0]["city"], json!("Boston"));
    assert_eq!(rows[0]["state"], json!("MA"));
    assert_eq!(rows[1]["city"], json!("Chicago"));
}

#[tokio::test]
async fn rename_map_rewrites_output_keys() {
    let host = seeded_host();
    let invocation = QueryResources::new()
        .invoke(
            &host,
            props(&[
                ("city", "Boston"),
                ("_sortby", "id"),
                ("_select", "pagetitle,description"),
                ("_rename", r#"{"pagetitle":"title","description":"desc"}"#),
                ("_view", "json"),
            ]),
        )
        .await;

    let rows: serde_json::Value = serde_json::from_str(&invocation.output).unwrap();
    assert_eq!(rows[0]["title"], json!("Alpha"));
    assert_eq!(rows[0]["desc"], json!("First"));
    assert!(rows[0].get("pagetitle").is_none());
    assert!(rows[0].get("description").is_none());
}

#[tokio::test]
async fn projection_keeps_id_internal_but_strips_it_from_output() {
    let host = seeded_host();
    let invocation = QueryResources::new()
        .invoke(
            &host,
            props(&[
                ("city", "Boston"),
                ("_sortby", "id"),
                ("_select", "pagetitle,city"),
                ("_view", "json"),
            ]),
        )
        .await;

    let rows: serde_json::Value = serde_json::from_str(&invocation.output).unwrap();
    // The virtual merge joined on the identifier, but it was not requested.
    assert!(rows[0].get("id").is_none());
    assert_eq!(rows[0]["pagetitle"], json!("Alpha"));
    assert_eq!(rows[0]["city"], json!("Boston"));
    assert_eq!(rows[1]["pagetitle"], json!("Gamma"));

    let explicit = QueryResources::new()
        .invoke(
            &host,
            props(&[
                ("city", "Boston"),
                ("_sortby", "id"),
                ("_select", "id,pagetitle"),
                ("_view", "json"),
            ]),
        )
        .await;
    let rows: serde_json::Value = serde_json::from_str(&explicit.output).unwrap();
    assert_eq!(rows[0]["id"], json!(1));
}

#[tokio::test]
async fn sort_limit_and_pagination_apply_to_the_final_fetch() {
    let host = seeded_host();
    let invocation = QueryResources::new()
        .invoke(
            &host,
            props(&[
                ("published", "1"),
                ("_sortby", "pagetitle"),
                ("_sortdir", "DESC"),
                ("_limit", "1"),
                ("_tpl", "[[+pagetitle]]"),
            ]),
        )
        .await;

    assert_eq!(invocation.output, "Beta");
    assert_eq!(invocation.page_count, 2);
    assert!(invocation.pagination_links.contains("Page 1 of 2"));
}

#[tokio::test]
async fn unknown_attribute_surfaces_a_diagnostic() {
    let host = seeded_host();
    let invocation = QueryResources::new()
        .invoke(&host, props(&[("zipcode", "02134")]))
        .await;
    assert!(invocation.output.contains("attribute not found: zipcode"));
}

#[tokio::test]
async fn debug_dump_reports_filters_and_matching_ids() {
    let host = seeded_host();
    let invocation = QueryResources::new()
        .invoke(
            &host,
            props(&[("published", "1"), ("city", "Boston"), ("_debug", "1")]),
        )
        .await;

    assert!(invocation.output.starts_with("QueryResources debug"));
    assert!(invocation.output.contains("Primary filters"));
    assert!(invocation.output.contains("Virtual filters"));
    assert!(invocation.output.contains("Matching resource ids"));
    assert!(invocation.output.contains('1'));
}

#[tokio::test]
async fn flush_invalidates_the_attribute_lookup() {
    let host = seeded_host();
    let snippet = QueryResources::new();

    let first = snippet
        .invoke(&host, props(&[("city", "Boston"), ("_tpl", "[[+id]];")]))
        .await;
    assert!(!first.output.is_empty());
    assert_eq!(snippet.lookup().id_of("city"), Some(1));

    snippet.flush(&host).await;
    assert_eq!(snippet.lookup().id_of("city"), None);

    // The lookup reloads lazily on the next invocation.
    let second = snippet
        .invoke(&host, props(&[("city", "Boston"), ("_tpl", "[[+id]];")]))
        .await;
    assert!(!second.from_cache);
    assert_eq!(snippet.lookup().id_of("city"), Some(1));
}
