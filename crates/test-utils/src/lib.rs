//! Query test utilities.
//!
//! An in-memory implementation of every host capability, plus fixture
//! builders, so the pipeline can be exercised end-to-end without a CMS.
//! Filter evaluation mirrors what a SQL engine would do with the compiled
//! predicates: equality with numeric awareness, `%` wildcard LIKE patterns,
//! list membership, and NULL checks.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use query::error::{QueryError, QueryResult};
use query::filter::{FilterEntry, FilterSpec, Operator};
use query::host::{
    CacheBackend, ChunkRenderer, CollectionQuery, CollectionStore, Host, LinkBuilder,
    PackageLoader, RawRows, RequestInput, TransformRunner, ViewRenderer,
};
use query::memory::MemoryCache;
use query::normalize::{self, Record};
use query::pagination::{PaginationState, PaginationStyle};
use query::properties::{PackageSpec, Projection, SortDirection, Value};

/// Build a record from literal pairs.
pub fn record(pairs: &[(&str, JsonValue)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// The native column set used by resource fixtures.
pub fn resource_fields() -> Vec<String> {
    [
        "id",
        "pagetitle",
        "description",
        "published",
        "parent",
        "created",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

/// Fixture builder for resource records.
#[derive(Debug, Clone)]
pub struct TestResource {
    pub id: i64,
    pub pagetitle: String,
    pub description: String,
    pub published: i64,
    pub parent: Option<i64>,
    pub created: i64,
}

/// Create a resource fixture with default values.
pub fn test_resource(id: i64, pagetitle: &str) -> TestResource {
    TestResource {
        id,
        pagetitle: pagetitle.to_string(),
        description: String::new(),
        published: 1,
        parent: None,
        created: 1_700_000_000 + id,
    }
}

impl TestResource {
    pub fn unpublished(mut self) -> Self {
        self.published = 0;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_parent(mut self, parent: i64) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_created(mut self, created: i64) -> Self {
        self.created = created;
        self
    }

    pub fn into_record(self) -> Record {
        record(&[
            ("id", JsonValue::from(self.id)),
            ("pagetitle", JsonValue::from(self.pagetitle)),
            ("description", JsonValue::from(self.description)),
            ("published", JsonValue::from(self.published)),
            (
                "parent",
                self.parent.map(JsonValue::from).unwrap_or(JsonValue::Null),
            ),
            ("created", JsonValue::from(self.created)),
        ])
    }
}

struct Collection {
    fields: Vec<String>,
    rows: Vec<Record>,
}

/// In-memory collection store with call counters.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Collection>>,
    raw_results: Mutex<Vec<(String, RawRows)>>,
    select_calls: AtomicUsize,
    raw_calls: AtomicUsize,
}

impl MemoryStore {
    fn insert_collection(&self, name: &str, fields: Vec<String>, rows: Vec<Record>) {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.to_string(), Collection { fields, rows });
    }

    fn with_collection<T>(&self, name: &str, f: impl FnOnce(&Collection) -> T) -> QueryResult<T> {
        let collections = self
            .collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        collections
            .get(name)
            .map(f)
            .ok_or_else(|| QueryError::CollectionNotFound(name.to_string()))
    }

    /// Number of `select`/`select_graph` executions so far.
    pub fn select_calls(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }

    /// Number of raw SQL executions so far.
    pub fn raw_calls(&self) -> usize {
        self.raw_calls.load(Ordering::SeqCst)
    }

    fn run_query(&self, collection: &Collection, query: &CollectionQuery) -> Vec<Record> {
        let mut rows: Vec<Record> = collection
            .rows
            .iter()
            .filter(|row| matches_all(row, &query.filters))
            .cloned()
            .collect();

        if let Some((field, direction)) = &query.sort {
            rows.sort_by(|a, b| {
                let ordering = compare_values(
                    a.get(field).unwrap_or(&JsonValue::Null),
                    b.get(field).unwrap_or(&JsonValue::Null),
                );
                match direction {
                    SortDirection::Desc => ordering.reverse(),
                    _ => ordering,
                }
            });
        }

        let offset = query.offset as usize;
        let rows: Vec<Record> = match query.limit {
            Some(limit) => rows.into_iter().skip(offset).take(limit as usize).collect(),
            None if offset > 0 => rows.into_iter().skip(offset).collect(),
            None => rows,
        };

        match &query.select {
            Projection::All => rows,
            Projection::Columns(cols) => rows
                .iter()
                .map(|row| normalize::project(row, cols))
                .collect(),
        }
    }
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn fields(&self, collection: &str) -> QueryResult<Vec<String>> {
        self.with_collection(collection, |c| c.fields.clone())
    }

    async fn count(&self, collection: &str, filters: &FilterSpec) -> QueryResult<u64> {
        self.with_collection(collection, |c| {
            c.rows.iter().filter(|row| matches_all(row, filters)).count() as u64
        })
    }

    async fn select(&self, collection: &str, query: &CollectionQuery) -> QueryResult<Vec<Record>> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        self.with_collection(collection, |c| self.run_query(c, query))
    }

    async fn select_graph(
        &self,
        collection: &str,
        _graph: &str,
        query: &CollectionQuery,
    ) -> QueryResult<Vec<Record>> {
        // Fixture rows already carry their nested relations; a graph fetch
        // is a plain fetch with the projection left unrestricted.
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        let unrestricted = CollectionQuery {
            select: Projection::All,
            filters: query.filters.clone(),
            limit: query.limit,
            offset: query.offset,
            sort: query.sort.clone(),
        };
        self.with_collection(collection, |c| self.run_query(c, &unrestricted))
    }

    async fn query_raw(&self, sql: &str) -> QueryResult<RawRows> {
        self.raw_calls.fetch_add(1, Ordering::SeqCst);
        let registered = self
            .raw_results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        registered
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
            .map(|(_, rows)| rows.clone())
            .ok_or_else(|| QueryError::Store(anyhow::anyhow!("no registered result for: {sql}")))
    }
}

/// Evaluate the whole filter spec against a row.
pub fn matches_all(row: &Record, filters: &FilterSpec) -> bool {
    filters.iter().all(|entry| matches_entry(row, entry))
}

fn matches_entry(row: &Record, entry: &FilterEntry) -> bool {
    let field_value = row.get(&entry.field).unwrap_or(&JsonValue::Null);
    let is_null = field_value.is_null();
    let actual = normalize::value_to_string(field_value);

    match (&entry.operator, &entry.value) {
        (Operator::Eq, Value::Null) => is_null,
        (Operator::Ne, Value::Null) => !is_null,
        (Operator::Eq, expected) => !is_null && scalar_eq(&actual, &expected.display()),
        (Operator::Ne, expected) => !is_null && !scalar_eq(&actual, &expected.display()),
        (Operator::Gt, expected) => scalar_cmp(&actual, &expected.display()).is_gt(),
        (Operator::Gte, expected) => scalar_cmp(&actual, &expected.display()).is_ge(),
        (Operator::Lt, expected) => scalar_cmp(&actual, &expected.display()).is_lt(),
        (Operator::Lte, expected) => scalar_cmp(&actual, &expected.display()).is_le(),
        (Operator::Like, expected) => like_matches(&actual, &expected.display()),
        (Operator::NotLike, expected) => !like_matches(&actual, &expected.display()),
        (Operator::In, expected) => value_list(expected).iter().any(|v| scalar_eq(&actual, v)),
        (Operator::NotIn, expected) => !value_list(expected).iter().any(|v| scalar_eq(&actual, v)),
        (Operator::Raw(token), _) => {
            panic!("MemoryStore does not evaluate raw operator '{token}'")
        }
    }
}

fn value_list(value: &Value) -> Vec<String> {
    match value {
        Value::List(items) => items.clone(),
        Value::Scalar(s) => vec![s.clone()],
        Value::Null => Vec::new(),
    }
}

fn scalar_eq(a: &str, b: &str) -> bool {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

fn scalar_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.cmp(b),
    }
}

fn compare_values(a: &JsonValue, b: &JsonValue) -> std::cmp::Ordering {
    scalar_cmp(&normalize::value_to_string(a), &normalize::value_to_string(b))
}

/// SQL LIKE with `%` anchors, case-insensitive.
fn like_matches(actual: &str, pattern: &str) -> bool {
    let actual = actual.to_lowercase();
    let pattern = pattern.to_lowercase();
    let leading = pattern.starts_with('%');
    let trailing = pattern.ends_with('%');
    let core = pattern.trim_matches('%');
    match (leading, trailing) {
        (true, true) => actual.contains(core),
        (false, true) => actual.starts_with(core),
        (true, false) => actual.ends_with(core),
        (false, false) => actual == core,
    }
}

/// Static request input maps.
#[derive(Default)]
pub struct MemoryRequest {
    query: IndexMap<String, Value>,
    body: IndexMap<String, Value>,
    base_url: String,
}

impl RequestInput for MemoryRequest {
    fn query_param(&self, name: &str) -> Option<Value> {
        self.query.get(name).cloned()
    }

    fn body_param(&self, name: &str) -> Option<Value> {
        self.body.get(name).cloned()
    }

    fn query_map(&self) -> IndexMap<String, Value> {
        self.query.clone()
    }

    fn body_map(&self) -> IndexMap<String, Value> {
        self.body.clone()
    }

    fn base_url(&self) -> String {
        self.base_url.clone()
    }
}

/// Chunk renderer over a fixed template map. Inline templates substitute
/// `[[+field]]` placeholders.
#[derive(Default)]
pub struct MemoryChunks {
    chunks: HashMap<String, String>,
}

fn substitute(template: &str, vars: &Record) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("[[+{key}]]"), &normalize::value_to_string(value));
    }
    out
}

#[async_trait]
impl ChunkRenderer for MemoryChunks {
    async fn exists(&self, name: &str) -> bool {
        self.chunks.contains_key(name)
    }

    async fn render_named(&self, name: &str, vars: &Record) -> QueryResult<String> {
        let template = self
            .chunks
            .get(name)
            .ok_or_else(|| QueryError::Render(anyhow::anyhow!("unknown chunk: {name}")))?;
        Ok(substitute(template, vars))
    }

    async fn render_inline(&self, template: &str, vars: &Record) -> QueryResult<String> {
        Ok(substitute(template, vars))
    }
}

/// View renderer with two built-in views: `table` and `json`.
#[derive(Default)]
pub struct MemoryViews;

#[async_trait]
impl ViewRenderer for MemoryViews {
    async fn render_view(
        &self,
        name: &str,
        rows: &[Record],
        pagination: &PaginationState,
    ) -> QueryResult<String> {
        match name {
            "table" => {
                let mut out = String::new();
                for row in rows {
                    let line: Vec<String> = row
                        .iter()
                        .map(|(k, v)| format!("{k}={}", normalize::value_to_string(v)))
                        .collect();
                    out.push_str(&line.join("|"));
                    out.push('\n');
                }
                if pagination.is_paginated() {
                    out.push_str(&pagination.links);
                }
                Ok(out)
            }
            "json" => {
                serde_json::to_string(rows).map_err(|err| QueryError::Render(anyhow::anyhow!(err)))
            }
            other => Err(QueryError::ViewNotFound(other.to_string())),
        }
    }
}

/// Deterministic pagination links: the style's outer template with the page
/// list bound to the content slot.
#[derive(Default)]
pub struct MemoryLinks;

impl LinkBuilder for MemoryLinks {
    fn links(
        &self,
        base_url: &str,
        record_count: u64,
        offset: u64,
        limit: u64,
        style: &PaginationStyle,
    ) -> String {
        let page_count = record_count.div_ceil(limit.max(1));
        let current = offset / limit.max(1) + 1;
        let pages: Vec<String> = (1..=page_count)
            .map(|p| {
                if p == current {
                    format!("[{p}]")
                } else {
                    p.to_string()
                }
            })
            .collect();
        let first_record = offset + 1;
        let last_record = (offset + limit).min(record_count);
        style
            .outer_tpl
            .replace("[[+content]]", &pages.join(" "))
            .replace("[[+current_page]]", &current.to_string())
            .replace("[[+page_count]]", &page_count.to_string())
            .replace("[[+first_record]]", &first_record.to_string())
            .replace("[[+last_record]]", &last_record.to_string())
            .replace("[[+record_count]]", &record_count.to_string())
            .replace("[[+url]]", base_url)
    }
}

type TransformFn = Box<dyn Fn(&str, &str) -> Value + Send + Sync>;

/// Transform registry backed by plain closures.
#[derive(Default)]
pub struct MemoryTransforms {
    transforms: HashMap<String, TransformFn>,
}

#[async_trait]
impl TransformRunner for MemoryTransforms {
    async fn run(&self, name: &str, input: &str, options: &str) -> anyhow::Result<Value> {
        let transform = self
            .transforms
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("unknown transform: {name}"))?;
        Ok(transform(input, options))
    }
}

/// Records `add_package` calls.
#[derive(Default)]
pub struct MemoryPackages {
    loaded: Mutex<Vec<PackageSpec>>,
}

impl MemoryPackages {
    pub fn loaded(&self) -> Vec<PackageSpec> {
        self.loaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl PackageLoader for MemoryPackages {
    async fn add_package(&self, spec: &PackageSpec) -> QueryResult<()> {
        self.loaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(spec.clone());
        Ok(())
    }
}

/// The assembled in-memory host, dereferencing to [`Host`] for direct use
/// with the entry points. Typed accessors expose the call counters.
pub struct MemoryHost {
    inner: Host,
    mem_store: Arc<MemoryStore>,
    mem_packages: Arc<MemoryPackages>,
}

impl MemoryHost {
    pub fn builder() -> MemoryHostBuilder {
        MemoryHostBuilder::default()
    }

    /// Number of collection reads executed so far.
    pub fn select_calls(&self) -> usize {
        self.mem_store.select_calls()
    }

    /// Number of raw SQL executions so far.
    pub fn raw_calls(&self) -> usize {
        self.mem_store.raw_calls()
    }

    /// Packages registered through `_pkg`.
    pub fn loaded_packages(&self) -> Vec<PackageSpec> {
        self.mem_packages.loaded()
    }
}

impl std::ops::Deref for MemoryHost {
    type Target = Host;

    fn deref(&self) -> &Host {
        &self.inner
    }
}

/// Builder for [`MemoryHost`].
#[derive(Default)]
pub struct MemoryHostBuilder {
    store: MemoryStore,
    request: MemoryRequest,
    chunks: MemoryChunks,
    transforms: MemoryTransforms,
    cache: Option<Arc<dyn CacheBackend>>,
}

impl MemoryHostBuilder {
    /// Register a collection with its native field list and rows.
    pub fn collection(self, name: &str, fields: &[&str], rows: Vec<Record>) -> Self {
        self.store
            .insert_collection(name, fields.iter().map(ToString::to_string).collect(), rows);
        self
    }

    /// Register the standard resource collection from fixtures.
    pub fn resources(self, resources: Vec<TestResource>) -> Self {
        let fields = resource_fields();
        let rows = resources
            .into_iter()
            .map(TestResource::into_record)
            .collect();
        let fields_ref: Vec<&str> = fields.iter().map(String::as_str).collect();
        self.collection("resource", &fields_ref, rows)
    }

    /// Register attribute definitions (`(name, id)` pairs) and their values
    /// (`(resource_id, attribute_id, value)` triples).
    pub fn attributes(self, defs: &[(&str, i64)], values: &[(i64, i64, &str)]) -> Self {
        let def_rows = defs
            .iter()
            .map(|(name, id)| {
                record(&[
                    ("id", JsonValue::from(*id)),
                    ("name", JsonValue::from(*name)),
                ])
            })
            .collect();
        let value_rows = values
            .iter()
            .map(|(resource_id, attribute_id, value)| {
                record(&[
                    ("resource_id", JsonValue::from(*resource_id)),
                    ("attribute_id", JsonValue::from(*attribute_id)),
                    ("value", JsonValue::from(*value)),
                ])
            })
            .collect();
        self.collection("attribute", &["id", "name"], def_rows)
            .collection(
                "attribute_value",
                &["resource_id", "attribute_id", "value"],
                value_rows,
            )
    }

    /// Register a canned raw-SQL result, matched by statement prefix.
    pub fn raw_sql(self, prefix: &str, rows: RawRows) -> Self {
        self.store
            .raw_results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((prefix.to_string(), rows));
        self
    }

    pub fn query_param(mut self, name: &str, value: &str) -> Self {
        self.request
            .query
            .insert(name.to_string(), Value::from(value));
        self
    }

    pub fn body_param(mut self, name: &str, value: &str) -> Self {
        self.request
            .body
            .insert(name.to_string(), Value::from(value));
        self
    }

    pub fn base_url(mut self, url: &str) -> Self {
        self.request.base_url = url.to_string();
        self
    }

    /// Register a named reusable chunk template.
    pub fn chunk(mut self, name: &str, template: &str) -> Self {
        self.chunks
            .chunks
            .insert(name.to_string(), template.to_string());
        self
    }

    /// Share a cache backend between hosts, to model successive requests
    /// with differing inputs hitting the same cache.
    pub fn shared_cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Register a user-defined value transform.
    pub fn transform(
        mut self,
        name: &str,
        f: impl Fn(&str, &str) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.transforms
            .transforms
            .insert(name.to_string(), Box::new(f));
        self
    }

    pub fn build(self) -> MemoryHost {
        let mem_store = Arc::new(self.store);
        let mem_packages = Arc::new(MemoryPackages::default());
        let mut request = self.request;
        if request.base_url.is_empty() {
            request.base_url = "https://example.com/search".to_string();
        }

        let inner = Host {
            store: mem_store.clone(),
            request: Arc::new(request),
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(MemoryCache::new())),
            chunks: Arc::new(self.chunks),
            views: Arc::new(MemoryViews),
            links: Arc::new(MemoryLinks),
            transforms: Arc::new(self.transforms),
            packages: mem_packages.clone(),
        };

        MemoryHost {
            inner,
            mem_store,
            mem_packages,
        }
    }
}
