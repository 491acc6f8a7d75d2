//! Entry points.
//!
//! [`Query`] reads any named collection; [`QueryResources`] searches the
//! primary resource collection with virtual-column support. Both take the
//! flat property set and a [`Host`], and always return renderable text;
//! errors are converted into a diagnostic output string rather than
//! propagated.

use std::sync::Arc;

use crate::cache::{CacheEntry, ResultCache, fingerprint};
use crate::error::QueryResult;
use crate::filter;
use crate::host::Host;
use crate::normalize;
use crate::pagination::{self, StyleRegistry};
use crate::planner;
use crate::properties::{self, Classified, ControlParams, PropertySet, Verbosity};
use crate::render;
use crate::resources::{self, AttributeLookup, RESOURCE_COLLECTION};

/// The result of one invocation: the rendered output plus the secondary
/// bindings a caller may surface separately.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub output: String,
    pub page_count: u64,
    pub pagination_links: String,
    /// `query.<field>` bindings plus `page_count`, `results`, and
    /// `pagination_links`.
    pub placeholders: Vec<(String, String)>,
    pub from_cache: bool,
}

impl Invocation {
    fn from_cache_entry(entry: CacheEntry) -> Self {
        let placeholders = standard_placeholders(
            entry.page_count,
            &entry.rendered,
            &entry.pagination_links,
            Vec::new(),
        );
        Self {
            output: entry.rendered,
            page_count: entry.page_count,
            pagination_links: entry.pagination_links,
            placeholders,
            from_cache: true,
        }
    }

    fn empty(placeholders: Vec<(String, String)>) -> Self {
        Self {
            output: String::new(),
            page_count: 1,
            pagination_links: String::new(),
            placeholders,
            from_cache: false,
        }
    }

    fn diagnostic(output: String, placeholders: Vec<(String, String)>) -> Self {
        Self {
            output,
            page_count: 0,
            pagination_links: String::new(),
            placeholders,
            from_cache: false,
        }
    }
}

fn standard_placeholders(
    page_count: u64,
    results: &str,
    links: &str,
    mut placeholders: Vec<(String, String)>,
) -> Vec<(String, String)> {
    placeholders.push(("page_count".to_string(), page_count.to_string()));
    placeholders.push(("results".to_string(), results.to_string()));
    placeholders.push(("pagination_links".to_string(), links.to_string()));
    placeholders
}

/// Generic collection query.
pub struct Query {
    styles: StyleRegistry,
    cache_ttl: u64,
}

impl Query {
    pub fn new() -> Self {
        Self {
            styles: StyleRegistry::new(),
            cache_ttl: 0,
        }
    }

    /// Cache lifetime in seconds; 0 (the default) caches until flushed.
    pub fn with_cache_ttl(mut self, ttl_secs: u64) -> Self {
        self.cache_ttl = ttl_secs;
        self
    }

    /// Named pagination styles for `_config`/`_style`.
    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    /// Run one invocation. Never fails: errors become diagnostic output.
    pub async fn invoke(&self, host: &Host, properties: PropertySet) -> Invocation {
        match self.run(host, &properties).await {
            Ok(invocation) => invocation,
            Err(err) => {
                tracing::error!(error = %err, "query invocation failed");
                Invocation::diagnostic(err.to_string(), Vec::new())
            }
        }
    }

    /// Flush memoized results. Wire this to the host's cache-flush event.
    pub async fn flush(&self, host: &Host) {
        ResultCache::new(host.cache.clone()).flush().await;
    }

    async fn run(&self, host: &Host, properties: &PropertySet) -> QueryResult<Invocation> {
        let fp = fingerprint("query", properties, &*host.request);
        let cache = ResultCache::new(host.cache.clone());
        if let Some(entry) = cache.get(&fp).await {
            tracing::info!("returning results from cache");
            return Ok(Invocation::from_cache_entry(entry));
        }

        let classified = properties::classify(properties, host).await?;
        let ctrl = ControlParams::from_control(&classified.control)?;

        if let Some(pkg) = &ctrl.package {
            host.packages.add_package(pkg).await?;
        }

        let filters = filter::compile_all(
            classified
                .filters
                .iter()
                .map(|raw| (raw.key.clone(), raw.value.clone())),
            &ctrl.op_overrides,
        );

        if ctrl.debug {
            return Ok(Invocation::diagnostic(
                debug_dump(&ctrl, &filters, host),
                classified.placeholders,
            ));
        }

        let mut executed = planner::execute(&ctrl, filters, host).await?;
        for row in &mut executed.rows {
            normalize::apply_rename(row, &ctrl.rename);
        }

        finish_invocation(
            host,
            &cache,
            &fp,
            &ctrl,
            executed,
            classified,
            &self.styles,
            self.cache_ttl,
        )
        .await
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

/// Resource search with virtual-column support.
pub struct QueryResources {
    styles: StyleRegistry,
    cache_ttl: u64,
    lookup: Arc<AttributeLookup>,
}

impl QueryResources {
    pub fn new() -> Self {
        Self {
            styles: StyleRegistry::new(),
            cache_ttl: 0,
            lookup: Arc::new(AttributeLookup::new()),
        }
    }

    /// Cache lifetime in seconds; 0 (the default) caches until flushed.
    pub fn with_cache_ttl(mut self, ttl_secs: u64) -> Self {
        self.cache_ttl = ttl_secs;
        self
    }

    /// Named pagination styles for `_config`/`_style`.
    pub fn styles(&self) -> &StyleRegistry {
        &self.styles
    }

    /// The attribute name/id lookup service owned by this entry point.
    pub fn lookup(&self) -> &AttributeLookup {
        &self.lookup
    }

    /// Run one invocation. Never fails: errors become diagnostic output.
    pub async fn invoke(&self, host: &Host, properties: PropertySet) -> Invocation {
        match self.run(host, &properties).await {
            Ok(invocation) => invocation,
            Err(err) => {
                tracing::error!(error = %err, "resource query invocation failed");
                Invocation::diagnostic(err.to_string(), Vec::new())
            }
        }
    }

    /// Flush memoized results and the attribute lookup tables. Wire this to
    /// the host's cache-flush event.
    pub async fn flush(&self, host: &Host) {
        ResultCache::new(host.cache.clone()).flush().await;
        self.lookup.invalidate();
    }

    async fn run(&self, host: &Host, properties: &PropertySet) -> QueryResult<Invocation> {
        let fp = fingerprint("query_resources", properties, &*host.request);
        let cache = ResultCache::new(host.cache.clone());
        if let Some(entry) = cache.get(&fp).await {
            tracing::info!("returning results from cache");
            return Ok(Invocation::from_cache_entry(entry));
        }

        let classified = properties::classify(properties, host).await?;
        let ctrl = ControlParams::from_control(&classified.control)?;

        self.lookup.ensure_loaded(&*host.store).await?;
        let native_columns = host.store.fields(RESOURCE_COLLECTION).await?;
        let routed = resources::route(
            classified.filters.clone(),
            &ctrl.op_overrides,
            &native_columns,
        );

        let ids = resources::intersect_ids(&routed, host, &self.lookup).await?;

        if ctrl.debug {
            return Ok(Invocation::diagnostic(
                resource_debug_dump(&routed, ids.as_deref(), host),
                classified.placeholders,
            ));
        }

        let executed = resources::fetch(&ctrl, ids.as_deref(), host, &self.lookup).await?;

        finish_invocation(
            host,
            &cache,
            &fp,
            &ctrl,
            executed,
            classified,
            &self.styles,
            self.cache_ttl,
        )
        .await
    }
}

impl Default for QueryResources {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared tail of both variants: empty-set handling, pagination, rendering,
/// cache write, placeholder publication.
#[allow(clippy::too_many_arguments)]
async fn finish_invocation(
    host: &Host,
    cache: &ResultCache,
    fp: &str,
    ctrl: &ControlParams,
    executed: planner::ExecutedQuery,
    classified: Classified,
    styles: &StyleRegistry,
    cache_ttl: u64,
) -> QueryResult<Invocation> {
    if executed.rows.is_empty() {
        if ctrl.log_level.allows(Verbosity::Debug) {
            tracing::debug!("no output");
        }
        return Ok(Invocation::empty(classified.placeholders));
    }

    let pagination = pagination::paginate_with_links(
        executed.record_count,
        ctrl.limit,
        ctrl.effective_offset(),
        &styles.get(&ctrl.config),
        &*host.links,
        &*host.request,
    );

    let output = render::render(&executed.rows, ctrl, &pagination, host).await?;

    let entry = CacheEntry {
        rendered: output.clone(),
        page_count: pagination.page_count,
        pagination_links: pagination.links.clone(),
        created_at: chrono::Utc::now().timestamp(),
        ttl: cache_ttl,
    };
    cache.put(fp, &entry).await;

    let placeholders = standard_placeholders(
        pagination.page_count,
        &output,
        &pagination.links,
        classified.placeholders,
    );

    Ok(Invocation {
        output,
        page_count: pagination.page_count,
        pagination_links: pagination.links,
        placeholders,
        from_cache: false,
    })
}

/// Human-readable dump for `_debug` in the generic variant. Diagnostic
/// only; nothing downstream runs and nothing is cached.
fn debug_dump(ctrl: &ControlParams, filters: &filter::FilterSpec, host: &Host) -> String {
    format!(
        "Query debug\n\n== Control parameters ==\n{ctrl:#?}\n\n== Compiled filters ==\n{filters:#?}\n\n== Request GET ==\n{get:#?}\n\n== Request POST ==\n{post:#?}\n",
        get = host.request.query_map(),
        post = host.request.body_map(),
    )
}

/// Debug dump for the resource-search variant, including the intersected
/// identifier set.
fn resource_debug_dump(
    routed: &resources::RoutedFilters,
    ids: Option<&[String]>,
    host: &Host,
) -> String {
    format!(
        "QueryResources debug\n\n== Primary filters ==\n{native:#?}\n\n== Virtual filters ==\n{virtuals:#?}\n\n== Matching resource ids ==\n{ids:#?}\n\n== Request GET ==\n{get:#?}\n\n== Request POST ==\n{post:#?}\n",
        native = routed.native,
        virtuals = routed.virtuals,
        get = host.request.query_map(),
        post = host.request.body_map(),
    )
}
