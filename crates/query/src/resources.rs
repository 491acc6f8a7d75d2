//! Resource-search variant: native columns plus virtual attribute columns.
//!
//! Filters on the primary resource collection's own columns run against it
//! directly; any other filter name is treated as a virtual column stored in
//! the attribute-value sidecar table, keyed by `(resource_id, attribute_id)`
//! with the actual value under one generic `value` column. Matching
//! identifier sets from both sources are intersected before the final fetch.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use indexmap::IndexMap;

use crate::error::{QueryError, QueryResult};
use crate::filter::{self, FilterEntry, FilterSpec, Operator};
use crate::host::{CollectionQuery, CollectionStore, Host};
use crate::normalize::{self, Record, ID_FIELD};
use crate::planner::ExecutedQuery;
use crate::properties::{ControlParams, Projection, RawFilter, Value};

/// The primary collection this variant searches.
pub const RESOURCE_COLLECTION: &str = "resource";

/// Attribute definitions: `id`, `name`.
pub const ATTRIBUTE_COLLECTION: &str = "attribute";

/// Attribute values: `resource_id`, `attribute_id`, `value`.
pub const ATTRIBUTE_VALUE_COLLECTION: &str = "attribute_value";

const VALUE_FIELD: &str = "value";
const RESOURCE_ID_FIELD: &str = "resource_id";
const ATTRIBUTE_ID_FIELD: &str = "attribute_id";

/// Process-wide attribute name/id lookup.
///
/// Read-mostly: populated lazily on first use, reused across invocations,
/// and invalidated by the same external cache-flush signal as the result
/// cache. Concurrent first uses may populate twice; last writer wins.
#[derive(Default)]
pub struct AttributeLookup {
    by_name: DashMap<String, i64>,
    by_id: DashMap<i64, String>,
    loaded: AtomicBool,
}

impl AttributeLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate from the attribute collection if not yet loaded.
    pub async fn ensure_loaded(&self, store: &dyn CollectionStore) -> QueryResult<()> {
        if self.loaded.load(Ordering::Acquire) {
            return Ok(());
        }

        let query = CollectionQuery {
            select: Projection::Columns(vec![ID_FIELD.to_string(), "name".to_string()]),
            ..CollectionQuery::default()
        };
        let rows = store.select(ATTRIBUTE_COLLECTION, &query).await?;
        for row in rows {
            let Some(id) = row.get(ID_FIELD).and_then(scalar_i64) else {
                continue;
            };
            let Some(name) = row.get("name").map(normalize::value_to_string) else {
                continue;
            };
            self.by_name.insert(name.clone(), id);
            self.by_id.insert(id, name);
        }
        self.loaded.store(true, Ordering::Release);
        tracing::debug!(attributes = self.by_name.len(), "attribute lookup loaded");
        Ok(())
    }

    pub fn id_of(&self, name: &str) -> Option<i64> {
        self.by_name.get(name).map(|entry| *entry)
    }

    pub fn name_of(&self, id: i64) -> Option<String> {
        self.by_id.get(&id).map(|entry| entry.clone())
    }

    /// Drop the tables; the next use reloads them. Called from the host's
    /// cache-flush hook.
    pub fn invalidate(&self) {
        self.loaded.store(false, Ordering::Release);
        self.by_name.clear();
        self.by_id.clear();
    }
}

/// A compiled filter against the attribute-value store. The entry's field is
/// already the generic `value` column; `attribute` names which attribute the
/// predicate applies to.
#[derive(Debug, Clone)]
pub struct VirtualFilter {
    pub attribute: String,
    pub entry: FilterEntry,
}

/// Filters routed by source.
#[derive(Debug, Default)]
pub struct RoutedFilters {
    pub native: FilterSpec,
    pub virtuals: Vec<VirtualFilter>,
}

/// Compile raw filters and route each to its source: native column of the
/// resource collection, or virtual attribute.
pub fn route(
    raw_filters: Vec<RawFilter>,
    op_overrides: &IndexMap<String, String>,
    native_columns: &[String],
) -> RoutedFilters {
    let mut routed = RoutedFilters::default();
    for raw in raw_filters {
        let entry = filter::compile(&raw.key, raw.value, op_overrides);
        if native_columns.iter().any(|col| col == &entry.field) {
            routed.native.push(entry);
        } else {
            let attribute = entry.field.clone();
            routed.virtuals.push(VirtualFilter {
                attribute,
                entry: FilterEntry::new(VALUE_FIELD, entry.operator, entry.value),
            });
        }
    }
    routed
}

/// Identifier sets from every applicable filter source, intersected.
///
/// `None` means no filters restricted the search at all ("all records").
/// `Some(vec![])` is a valid empty intersection.
pub async fn intersect_ids(
    routed: &RoutedFilters,
    host: &Host,
    lookup: &AttributeLookup,
) -> QueryResult<Option<Vec<String>>> {
    let mut sets: Vec<Vec<String>> = Vec::new();

    if !routed.native.is_empty() {
        let query = CollectionQuery {
            select: Projection::Columns(vec![ID_FIELD.to_string()]),
            filters: routed.native.clone(),
            ..CollectionQuery::default()
        };
        let rows = host.store.select(RESOURCE_COLLECTION, &query).await?;
        sets.push(collect_ids(&rows, ID_FIELD));
    }

    for vf in &routed.virtuals {
        // A blank filter value (an empty search-form field) restricts
        // nothing and triggers no query.
        if vf.entry.value.is_empty() {
            continue;
        }
        let attribute_id = lookup
            .id_of(&vf.attribute)
            .ok_or_else(|| QueryError::AttributeNotFound(vf.attribute.clone()))?;
        let query = CollectionQuery {
            select: Projection::Columns(vec![RESOURCE_ID_FIELD.to_string()]),
            filters: vec![
                FilterEntry::new(
                    ATTRIBUTE_ID_FIELD,
                    Operator::Eq,
                    Value::Scalar(attribute_id.to_string()),
                ),
                vf.entry.clone(),
            ],
            ..CollectionQuery::default()
        };
        let rows = host.store.select(ATTRIBUTE_VALUE_COLLECTION, &query).await?;
        sets.push(collect_ids(&rows, RESOURCE_ID_FIELD));
    }

    if sets.is_empty() {
        return Ok(None);
    }

    let mut iter = sets.into_iter();
    let mut result = iter.next().unwrap_or_default();
    for set in iter {
        let keep: HashSet<&String> = set.iter().collect();
        result.retain(|id| keep.contains(id));
    }
    Ok(Some(result))
}

/// Fetch and merge the final records for the surviving identifiers.
pub async fn fetch(
    ctrl: &ControlParams,
    ids: Option<&[String]>,
    host: &Host,
    lookup: &AttributeLookup,
) -> QueryResult<ExecutedQuery> {
    let record_count = match ids {
        Some(ids) => ids.len() as u64,
        None => host.store.count(RESOURCE_COLLECTION, &Vec::new()).await?,
    };

    // Split the projection into native and virtual columns. The identifier
    // is always fetched, because the virtual merge joins on it.
    let native_columns = host.store.fields(RESOURCE_COLLECTION).await?;
    let (native_select, virtual_cols) = match ctrl.select.columns() {
        None => (Projection::All, None),
        Some(cols) => {
            let mut real: Vec<String> = native_columns
                .iter()
                .filter(|col| cols.contains(*col))
                .cloned()
                .collect();
            if !real.iter().any(|col| col == ID_FIELD) {
                real.push(ID_FIELD.to_string());
            }
            let virtuals: Vec<String> = cols
                .iter()
                .filter(|col| !native_columns.contains(*col))
                .cloned()
                .collect();
            (Projection::Columns(real), Some(virtuals))
        }
    };

    let mut filters = FilterSpec::new();
    if let Some(ids) = ids {
        filters.push(FilterEntry::new(
            ID_FIELD,
            Operator::In,
            Value::List(ids.to_vec()),
        ));
    }

    let query = CollectionQuery {
        select: native_select,
        filters,
        limit: (ctrl.limit > 0).then_some(ctrl.limit),
        offset: ctrl.effective_offset(),
        sort: ctrl
            .sort_by
            .as_ref()
            .map(|field| (field.clone(), ctrl.sort_dir.clone())),
    };
    let mut rows = host.store.select(RESOURCE_COLLECTION, &query).await?;

    // Virtual values are loaded only when the projection asks for them
    // (every attribute under `*`), and only for the fetched page.
    let wants_all = ctrl.select.columns().is_none();
    let wants_some = virtual_cols.as_ref().is_some_and(|cols| !cols.is_empty());
    let virtual_data = if wants_all || wants_some {
        load_virtual_values(&rows, virtual_cols.as_deref(), host, lookup).await?
    } else {
        HashMap::new()
    };

    for row in &mut rows {
        let id = row.get(ID_FIELD).map(normalize::value_to_string);
        if let Some(values) = id.as_ref().and_then(|id| virtual_data.get(id)) {
            normalize::merge_virtual(row, values);
        }
        if let Some(cols) = ctrl.select.columns() {
            // Keep the identifier through projection (the merge above joined
            // on it), then drop it unless it was actually requested.
            let mut with_id = cols.to_vec();
            if !with_id.iter().any(|col| col == ID_FIELD) {
                with_id.push(ID_FIELD.to_string());
            }
            *row = normalize::project(row, &with_id);
            normalize::strip_unrequested_id(row, cols);
        }
        normalize::apply_rename(row, &ctrl.rename);
    }

    Ok(ExecutedQuery { rows, record_count })
}

/// Load attribute values for the fetched rows, keyed by resource id then
/// attribute name.
async fn load_virtual_values(
    rows: &[Record],
    virtual_cols: Option<&[String]>,
    host: &Host,
    lookup: &AttributeLookup,
) -> QueryResult<HashMap<String, IndexMap<String, serde_json::Value>>> {
    let page_ids = collect_ids(rows, ID_FIELD);
    if page_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut filters = vec![FilterEntry::new(
        RESOURCE_ID_FIELD,
        Operator::In,
        Value::List(page_ids),
    )];

    if let Some(cols) = virtual_cols {
        let mut attribute_ids = Vec::with_capacity(cols.len());
        for col in cols {
            let id = lookup
                .id_of(col)
                .ok_or_else(|| QueryError::AttributeNotFound(col.clone()))?;
            attribute_ids.push(id.to_string());
        }
        filters.push(FilterEntry::new(
            ATTRIBUTE_ID_FIELD,
            Operator::In,
            Value::List(attribute_ids),
        ));
    }

    let query = CollectionQuery {
        select: Projection::All,
        filters,
        ..CollectionQuery::default()
    };
    let value_rows = host.store.select(ATTRIBUTE_VALUE_COLLECTION, &query).await?;

    let mut out: HashMap<String, IndexMap<String, serde_json::Value>> = HashMap::new();
    for row in value_rows {
        let Some(resource_id) = row.get(RESOURCE_ID_FIELD).map(normalize::value_to_string) else {
            continue;
        };
        let Some(attribute_id) = row.get(ATTRIBUTE_ID_FIELD).and_then(scalar_i64) else {
            continue;
        };
        let Some(name) = lookup.name_of(attribute_id) else {
            tracing::warn!(attribute_id, "attribute value without a known attribute");
            continue;
        };
        let value = row
            .get(VALUE_FIELD)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        out.entry(resource_id).or_default().insert(name, value);
    }
    Ok(out)
}

fn collect_ids(rows: &[Record], field: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| row.get(field).map(normalize::value_to_string))
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

fn scalar_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn native_cols() -> Vec<String> {
        ["id", "pagetitle", "published", "description"]
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn routes_native_and_virtual_filters() {
        let raw = vec![
            RawFilter {
                key: "published".to_string(),
                value: Value::from("1"),
            },
            RawFilter {
                key: "city".to_string(),
                value: Value::from("Boston"),
            },
        ];
        let routed = route(raw, &IndexMap::new(), &native_cols());

        assert_eq!(routed.native.len(), 1);
        assert_eq!(routed.native[0].field, "published");

        assert_eq!(routed.virtuals.len(), 1);
        assert_eq!(routed.virtuals[0].attribute, "city");
        assert_eq!(routed.virtuals[0].entry.field, VALUE_FIELD);
        assert_eq!(routed.virtuals[0].entry.operator, Operator::Eq);
    }

    #[test]
    fn virtual_routing_swaps_field_but_keeps_operator_and_value() {
        let raw = vec![RawFilter {
            key: "city:LIKE".to_string(),
            value: Value::from("Bos"),
        }];
        let routed = route(raw, &IndexMap::new(), &native_cols());
        let vf = &routed.virtuals[0];
        assert_eq!(vf.attribute, "city");
        assert_eq!(vf.entry.compiled_key(), "value:LIKE");
        assert_eq!(vf.entry.value, Value::from("%Bos%"));
    }

    #[test]
    fn suffixed_native_key_still_routes_native() {
        let raw = vec![RawFilter {
            key: "pagetitle:STARTS_WITH".to_string(),
            value: Value::from("A"),
        }];
        let routed = route(raw, &IndexMap::new(), &native_cols());
        assert_eq!(routed.native.len(), 1);
        assert_eq!(routed.native[0].field, "pagetitle");
        assert_eq!(routed.native[0].value, Value::from("A%"));
    }

    #[test]
    fn lookup_invalidation_clears_tables() {
        let lookup = AttributeLookup::new();
        lookup.by_name.insert("city".to_string(), 4);
        lookup.by_id.insert(4, "city".to_string());
        lookup.loaded.store(true, Ordering::Release);

        assert_eq!(lookup.id_of("city"), Some(4));
        lookup.invalidate();
        assert_eq!(lookup.id_of("city"), None);
        assert!(!lookup.loaded.load(Ordering::Acquire));
    }
}
