//! Generic-variant query planning and execution.
//!
//! One collection read: projection (unless a graph traversal needs every
//! column), filters, a total count before limit/offset, then the fetch.
//! A raw-SQL control parameter bypasses the builder entirely.

use crate::error::QueryResult;
use crate::filter::FilterSpec;
use crate::host::{CollectionQuery, Host};
use crate::normalize::{self, Record};
use crate::properties::{ControlParams, Projection};

/// Rows plus the total match count irrespective of limit/offset.
#[derive(Debug, Default)]
pub struct ExecutedQuery {
    pub rows: Vec<Record>,
    pub record_count: u64,
}

/// Build and run the collection read described by the control parameters.
pub async fn execute(
    ctrl: &ControlParams,
    filters: FilterSpec,
    host: &Host,
) -> QueryResult<ExecutedQuery> {
    if let Some(sql) = &ctrl.sql {
        return execute_raw(sql, ctrl, host).await;
    }

    // Graph traversal needs unrestricted columns to stitch relations.
    let select = if ctrl.graph.is_some() {
        Projection::All
    } else {
        ctrl.select.clone()
    };

    let record_count = host.store.count(&ctrl.collection, &filters).await?;

    let query = CollectionQuery {
        select,
        filters,
        limit: (ctrl.limit > 0).then_some(ctrl.limit),
        offset: ctrl.effective_offset(),
        sort: ctrl
            .sort_by
            .as_ref()
            .map(|field| (field.clone(), ctrl.sort_dir.clone())),
    };

    let rows = match &ctrl.graph {
        Some(graph) => {
            let nested = host
                .store
                .select_graph(&ctrl.collection, graph, &query)
                .await?;
            nested.iter().map(normalize::flatten).collect()
        }
        None => host.store.select(&ctrl.collection, &query).await?,
    };

    tracing::debug!(
        collection = %ctrl.collection,
        rows = rows.len(),
        record_count,
        "collection query executed"
    );

    Ok(ExecutedQuery { rows, record_count })
}

/// Raw-SQL escape hatch. LIMIT/OFFSET are appended when a limit is
/// configured; the store's exact-match count supplies the record count.
async fn execute_raw(sql: &str, ctrl: &ControlParams, host: &Host) -> QueryResult<ExecutedQuery> {
    let mut statement = sql.to_string();
    if ctrl.limit > 0 {
        statement.push_str(&format!(" LIMIT {}", ctrl.limit));
        let offset = ctrl.effective_offset();
        if offset > 0 {
            statement.push_str(&format!(" OFFSET {offset}"));
        }
    }

    tracing::debug!(sql = %statement, "executing raw statement");
    let raw = host.store.query_raw(&statement).await?;
    Ok(ExecutedQuery {
        rows: raw.rows,
        record_count: raw.matched,
    })
}
