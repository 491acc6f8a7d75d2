//! Script-property model: values, classification, and control parameters.
//!
//! A snippet call arrives as a flat, ordered map of string keys to scalar or
//! array values. Keys starting with the control prefix (`_`) steer behavior;
//! every other key is a filter on the target collection. Classification
//! resolves each value's input modifier first, so a control parameter like
//! `_sortby = "sortby:get"` reads the live request before it is typed.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::host::Host;
use crate::modifier;

/// Prefix marking a control parameter.
pub const CONTROL_PREFIX: char = '_';

/// Prefix for per-field operator overrides (`_op_price = ">="`).
pub const OP_OVERRIDE_PREFIX: &str = "_op_";

/// The ordered property set handed to an entry point.
pub type PropertySet = IndexMap<String, Value>;

/// A property or filter value.
///
/// `Null` is never supplied directly by the caller; it appears after the
/// literal `"null"` coercion or a failed `decode` modifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Scalar(String),
    List(Vec<String>),
}

impl Value {
    /// The scalar contents, if this is a scalar.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value for placeholders and debug output.
    pub fn display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Scalar(s) => s.clone(),
            Value::List(items) => items.join(","),
        }
    }

    /// Convert a JSON value into the property value space.
    ///
    /// Objects have no filter meaning and degrade to `Null`.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null | serde_json::Value::Object(_) => Value::Null,
            serde_json::Value::String(s) => Value::Scalar(s.clone()),
            serde_json::Value::Number(n) => Value::Scalar(n.to_string()),
            serde_json::Value::Bool(b) => Value::Scalar(b.to_string()),
            serde_json::Value::Array(items) => Value::List(
                items
                    .iter()
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Scalar(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(s)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items)
    }
}

/// A filter property after value resolution, before operator compilation.
#[derive(Debug, Clone)]
pub struct RawFilter {
    /// The key exactly as the caller wrote it (operator suffix intact).
    pub key: String,
    /// The modifier-resolved value.
    pub value: Value,
}

/// Output of property classification.
#[derive(Debug, Default)]
pub struct Classified {
    /// Control entries with the prefix intact, values resolved.
    pub control: IndexMap<String, Value>,
    /// Filter entries in caller order, values resolved.
    pub filters: Vec<RawFilter>,
    /// `query.<field>` placeholder bindings (HTML-escaped resolved values).
    pub placeholders: Vec<(String, String)>,
}

/// Split the property set into control and filter entries, resolving each
/// value's input modifier along the way.
///
/// Resolved filter values are also published as `query.<field>` placeholders,
/// keyed by the field name the modifier pattern exposed (the literal left of
/// the modifier, or the property key itself).
pub async fn classify(properties: &PropertySet, host: &Host) -> QueryResult<Classified> {
    let mut out = Classified::default();

    for (key, raw) in properties {
        let resolved = modifier::resolve_value(raw, host).await?;

        if key.starts_with(CONTROL_PREFIX) {
            out.control.insert(key.clone(), resolved.value);
            continue;
        }

        out.placeholders.push((
            format!("query.{}", resolved.source_field.unwrap_or(key.clone())),
            crate::render::html_escape(&resolved.value.display()),
        ));
        out.filters.push(RawFilter {
            key: key.clone(),
            value: resolved.value,
        });
    }

    Ok(out)
}

/// Sort direction, which may carry a raw rule string for complex sorts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
    Raw(String),
}

impl SortDirection {
    fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "ASC" => SortDirection::Asc,
            "DESC" => SortDirection::Desc,
            _ => SortDirection::Raw(s.trim().to_string()),
        }
    }
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("ASC"),
            SortDirection::Desc => f.write_str("DESC"),
            SortDirection::Raw(rule) => f.write_str(rule),
        }
    }
}

/// Column projection for a collection read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// Select everything (`*`).
    #[default]
    All,
    /// Select the named columns, in order.
    Columns(Vec<String>),
}

impl Projection {
    /// Parse a `_select` string: `*` or a comma-separated, trimmed list.
    pub fn parse(select: &str) -> Self {
        let select = select.trim();
        if select.is_empty() || select == "*" {
            return Projection::All;
        }
        Projection::Columns(
            select
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        )
    }

    pub fn columns(&self) -> Option<&[String]> {
        match self {
            Projection::All => None,
            Projection::Columns(cols) => Some(cols),
        }
    }
}

/// External model package to register before querying (`_pkg`).
///
/// Colon-separated `name:model_path[:table_prefix]`; a bare name implies the
/// conventional `components/<name>/model/` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub model_path: String,
    pub table_prefix: Option<String>,
}

impl PackageSpec {
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, ':');
        let name = parts.next()?.trim().to_string();
        if name.is_empty() {
            return None;
        }
        let model_path = parts
            .next()
            .map(|p| p.to_string())
            .unwrap_or_else(|| format!("components/{name}/model/"));
        let table_prefix = parts.next().map(|p| p.to_string());
        Some(Self {
            name,
            model_path,
            table_prefix,
        })
    }
}

/// Per-invocation verbosity override (`_log_level`).
///
/// Numeric levels follow the host convention: 0 error, 1 warn, 2 info,
/// 3 debug and above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl Verbosity {
    fn from_level(level: i64) -> Self {
        match level {
            0 => Verbosity::Error,
            1 => Verbosity::Warn,
            2 => Verbosity::Info,
            _ => Verbosity::Debug,
        }
    }

    /// Whether diagnostic events at `other` should be emitted.
    pub fn allows(self, other: Verbosity) -> bool {
        self >= other
    }
}

/// Typed control parameters, derived once per invocation and immutable
/// thereafter.
#[derive(Debug, Clone)]
pub struct ControlParams {
    pub collection: String,
    pub package: Option<PackageSpec>,
    pub tpl: Option<String>,
    pub tpl_outer: Option<String>,
    pub view: String,
    pub limit: u64,
    pub offset: u64,
    pub page: u64,
    pub sort_by: Option<String>,
    pub sort_dir: SortDirection,
    pub sql: Option<String>,
    pub graph: Option<String>,
    pub select: Projection,
    pub config: String,
    pub log_level: Verbosity,
    pub debug: bool,
    pub rename: IndexMap<String, String>,
    /// `_op_<key>` operator overrides, keyed by the original filter key.
    pub op_overrides: IndexMap<String, String>,
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            collection: "resource".to_string(),
            package: None,
            tpl: None,
            tpl_outer: None,
            view: "table".to_string(),
            limit: 0,
            offset: 0,
            page: 0,
            sort_by: None,
            sort_dir: SortDirection::Asc,
            sql: None,
            graph: None,
            select: Projection::All,
            config: "default".to_string(),
            log_level: Verbosity::default(),
            debug: false,
            rename: IndexMap::new(),
            op_overrides: IndexMap::new(),
        }
    }
}

impl ControlParams {
    /// Build typed control parameters from the classified control entries.
    pub fn from_control(control: &IndexMap<String, Value>) -> QueryResult<Self> {
        let mut params = Self::default();

        let text = |key: &str| -> Option<String> {
            control
                .get(key)
                .map(Value::display)
                .filter(|s| !s.is_empty())
        };
        let integer = |key: &str| -> QueryResult<Option<i64>> {
            match text(key) {
                None => Ok(None),
                Some(raw) => raw.trim().parse::<i64>().map(Some).map_err(|_| {
                    QueryError::InvalidProperty {
                        key: key.to_string(),
                        reason: format!("expected an integer, got '{raw}'"),
                    }
                }),
            }
        };

        if let Some(classname) = text("_classname") {
            params.collection = classname;
        }
        params.package = text("_pkg").as_deref().and_then(PackageSpec::parse);
        params.tpl = text("_tpl");
        params.tpl_outer = text("_tplOuter");
        if let Some(view) = text("_view") {
            params.view = view;
        }
        params.limit = integer("_limit")?.map(|v| v.max(0) as u64).unwrap_or(0);
        params.offset = integer("_offset")?.map(|v| v.max(0) as u64).unwrap_or(0);
        params.page = integer("_page")?.map(|v| v.max(0) as u64).unwrap_or(0);
        params.sort_by = text("_sortby");
        if let Some(dir) = text("_sortdir") {
            params.sort_dir = SortDirection::parse(&dir);
        }
        params.sql = text("_sql");
        params.graph = text("_graph");
        if let Some(select) = text("_select") {
            params.select = Projection::parse(&select);
        }
        // _config and _style both name the pagination bundle; _style wins
        // when present, matching the resource-search variant's interface.
        if let Some(config) = text("_style").or_else(|| text("_config")) {
            params.config = crate::pagination::sanitize_style_name(&config);
        }
        if let Some(level) = integer("_log_level")? {
            params.log_level = Verbosity::from_level(level);
        }
        params.debug = integer("_debug")?.unwrap_or(0) != 0;
        params.rename = parse_rename(control.get("_rename"));

        for (key, value) in control {
            if let Some(field) = key.strip_prefix(OP_OVERRIDE_PREFIX) {
                params
                    .op_overrides
                    .insert(field.to_string(), value.display());
            }
        }

        Ok(params)
    }

    /// The effective record offset: explicit `_offset` wins, otherwise a
    /// 1-based `_page` with a configured limit derives one.
    pub fn effective_offset(&self) -> u64 {
        if self.offset == 0 && self.page > 1 && self.limit > 0 {
            (self.page - 1) * self.limit
        } else {
            self.offset
        }
    }
}

/// Parse the `_rename` JSON hash (`{"old":"new"}`). Anything that is not a
/// flat string hash is rejected with a debug log, never an error.
fn parse_rename(value: Option<&Value>) -> IndexMap<String, String> {
    let Some(raw) = value.and_then(Value::as_scalar) else {
        return IndexMap::new();
    };
    match serde_json::from_str::<IndexMap<String, String>>(raw) {
        Ok(map) => map,
        Err(err) => {
            tracing::debug!(error = %err, "_rename input must be a valid JSON hash");
            IndexMap::new()
        }
    }
}
