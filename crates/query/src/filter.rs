//! Filter-key compiler.
//!
//! Translates a `field:OPERATOR` property key plus its resolved value into a
//! normalized `(field, operator, value)` entry. Operator suffixes overlap
//! (`:NOT_LIKE` ends in `:LIKE`, `:NOT_IN` ends in `:IN`), so the suffix
//! table is evaluated longest-first and the first match wins.

use indexmap::IndexMap;

use crate::properties::Value;

/// Canonical comparison operators.
///
/// `Raw` carries an operator token the compiler does not recognize, either
/// an explicit `_op_` override or a raw `field:<token>` key. It is passed
/// through for the store to interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    In,
    NotIn,
    Raw(String),
}

impl Operator {
    /// The canonical token, as the query layer expects it.
    pub fn token(&self) -> &str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Raw(token) => token,
        }
    }

    /// Parse an explicit operator token (from an `_op_` override or a raw
    /// key). Leading `:` is stripped; unknown tokens are carried as `Raw`.
    pub fn parse_token(token: &str) -> Self {
        let token = token.trim_start_matches(':').trim();
        match token.to_ascii_uppercase().as_str() {
            "=" | "==" => Operator::Eq,
            "!=" | "<>" => Operator::Ne,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            "LIKE" => Operator::Like,
            "NOT LIKE" => Operator::NotLike,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            _ => Operator::Raw(token.to_string()),
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// One compiled filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterEntry {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl FilterEntry {
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// The `field:OPERATOR` form, as handed to raw-key consumers.
    pub fn compiled_key(&self) -> String {
        format!("{}:{}", self.field, self.operator.token())
    }
}

/// The compiled filter set, in caller order. Consumed exactly once by the
/// planner.
pub type FilterSpec = Vec<FilterEntry>;

/// How a recognized suffix transforms the value.
#[derive(Debug, Clone, Copy)]
enum Coercion {
    None,
    /// `%v%`
    Contains,
    /// `v%`
    Prefix,
    /// `%v`
    Suffix,
    /// Comma-split scalars into a trimmed list.
    SplitList,
}

/// Suffix table in match-priority order: longest suffix first, so an
/// overlapping shorter suffix can never shadow it.
const SUFFIXES: &[(&str, Operator, Coercion)] = &[
    (":starts_with", Operator::Like, Coercion::Prefix),
    (":ends_with", Operator::Like, Coercion::Suffix),
    (":not_like", Operator::NotLike, Coercion::Contains),
    (":not_in", Operator::NotIn, Coercion::SplitList),
    (":like", Operator::Like, Coercion::Contains),
    (":gte", Operator::Gte, Coercion::None),
    (":lte", Operator::Lte, Coercion::None),
    (":ne", Operator::Ne, Coercion::None),
    (":gt", Operator::Gt, Coercion::None),
    (":lt", Operator::Lt, Coercion::None),
    (":in", Operator::In, Coercion::SplitList),
    (":e", Operator::Eq, Coercion::None),
];

/// Compile one `(key, resolvedValue)` pair into a filter entry.
///
/// Steps, in order: operator-suffix recognition with value coercion, NULL
/// literal recognition, then the `_op_<originalKey>` override, which
/// replaces the operator entirely.
pub fn compile(key: &str, value: Value, op_overrides: &IndexMap<String, String>) -> FilterEntry {
    let (field, operator, value) = match match_suffix(key) {
        Some((field, operator, coercion)) => {
            (field.to_string(), operator, coerce(value, coercion))
        }
        None => split_raw_key(key, value),
    };

    let value = coerce_null_literal(value);

    let operator = match op_overrides.get(key) {
        Some(token) => Operator::parse_token(token),
        None => operator,
    };

    FilterEntry::new(field, operator, value)
}

/// Compile a whole property set's worth of filters.
pub fn compile_all(
    filters: impl IntoIterator<Item = (String, Value)>,
    op_overrides: &IndexMap<String, String>,
) -> FilterSpec {
    filters
        .into_iter()
        .map(|(key, value)| compile(&key, value, op_overrides))
        .collect()
}

/// Match a recognized operator suffix, case-insensitively, in table order.
fn match_suffix(key: &str) -> Option<(&str, Operator, Coercion)> {
    for (suffix, operator, coercion) in SUFFIXES {
        if key.len() > suffix.len()
            && key.is_char_boundary(key.len() - suffix.len())
            && key[key.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
        {
            return Some((
                &key[..key.len() - suffix.len()],
                operator.clone(),
                *coercion,
            ));
        }
    }
    None
}

/// A key with no recognized suffix: either a bare field (implicit equality)
/// or `field:<raw token>` whose token is parsed as an explicit operator.
fn split_raw_key(key: &str, value: Value) -> (String, Operator, Value) {
    match key.split_once(':') {
        Some((field, token)) if !field.is_empty() && !token.is_empty() => {
            (field.to_string(), Operator::parse_token(token), value)
        }
        _ => (key.to_string(), Operator::Eq, value),
    }
}

fn coerce(value: Value, coercion: Coercion) -> Value {
    match coercion {
        Coercion::None => value,
        Coercion::Contains => wrap(value, true, true),
        Coercion::Prefix => wrap(value, false, true),
        Coercion::Suffix => wrap(value, true, false),
        Coercion::SplitList => split_list(value),
    }
}

/// Wildcard-wrap a scalar, trimming existing `%` first so re-wrapping an
/// already-wrapped value never double-wraps.
fn wrap(value: Value, leading: bool, trailing: bool) -> Value {
    match value {
        Value::Scalar(s) => {
            let core = s.trim_matches('%');
            let mut wrapped = String::with_capacity(core.len() + 2);
            if leading {
                wrapped.push('%');
            }
            wrapped.push_str(core);
            if trailing {
                wrapped.push('%');
            }
            Value::Scalar(wrapped)
        }
        other => other,
    }
}

/// Split a comma-separated scalar into a trimmed list; lists pass through.
fn split_list(value: Value) -> Value {
    match value {
        Value::Scalar(s) => Value::List(s.split(',').map(|item| item.trim().to_string()).collect()),
        other => other,
    }
}

/// A scalar literally equal to `"null"` (case-insensitive) becomes the NULL
/// marker. Evaluated after coercion, so a wildcard-wrapped `%null%` stays a
/// pattern.
fn coerce_null_literal(value: Value) -> Value {
    match &value {
        Value::Scalar(s) if s.eq_ignore_ascii_case("null") => Value::Null,
        _ => value,
    }
}
