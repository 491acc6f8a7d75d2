//! Input-modifier resolver.
//!
//! A raw property value may carry a trailing modifier in the form
//! `<literal>:<name>[=<option>]`, e.g. `sortby:get` or `year:get=2012`.
//! The modifier reads the concrete value from an external input source at
//! invocation time, which is how static snippet calls react to search forms
//! and pagination links.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::QueryResult;
use crate::host::Host;
use crate::properties::Value;

/// The modifier pattern: literal, modifier name, optional `=option` with the
/// option quoted any way the caller prefers.
const MODIFIER_PATTERN: &str = r#"^(.*):((\w+)(=['`"]?([^'`"]*)['`"]?)?)$"#;

fn modifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)] // the pattern is a compile-time constant
    RE.get_or_init(|| Regex::new(MODIFIER_PATTERN).expect("modifier pattern is valid"))
}

/// Recognized modifiers, dispatched as a closed set. Anything unrecognized
/// is a user-defined transform run through the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modifier {
    Get,
    Post,
    Decode,
    Custom(String),
}

impl Modifier {
    fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "get" => Modifier::Get,
            "post" => Modifier::Post,
            "decode" => Modifier::Decode,
            _ => Modifier::Custom(name.to_string()),
        }
    }
}

/// A resolved property value.
#[derive(Debug, Clone)]
pub struct ResolvedProperty {
    pub value: Value,
    /// The literal left of the modifier, when one matched. Used as the
    /// placeholder field name.
    pub source_field: Option<String>,
}

impl ResolvedProperty {
    fn passthrough(value: Value) -> Self {
        Self {
            value,
            source_field: None,
        }
    }
}

/// Resolve one raw value. Only scalars can carry a modifier; lists pass
/// through unchanged.
pub async fn resolve_value(raw: &Value, host: &Host) -> QueryResult<ResolvedProperty> {
    let Value::Scalar(scalar) = raw else {
        return Ok(ResolvedProperty::passthrough(raw.clone()));
    };

    let Some(caps) = modifier_re().captures(scalar) else {
        return Ok(ResolvedProperty::passthrough(raw.clone()));
    };

    let literal = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let name = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
    let option = caps.get(5).map(|m| m.as_str()).unwrap_or_default();

    let value = match Modifier::parse(name) {
        Modifier::Get => host
            .request
            .query_param(literal)
            .unwrap_or_else(|| Value::Scalar(option.to_string())),
        Modifier::Post => host
            .request
            .body_param(literal)
            .unwrap_or_else(|| Value::Scalar(option.to_string())),
        Modifier::Decode => match serde_json::from_str::<serde_json::Value>(literal) {
            Ok(json) => Value::from_json(&json),
            Err(err) => {
                // Malformed JSON resolves to NULL; the invocation continues.
                tracing::warn!(input = %literal, error = %err, "decode modifier received invalid JSON");
                Value::Null
            }
        },
        Modifier::Custom(transform) => {
            match host.transforms.run(&transform, literal, option).await {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(transform = %transform, error = %err, "value transform failed");
                    Value::Scalar(String::new())
                }
            }
        }
    };

    Ok(ResolvedProperty {
        value,
        source_field: Some(literal.to_string()),
    })
}
