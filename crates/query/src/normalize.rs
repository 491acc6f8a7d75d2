//! Result-record shaping.
//!
//! Records are intentionally dynamic (an ordered mapping, not a fixed
//! struct) because projection and the rename map are caller-controlled at
//! invocation time.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

/// A flattened result record: column/attribute name to scalar value.
pub type Record = IndexMap<String, JsonValue>;

/// The identifier column retained internally for joining.
pub const ID_FIELD: &str = "id";

/// Flatten a nested record into dotted paths, the shape graph fetches are
/// reduced to: `{"author": {"name": "x"}}` becomes `author.name`. Array
/// elements flatten under their index.
pub fn flatten(record: &Record) -> Record {
    let mut out = Record::new();
    for (key, value) in record {
        flatten_value(key, value, &mut out);
    }
    out
}

fn flatten_value(prefix: &str, value: &JsonValue, out: &mut Record) {
    match value {
        JsonValue::Object(map) => {
            for (key, nested) in map {
                flatten_value(&format!("{prefix}.{key}"), nested, out);
            }
        }
        JsonValue::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten_value(&format!("{prefix}.{index}"), nested, out);
            }
        }
        scalar => {
            out.insert(prefix.to_string(), scalar.clone());
        }
    }
}

/// Merge virtual-attribute values into a native row. Virtual values never
/// overwrite an existing native key.
pub fn merge_virtual(row: &mut Record, virtual_values: &IndexMap<String, JsonValue>) {
    for (name, value) in virtual_values {
        if !row.contains_key(name) {
            row.insert(name.clone(), value.clone());
        }
    }
}

/// Restrict a row to the requested columns, in request order. Missing
/// columns materialize as null so every row carries the same keys.
pub fn project(row: &Record, columns: &[String]) -> Record {
    columns
        .iter()
        .map(|col| {
            (
                col.clone(),
                row.get(col).cloned().unwrap_or(JsonValue::Null),
            )
        })
        .collect()
}

/// Drop the internally-retained identifier unless the caller asked for it.
pub fn strip_unrequested_id(row: &mut Record, requested: &[String]) {
    if !requested.iter().any(|c| c == ID_FIELD) {
        row.shift_remove(ID_FIELD);
    }
}

/// Apply the rename map as a final, independent pass: for each `{old: new}`
/// pair, the value under `old` (as it stood before any renaming) moves to
/// `new`. Pairs never chain; colliding targets are a caller precondition.
pub fn apply_rename(row: &mut Record, rename: &IndexMap<String, String>) {
    if rename.is_empty() {
        return;
    }
    let snapshot = row.clone();
    for old in rename.keys() {
        row.shift_remove(old);
    }
    for (old, new) in rename {
        if let Some(value) = snapshot.get(old) {
            row.insert(new.clone(), value.clone());
        }
    }
}

/// Render a JSON scalar the way templates expect it: strings bare, nulls
/// empty, everything else via its JSON form.
pub fn value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, JsonValue)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn flatten_nested_objects_and_arrays() {
        let row = record(&[
            ("id", json!(3)),
            ("author", json!({"name": "sue", "roles": ["editor", "admin"]})),
        ]);
        let flat = flatten(&row);
        assert_eq!(flat.get("id").unwrap(), &json!(3));
        assert_eq!(flat.get("author.name").unwrap(), &json!("sue"));
        assert_eq!(flat.get("author.roles.0").unwrap(), &json!("editor"));
        assert_eq!(flat.get("author.roles.1").unwrap(), &json!("admin"));
    }

    #[test]
    fn merge_never_overwrites_native_keys() {
        let mut row = record(&[("pagetitle", json!("native"))]);
        let mut tv = IndexMap::new();
        tv.insert("pagetitle".to_string(), json!("virtual"));
        tv.insert("city".to_string(), json!("Boston"));
        merge_virtual(&mut row, &tv);
        assert_eq!(row.get("pagetitle").unwrap(), &json!("native"));
        assert_eq!(row.get("city").unwrap(), &json!("Boston"));
    }

    #[test]
    fn rename_moves_values_and_removes_originals() {
        let mut row = record(&[("pagetitle", json!("A")), ("description", json!("B"))]);
        let mut rename = IndexMap::new();
        rename.insert("pagetitle".to_string(), "city".to_string());
        rename.insert("description".to_string(), "desc".to_string());
        apply_rename(&mut row, &rename);

        assert_eq!(row.get("city").unwrap(), &json!("A"));
        assert_eq!(row.get("desc").unwrap(), &json!("B"));
        assert!(!row.contains_key("pagetitle"));
        assert!(!row.contains_key("description"));
    }

    #[test]
    fn rename_pairs_apply_independently_not_chained() {
        // a -> b and b -> c must both read the original row.
        let mut row = record(&[("a", json!(1)), ("b", json!(2))]);
        let mut rename = IndexMap::new();
        rename.insert("a".to_string(), "b".to_string());
        rename.insert("b".to_string(), "c".to_string());
        apply_rename(&mut row, &rename);

        assert_eq!(row.get("b").unwrap(), &json!(1));
        assert_eq!(row.get("c").unwrap(), &json!(2));
        assert!(!row.contains_key("a"));
    }

    #[test]
    fn rename_missing_old_keys_are_ignored() {
        let mut row = record(&[("x", json!(1))]);
        let mut rename = IndexMap::new();
        rename.insert("absent".to_string(), "y".to_string());
        apply_rename(&mut row, &rename);
        assert_eq!(row.get("x").unwrap(), &json!(1));
        assert!(!row.contains_key("y"));
    }

    #[test]
    fn projection_preserves_request_order_and_fills_nulls() {
        let row = record(&[("b", json!(2)), ("a", json!(1))]);
        let projected = project(&row, &["a".to_string(), "b".to_string(), "c".to_string()]);
        let keys: Vec<_> = projected.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(projected.get("c").unwrap(), &JsonValue::Null);
    }

    #[test]
    fn id_stripped_unless_requested() {
        let mut row = record(&[("id", json!(7)), ("name", json!("x"))]);
        strip_unrequested_id(&mut row, &["name".to_string(), "age".to_string()]);
        assert!(!row.contains_key("id"));

        let mut row = record(&[("id", json!(7)), ("name", json!("x"))]);
        strip_unrequested_id(&mut row, &["id".to_string(), "name".to_string()]);
        assert!(row.contains_key("id"));
    }

    #[test]
    fn scalar_rendering() {
        assert_eq!(value_to_string(&json!("x")), "x");
        assert_eq!(value_to_string(&json!(5)), "5");
        assert_eq!(value_to_string(&JsonValue::Null), "");
        assert_eq!(value_to_string(&json!(true)), "true");
    }
}
