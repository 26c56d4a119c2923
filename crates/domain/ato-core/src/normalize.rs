//! Key-case adapter applied to inbound payloads at the transport boundary.
//!
//! The backend emits both `snake_case` and `camelCase` keys for the same logical
//! field, at any depth of a payload. Everything past the transport only ever
//! sees camelCase.

use serde_json::{Map, Value};

/// Convert a `snake_case` key to `camelCase`. Keys without underscores are returned unchanged.
pub fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for (i, c) in key.chars().enumerate() {
        if c == '_' && i > 0 {
            upper_next = true;
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Rewrite the keys of `map` into camelCase, descending into nested objects and arrays.
///
/// When both spellings of a field are present, the key that was already
/// camelCase wins regardless of its position in the map.
pub fn normalize_keys(map: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::with_capacity(map.len());
    let mut converted = Vec::new();

    for (key, value) in map {
        let value = normalize_value(value);
        let camel = to_camel_case(&key);
        if camel == key {
            out.insert(key, value);
        } else {
            converted.push((camel, value));
        }
    }

    for (camel, value) in converted {
        out.entry(camel).or_insert(value);
    }
    out
}

/// Normalise every object inside `value`; scalars pass through.
pub fn normalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(normalize_keys(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snake_keys_become_camel() {
        assert_eq!(to_camel_case("actual_binary_path"), "actualBinaryPath");
        assert_eq!(to_camel_case("source"), "source");
        assert_eq!(to_camel_case("projectRoot"), "projectRoot");
        assert_eq!(to_camel_case("_private"), "_private");
    }

    #[test]
    fn explicit_camel_variant_wins_over_snake() {
        let Value::Object(map) = json!({
            "localPath": "/explicit",
            "local_path": "/snake",
            "is_installing": true,
        }) else {
            unreachable!()
        };

        let out = normalize_keys(map);
        assert_eq!(out.get("localPath"), Some(&json!("/explicit")));
        assert_eq!(out.get("isInstalling"), Some(&json!(true)));
        assert!(!out.contains_key("local_path"));
    }

    #[test]
    fn nested_objects_and_arrays_are_normalized() {
        let out = normalize_value(json!({
            "builds": [
                { "build_id": "b-1", "project_root": "/p", "status": "building" },
                { "buildId": "b-2", "build_id": "stale" },
            ],
            "install_progress": { "percent_done": 40 },
        }));

        assert_eq!(out["builds"][0]["buildId"], "b-1");
        assert_eq!(out["builds"][0]["projectRoot"], "/p");
        assert_eq!(out["builds"][1]["buildId"], "b-2");
        assert_eq!(out["installProgress"]["percentDone"], 40);
        assert!(out["builds"][0].get("build_id").is_none());
    }

    #[test]
    fn snake_case_build_entries_deserialize() {
        let build: crate::Build = serde_json::from_value(normalize_value(json!({
            "build_id": "b-1",
            "status": "building",
            "project_root": "/p",
            "target": "default",
        })))
        .unwrap();

        assert_eq!(build.build_id.as_deref(), Some("b-1"));
        assert_eq!(build.project_root.as_deref(), Some("/p"));
    }
}
