//! Runtime invocation evidence
//!
//! Loads an optional JSON profile of production invocation counts and joins
//! it to scanned entities. Three shapes are accepted: an object with a
//! `functions` map, a flat object keyed by function name, or a list of rows
//! carrying a name field. Counts are matched by qualified name first, then
//! simple name. Entities the profile does not cover stay unknown; only an
//! explicit zero in the profile counts as never invoked.

use crate::models::{Entity, RuntimeEvidence};
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::warn;

pub const SOURCE_FILE: &str = "runtime-file";
pub const SOURCE_UNMAPPED: &str = "runtime-unmapped";
pub const SOURCE_UNAVAILABLE: &str = "runtime-unavailable";

#[derive(Debug, Clone)]
pub struct RuntimeRecord {
    pub invocations: u64,
    pub last_invoked_at: Option<String>,
}

fn coerce_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().map(|f| f.max(0.0) as u64)),
        _ => None,
    }
}

/// A record is either a bare invocation count or an object carrying
/// `invocations` (or `count`) and optionally `last_invoked_at`.
fn coerce_record(value: &Value) -> Option<RuntimeRecord> {
    if let Some(count) = coerce_count(value) {
        return Some(RuntimeRecord {
            invocations: count,
            last_invoked_at: None,
        });
    }
    let object = value.as_object()?;
    let invocations = object
        .get("invocations")
        .or_else(|| object.get("count"))
        .and_then(coerce_count)?;
    let last_invoked_at = object
        .get("last_invoked_at")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(RuntimeRecord {
        invocations,
        last_invoked_at,
    })
}

fn row_name(row: &Value) -> Option<&str> {
    let object = row.as_object()?;
    ["qualified_name", "name", "function"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
}

/// Parse a runtime profile file into a name-keyed map of records.
/// Entries that fail to coerce are skipped with a warning.
pub fn load_runtime_data(path: &Path) -> Result<HashMap<String, RuntimeRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read runtime data file {}", path.display()))?;
    let parsed: Value = serde_json::from_str(&raw)
        .with_context(|| format!("runtime data file {} is not valid JSON", path.display()))?;

    let mut records = HashMap::new();
    match &parsed {
        Value::Object(object) => {
            let entries = match object.get("functions").and_then(Value::as_object) {
                Some(functions) => functions,
                None => object,
            };
            for (name, value) in entries {
                match coerce_record(value) {
                    Some(record) => {
                        records.insert(name.clone(), record);
                    }
                    None => warn!(name = name.as_str(), "skipping malformed runtime entry"),
                }
            }
        }
        Value::Array(rows) => {
            for row in rows {
                match (row_name(row), coerce_record(row)) {
                    (Some(name), Some(record)) => {
                        records.insert(name.to_string(), record);
                    }
                    _ => warn!("skipping malformed runtime row"),
                }
            }
        }
        _ => anyhow::bail!(
            "runtime data file {} must hold a JSON object or array",
            path.display()
        ),
    }
    Ok(records)
}

/// Attach runtime evidence to every entity.
pub fn map_runtime_evidence(
    entities: &[Entity],
    records: Option<&HashMap<String, RuntimeRecord>>,
) -> BTreeMap<String, RuntimeEvidence> {
    let mut evidence = BTreeMap::new();
    for entity in entities {
        let record = records.and_then(|records| {
            records
                .get(&entity.qualified_name)
                .or_else(|| records.get(&entity.name))
        });
        let item = match (records, record) {
            (_, Some(record)) => RuntimeEvidence {
                entity_id: entity.id.clone(),
                invocation_count: Some(record.invocations),
                last_invoked_at: record.last_invoked_at.clone(),
                source: SOURCE_FILE.to_string(),
            },
            (Some(_), None) => RuntimeEvidence {
                entity_id: entity.id.clone(),
                invocation_count: None,
                last_invoked_at: None,
                source: SOURCE_UNMAPPED.to_string(),
            },
            (None, None) => RuntimeEvidence {
                entity_id: entity.id.clone(),
                invocation_count: None,
                last_invoked_at: None,
                source: SOURCE_UNAVAILABLE.to_string(),
            },
        };
        evidence.insert(entity.id.clone(), item);
    }
    evidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::deterministic_entity_id;
    use tempfile::tempdir;

    fn entity(name: &str, qualified: &str) -> Entity {
        Entity {
            id: deterministic_entity_id("app/api.py", qualified, 1),
            file_path: "app/api.py".to_string(),
            name: name.to_string(),
            qualified_name: qualified.to_string(),
            line_start: 1,
            line_end: 3,
            source: String::new(),
        }
    }

    fn load_inline(json: &str) -> HashMap<String, RuntimeRecord> {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("runtime.json");
        std::fs::write(&path, json).expect("write");
        load_runtime_data(&path).expect("load")
    }

    #[test]
    fn test_functions_wrapper_shape() {
        let records = load_inline(
            r#"{"functions": {"app.api.handler": {"invocations": 12, "last_invoked_at": "2026-08-01T00:00:00Z"}}}"#,
        );
        let record = records.get("app.api.handler").expect("record");
        assert_eq!(record.invocations, 12);
        assert_eq!(
            record.last_invoked_at.as_deref(),
            Some("2026-08-01T00:00:00Z")
        );
    }

    #[test]
    fn test_flat_object_with_bare_counts() {
        let records = load_inline(r#"{"handler": 7, "helper": {"count": 0}}"#);
        assert_eq!(records.get("handler").expect("handler").invocations, 7);
        assert_eq!(records.get("helper").expect("helper").invocations, 0);
    }

    #[test]
    fn test_row_list_shape() {
        let records =
            load_inline(r#"[{"name": "handler", "invocations": 3}, {"function": "helper", "count": 1}]"#);
        assert_eq!(records.get("handler").expect("handler").invocations, 3);
        assert_eq!(records.get("helper").expect("helper").invocations, 1);
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let records = load_inline(r#"{"good": 2, "bad": "lots", "worse": [1]}"#);
        assert_eq!(records.len(), 1);
        assert!(records.contains_key("good"));
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("runtime.json");
        std::fs::write(&path, "not json").expect("write");
        assert!(load_runtime_data(&path).is_err());
    }

    #[test]
    fn test_mapping_prefers_qualified_name() {
        let entity = entity("handler", "app.api.handler");
        let mut records = HashMap::new();
        records.insert(
            "handler".to_string(),
            RuntimeRecord {
                invocations: 1,
                last_invoked_at: None,
            },
        );
        records.insert(
            "app.api.handler".to_string(),
            RuntimeRecord {
                invocations: 9,
                last_invoked_at: None,
            },
        );
        let evidence = map_runtime_evidence(std::slice::from_ref(&entity), Some(&records));
        let item = evidence.get(&entity.id).expect("evidence");
        assert_eq!(item.invocation_count, Some(9));
        assert_eq!(item.source, SOURCE_FILE);
    }

    #[test]
    fn test_unmapped_and_unavailable_sources() {
        let entity = entity("orphan", "app.api.orphan");
        let records = HashMap::new();

        let with_profile = map_runtime_evidence(std::slice::from_ref(&entity), Some(&records));
        let item = with_profile.get(&entity.id).expect("evidence");
        assert_eq!(item.invocation_count, None);
        assert_eq!(item.source, SOURCE_UNMAPPED);

        let without_profile = map_runtime_evidence(std::slice::from_ref(&entity), None);
        let item = without_profile.get(&entity.id).expect("evidence");
        assert_eq!(item.invocation_count, None);
        assert_eq!(item.source, SOURCE_UNAVAILABLE);
    }

    #[test]
    fn test_partial_profile_leaves_uncovered_entities_unknown() {
        let entity = entity("handler", "app.api.handler");
        let mut records = HashMap::new();
        records.insert(
            "other.module.other_function".to_string(),
            RuntimeRecord {
                invocations: 10,
                last_invoked_at: None,
            },
        );
        let evidence = map_runtime_evidence(std::slice::from_ref(&entity), Some(&records));
        let item = evidence.get(&entity.id).expect("evidence");
        assert_eq!(item.invocation_count, None);
        assert_eq!(item.source, SOURCE_UNMAPPED);
    }
}
