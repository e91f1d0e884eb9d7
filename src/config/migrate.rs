//! Forward-only schema migrations applied to the untyped document before
//! typed deserialization.
use serde_json::{Map, Value};
use tracing::info;

use crate::config::models::CURRENT_SCHEMA_VERSION;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum MigrationError {
    #[error("Schema version {found} is newer than the supported version {supported}")]
    Unsupported { found: u64, supported: u32 },

    #[error("Invalid schema_version: {0}")]
    InvalidVersion(String),

    #[error("Configuration root must be an object")]
    NotAnObject,
}

type Step = fn(&mut Map<String, Value>);

/// `(from_version, step)`: each step upgrades `from_version` to `from_version + 1`.
const STEPS: &[(u32, Step)] = &[(1, log_level_into_section), (2, rename_anytls_padding)];

/// v1 kept the log level at the top level.
fn log_level_into_section(doc: &mut Map<String, Value>) {
    let Some(level) = doc.remove("log_level") else {
        return;
    };
    let log = doc
        .entry("log")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(log) = log {
        log.entry("level").or_insert(level);
    }
}

/// v2 called the AnyTLS preset selector `padding`.
fn rename_anytls_padding(doc: &mut Map<String, Value>) {
    if let Some(Value::Object(anytls)) = doc.get_mut("anytls") {
        if let Some(padding) = anytls.remove("padding") {
            anytls.entry("padding_scheme").or_insert(padding);
        }
    }
}

fn declared_version(doc: &Map<String, Value>) -> Result<u64, MigrationError> {
    match doc.get("schema_version") {
        None | Some(Value::Null) => Ok(1),
        Some(Value::Number(n)) => n
            .as_u64()
            .filter(|v| *v >= 1)
            .ok_or_else(|| MigrationError::InvalidVersion(n.to_string())),
        // INI and some YAML sources deliver numbers as strings
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|v| *v >= 1)
            .ok_or_else(|| MigrationError::InvalidVersion(s.clone())),
        Some(other) => Err(MigrationError::InvalidVersion(other.to_string())),
    }
}

/// Bring `doc` up to [`CURRENT_SCHEMA_VERSION`]. Returns the version it started at.
pub fn migrate(doc: &mut Value) -> Result<u32, MigrationError> {
    let Value::Object(map) = doc else {
        return Err(MigrationError::NotAnObject);
    };

    let found = declared_version(map)?;
    if found > u64::from(CURRENT_SCHEMA_VERSION) {
        return Err(MigrationError::Unsupported {
            found,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    let start = found as u32;

    for (from, step) in STEPS.iter().filter(|(from, _)| *from >= start) {
        step(map);
        info!(from = *from, to = *from + 1, "Migrated configuration schema");
    }
    map.insert(
        "schema_version".to_string(),
        Value::from(CURRENT_SCHEMA_VERSION),
    );
    Ok(start)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn v1_document_runs_every_step() {
        let mut doc = json!({
            "log_level": "debug",
            "anytls": { "enabled": true, "padding": "video" }
        });
        assert_eq!(migrate(&mut doc).unwrap(), 1);
        assert_eq!(doc["log"]["level"], "debug");
        assert!(doc.get("log_level").is_none());
        assert_eq!(doc["anytls"]["padding_scheme"], "video");
        assert!(doc["anytls"].get("padding").is_none());
        assert_eq!(doc["schema_version"], CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn v2_document_skips_first_step() {
        let mut doc = json!({
            "schema_version": 2,
            "log_level": "debug",
            "anytls": { "padding": "minimal" }
        });
        assert_eq!(migrate(&mut doc).unwrap(), 2);
        // v2 never had a top-level log level; leave unknown keys alone
        assert_eq!(doc["log_level"], "debug");
        assert_eq!(doc["anytls"]["padding_scheme"], "minimal");
    }

    #[test]
    fn existing_section_wins_over_legacy_key() {
        let mut doc = json!({ "log_level": "debug", "log": { "level": "error" } });
        migrate(&mut doc).unwrap();
        assert_eq!(doc["log"]["level"], "error");
    }

    #[test]
    fn current_document_unchanged() {
        let mut doc = json!({ "schema_version": 3, "uuid": "u" });
        let before = doc.clone();
        assert_eq!(migrate(&mut doc).unwrap(), 3);
        assert_eq!(doc, before);
    }

    #[test]
    fn newer_version_rejected() {
        let mut doc = json!({ "schema_version": 99 });
        assert_eq!(
            migrate(&mut doc).unwrap_err(),
            MigrationError::Unsupported {
                found: 99,
                supported: CURRENT_SCHEMA_VERSION
            }
        );
    }

    #[test]
    fn string_version_accepted() {
        let mut doc = json!({ "schema_version": "2" });
        assert_eq!(migrate(&mut doc).unwrap(), 2);

        let mut doc = json!({ "schema_version": "two" });
        assert!(matches!(
            migrate(&mut doc),
            Err(MigrationError::InvalidVersion(_))
        ));
    }

    #[test]
    fn non_object_root_rejected() {
        let mut doc = json!([1, 2, 3]);
        assert_eq!(migrate(&mut doc).unwrap_err(), MigrationError::NotAnObject);
    }
}
