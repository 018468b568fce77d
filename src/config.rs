use std::path::Path;

use serde::Deserialize;

use crate::error::EngineError;

/// Validated result of loading the `-c` file: the database path and the
/// configured groups in declaration order.
///
/// The on-disk shape is:
/// ```json
/// {
///   "database": "/var/lib/mqtt-db-logger/db.sqlite",
///   "groups": {
///     "default": {
///       "channels": ["/devices/+/controls/+"],
///       "values": 1000,
///       "min_interval": 1
///     }
///   }
/// }
/// ```
/// There is no `#[derive(Deserialize)]` type mirroring this shape directly:
/// a `HashMap<String, RawGroupConfig>` would lose the `groups` object's key
/// order, which the Ingestor depends on (it matches groups in configuration
/// order and takes the first pattern match). `load` instead walks a raw
/// `serde_json::Value` — whose `Map` is backed by an order-preserving
/// `IndexMap` under the `preserve_order` feature enabled in `Cargo.toml` —
/// and deserializes one `RawGroupConfig` per object entry in that order.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub database: String,
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawGroupConfig {
    pub channels: Vec<String>,
    #[serde(default)]
    pub values: i64,
    #[serde(default)]
    pub values_total: i64,
    #[serde(default)]
    pub min_interval: i64,
    #[serde(default)]
    pub min_unchanged_interval: i64,
}

/// A single configured logging group, validated and ready for the engine.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    pub name: String,
    pub patterns: Vec<String>,
    pub values: u32,
    pub values_total: u32,
    pub min_interval_secs: u32,
    pub min_unchanged_interval_secs: u32,
}

impl LoggerConfig {
    /// Load and validate a config file, returning the database path and the
    /// configured groups in on-disk order — the Ingestor matches groups in
    /// this order and takes the first pattern match, so order is load-
    /// bearing. With the `preserve_order` feature on, `serde_json::Value`'s
    /// `Map` is backed by an `IndexMap` and keeps object key order as read
    /// off text, so groups are walked off the raw value in declaration
    /// order rather than through a `HashMap`, which would not preserve it.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {e}", path.display())))?;

        let raw: serde_json::Value = serde_json::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("invalid JSON: {e}")))?;

        let database = raw
            .get("database")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                EngineError::Config("database location should be specified in config".into())
            })?
            .to_string();

        let groups_obj = raw
            .get("groups")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();

        let mut groups = Vec::with_capacity(groups_obj.len());
        for (name, item) in groups_obj {
            let raw_group: RawGroupConfig = serde_json::from_value(item)
                .map_err(|e| EngineError::Config(format!("group '{name}': {e}")))?;

            if raw_group.channels.is_empty() {
                return Err(EngineError::Config(format!(
                    "group '{name}': no channels specified for group"
                ))
                .into());
            }

            let values = non_negative(&name, "values", raw_group.values)?;
            let values_total = non_negative(&name, "values_total", raw_group.values_total)?;
            let min_interval = non_negative(&name, "min_interval", raw_group.min_interval)?;
            let min_unchanged_interval =
                non_negative(&name, "min_unchanged_interval", raw_group.min_unchanged_interval)?;

            groups.push(GroupConfig {
                name,
                patterns: raw_group.channels,
                values,
                values_total,
                min_interval_secs: min_interval,
                min_unchanged_interval_secs: min_unchanged_interval,
            });
        }

        tracing::info!(
            groups = groups.len(),
            database = %database,
            "loaded config from {}",
            path.display()
        );

        Ok(Self { database, groups })
    }
}

fn non_negative(group: &str, field: &str, value: i64) -> anyhow::Result<u32> {
    if value < 0 {
        return Err(EngineError::Config(format!(
            "group '{group}': '{field}' must be positive or zero"
        ))
        .into());
    }
    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_minimal_config() {
        let f = write_tmp(r#"{"database": "/tmp/x.db", "groups": {"g": {"channels": ["/a/+/b/+"]}}}"#);
        let config = LoggerConfig::load(f.path()).unwrap();
        assert_eq!(config.database, "/tmp/x.db");
        assert_eq!(config.groups.len(), 1);
        assert_eq!(config.groups[0].name, "g");
        assert_eq!(config.groups[0].values, 0);
    }

    #[test]
    fn groups_are_returned_in_declaration_order_not_alphabetical() {
        // "zzz" sorts after "default" alphabetically but is declared first;
        // a BTreeMap-backed `Map` would silently reorder this to
        // ["default", "zzz"], breaking first-match-wins group selection.
        let f = write_tmp(
            r#"{"database": "/tmp/x.db", "groups": {
                "zzz": {"channels": ["/devices/+/controls/+"]},
                "default": {"channels": ["/devices/#"]}
            }}"#,
        );
        let config = LoggerConfig::load(f.path()).unwrap();
        let names: Vec<&str> = config.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["zzz", "default"]);
    }

    #[test]
    fn rejects_negative_limit() {
        let f = write_tmp(
            r#"{"database": "/tmp/x.db", "groups": {"g": {"channels": ["/a"], "values": -1}}}"#,
        );
        let err = LoggerConfig::load(f.path()).unwrap_err();
        assert!(err.to_string().contains("must be positive or zero"));
    }

    #[test]
    fn loads_group_limits() {
        let f = write_tmp(
            r#"{"database": "/tmp/x.db", "groups": {"g": {"channels": ["/a"], "values": 5}}}"#,
        );
        let config = LoggerConfig::load(f.path()).unwrap();
        assert_eq!(config.groups[0].values, 5);
    }

    #[test]
    fn rejects_missing_database() {
        let f = write_tmp(r#"{"groups": {}}"#);
        let err = LoggerConfig::load(f.path()).unwrap_err();
        assert!(err.to_string().contains("database location"));
    }

    #[test]
    fn rejects_group_without_channels() {
        let f = write_tmp(r#"{"database": "/tmp/x.db", "groups": {"g": {"channels": []}}}"#);
        let err = LoggerConfig::load(f.path()).unwrap_err();
        assert!(err.to_string().contains("no channels specified"));
    }
}
