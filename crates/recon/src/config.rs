use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ReconError;
use crate::table::TableKind;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlignConfig {
    #[serde(default)]
    pub options: RunOptions,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

// ---------------------------------------------------------------------------
// Run options
// ---------------------------------------------------------------------------

/// Switches the engine receives for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunOptions {
    /// Simulate every write and report what would change.
    pub dry_run: bool,
    /// Record manual-cleanup collisions and carry on instead of aborting.
    /// The colliding rows stay archived.
    pub archive_on_conflict: bool,
    /// Settle community collisions by looking for attached facilities.
    pub adjacency_resolution: bool,
}

// ---------------------------------------------------------------------------
// Snapshot + store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_root")]
    pub root: String,
    /// Per-table file overrides, relative to `root`, keyed by table name.
    #[serde(default, deserialize_with = "deserialize_files")]
    pub files: BTreeMap<TableKind, String>,
}

// Keys go through `TableKind::from_str`, the same parser the CLI uses, so
// `Community` and `community` name the same table.
fn deserialize_files<'de, D>(deserializer: D) -> Result<BTreeMap<TableKind, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    let mut files = BTreeMap::new();
    for (table, file) in raw {
        let kind = TableKind::from_str(&table)
            .map_err(|e| serde::de::Error::custom(format!("snapshot.files: {e}")))?;
        if files.insert(kind, file).is_some() {
            return Err(serde::de::Error::custom(format!(
                "snapshot.files: table '{kind}' given more than once"
            )));
        }
    }
    Ok(files)
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            root: default_snapshot_root(),
            files: BTreeMap::new(),
        }
    }
}

fn default_snapshot_root() -> String {
    "data".into()
}

/// Where each table's central snapshot lives under the snapshot root.
pub fn default_relative_path(kind: TableKind) -> &'static str {
    match kind {
        TableKind::Continent => "international/continent.json",
        TableKind::Subcontinent => "international/subcontinent.json",
        TableKind::Country => "germany/country.json",
        TableKind::Region => "germany/region.json",
        TableKind::District => "germany/district.json",
        TableKind::Community => "germany/community.json",
    }
}

impl SnapshotConfig {
    pub fn relative_path(&self, kind: TableKind) -> &str {
        self.files
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| default_relative_path(kind))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

fn default_store_path() -> String {
    "geoalign.db".into()
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl AlignConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: AlignConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.snapshot.root.trim().is_empty() {
            return Err(ReconError::ConfigValidation("snapshot.root must not be empty".into()));
        }
        if self.store.path.trim().is_empty() {
            return Err(ReconError::ConfigValidation("store.path must not be empty".into()));
        }

        for (table, file) in &self.snapshot.files {
            if file.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "snapshot.files.{table} must not be empty"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
