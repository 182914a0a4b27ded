// Central snapshot files: one JSON array of `{ "key", "value" }` per table

use std::path::{Path, PathBuf};

use geoalign_recon::config::SnapshotConfig;
use geoalign_recon::{CentralEntry, ReconError, Snapshot, TableKind};

pub fn table_path(config: &SnapshotConfig, kind: TableKind) -> PathBuf {
    Path::new(&config.root).join(config.relative_path(kind))
}

pub fn load_entries(path: &Path) -> Result<Vec<CentralEntry>, ReconError> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| ReconError::Io(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&data).map_err(|e| ReconError::Snapshot(format!("{}: {e}", path.display())))
}

pub fn load_table(config: &SnapshotConfig, kind: TableKind) -> Result<Vec<CentralEntry>, ReconError> {
    let path = table_path(config, kind);
    let entries = load_entries(&path)?;
    log::info!("Loaded {} {kind} entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// Load every table of the hierarchy. All six files must exist.
pub fn load_snapshot(config: &SnapshotConfig) -> Result<Snapshot, ReconError> {
    let mut snapshot = Snapshot::new();
    for kind in TableKind::HIERARCHY {
        snapshot.insert(kind, load_table(config, kind)?);
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, relative: &str, body: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn write_all(root: &Path) {
        for kind in TableKind::HIERARCHY {
            write(root, geoalign_recon::config::default_relative_path(kind), "[]");
        }
    }

    #[test]
    fn loads_default_layout_with_override() {
        let dir = tempdir().unwrap();
        write_all(dir.path());
        write(
            dir.path(),
            "germany/community-2024.json",
            r#"[{"key": "u1", "value": {"name": "Springfield", "externalId": "42"}}]"#,
        );

        let mut config = SnapshotConfig {
            root: dir.path().display().to_string(),
            ..Default::default()
        };
        config
            .files
            .insert(TableKind::Community, "germany/community-2024.json".into());

        let snapshot = load_snapshot(&config).unwrap();
        assert_eq!(snapshot.entries(TableKind::Community).len(), 1);
        assert_eq!(snapshot.entries(TableKind::Community)[0].key, "u1");
        assert!(snapshot.entries(TableKind::Country).is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let config = SnapshotConfig {
            root: dir.path().display().to_string(),
            ..Default::default()
        };
        let err = load_snapshot(&config).unwrap_err();
        assert!(matches!(err, ReconError::Io(_)));
        assert!(err.to_string().contains("continent.json"));
    }

    #[test]
    fn malformed_json_is_snapshot_error() {
        let dir = tempdir().unwrap();
        write(dir.path(), "bad.json", r#"{"key": "u1"}"#);
        let err = load_entries(&dir.path().join("bad.json")).unwrap_err();
        assert!(matches!(err, ReconError::Snapshot(_)));
    }
}
