// Local store backed by SQLite

use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use geoalign_recon::model::{LocalRecord, RecordPatch};
use geoalign_recon::store::{Field, LocalStore, Predicate, StoreError, Value, WriteOutcome};
use geoalign_recon::table::{AdjacencyRule, TableDescriptor};

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS continent (
    id INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE,
    defaultname TEXT,
    externalid TEXT,
    archived INTEGER NOT NULL DEFAULT 0,
    centrally_managed INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS subcontinent (
    id INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE,
    defaultname TEXT,
    externalid TEXT,
    archived INTEGER NOT NULL DEFAULT 0,
    centrally_managed INTEGER NOT NULL DEFAULT 0,
    continent_id INTEGER REFERENCES continent(id)
);

CREATE TABLE IF NOT EXISTS country (
    id INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE,
    defaultname TEXT,
    externalid TEXT,
    isocode TEXT,
    unocode TEXT,
    archived INTEGER NOT NULL DEFAULT 0,
    centrally_managed INTEGER NOT NULL DEFAULT 0,
    subcontinent_id INTEGER REFERENCES subcontinent(id)
);

CREATE TABLE IF NOT EXISTS region (
    id INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE,
    name TEXT,
    externalid TEXT,
    archived INTEGER NOT NULL DEFAULT 0,
    centrally_managed INTEGER NOT NULL DEFAULT 0,
    country_id INTEGER REFERENCES country(id)
);

CREATE TABLE IF NOT EXISTS district (
    id INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE,
    name TEXT,
    externalid TEXT,
    archived INTEGER NOT NULL DEFAULT 0,
    centrally_managed INTEGER NOT NULL DEFAULT 0,
    region_id INTEGER REFERENCES region(id)
);

CREATE TABLE IF NOT EXISTS community (
    id INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE,
    name TEXT,
    externalid TEXT,
    archived INTEGER NOT NULL DEFAULT 0,
    centrally_managed INTEGER NOT NULL DEFAULT 0,
    district_id INTEGER REFERENCES district(id)
);

CREATE TABLE IF NOT EXISTS facility (
    id INTEGER PRIMARY KEY,
    name TEXT,
    community_id INTEGER REFERENCES community(id)
);

CREATE TABLE IF NOT EXISTS featureconfiguration (
    featuretype TEXT PRIMARY KEY,
    enabled INTEGER NOT NULL DEFAULT 1
);

INSERT OR IGNORE INTO featureconfiguration (featuretype, enabled)
    VALUES ('EDIT_INFRASTRUCTURE_DATA', 1);
"#;

/// Feature row switched off while a table is quarantined.
pub const MANUAL_EDIT_FEATURE: &str = "EDIT_INFRASTRUCTURE_DATA";

fn store_err(e: rusqlite::Error) -> StoreError {
    StoreError::new(e.to_string())
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(store_err)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Ok(Self { conn })
    }

    /// Open (creating if needed) and make sure every table exists.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        let store = Self::open(path)?;
        store.init_schema()?;
        Ok(store)
    }

    pub fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA).map_err(store_err)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn manual_edits_enabled(&self) -> Result<bool, StoreError> {
        let enabled: Option<bool> = self
            .conn
            .query_row(
                "SELECT enabled FROM featureconfiguration WHERE featuretype = ?1",
                params![MANUAL_EDIT_FEATURE],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        Ok(enabled.unwrap_or(true))
    }
}

// ---------------------------------------------------------------------------
// Predicate translation
// ---------------------------------------------------------------------------

/// Render `predicate` as a WHERE clause with anonymous `?` placeholders,
/// appending the bound values to `params` in order.
pub fn where_clause(predicate: &Predicate, desc: &TableDescriptor, params: &mut Vec<SqlValue>) -> String {
    match predicate {
        Predicate::Eq(field, value) => {
            if matches!(field, Field::IsoCode | Field::UnoCode) && !desc.secondary_codes {
                // Column does not exist for this kind; a NULL never matches.
                return "0".into();
            }
            params.push(match value {
                Value::Int(v) => SqlValue::Integer(*v),
                Value::Text(s) => SqlValue::Text(s.clone()),
            });
            format!("{} = ?", field.column(desc))
        }
        Predicate::Any(preds) if preds.is_empty() => "0".into(),
        Predicate::All(preds) if preds.is_empty() => "1".into(),
        Predicate::Any(preds) => join(preds, " OR ", desc, params),
        Predicate::All(preds) => join(preds, " AND ", desc, params),
    }
}

fn join(preds: &[Predicate], sep: &str, desc: &TableDescriptor, params: &mut Vec<SqlValue>) -> String {
    let parts: Vec<String> = preds.iter().map(|p| where_clause(p, desc, params)).collect();
    format!("({})", parts.join(sep))
}

fn select_columns(desc: &TableDescriptor) -> String {
    let (iso, uno) = if desc.secondary_codes {
        ("isocode", "unocode")
    } else {
        ("NULL", "NULL")
    };
    format!(
        "id, uuid, {}, externalid, archived, centrally_managed, {iso}, {uno}, {}",
        desc.name_column(),
        desc.parent_column().unwrap_or("NULL")
    )
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LocalRecord> {
    Ok(LocalRecord {
        row_id: row.get(0)?,
        identity_key: row.get(1)?,
        display_name: row.get(2)?,
        external_id: row.get(3)?,
        archived: row.get(4)?,
        centrally_managed: row.get(5)?,
        iso_code: row.get(6)?,
        uno_code: row.get(7)?,
        parent_row_id: row.get(8)?,
    })
}

/// Column assignments shared by update and insert: (column, SQL expression,
/// bound values). With `keep_parent`, an unknown parent keeps whatever the
/// row already references.
fn patch_columns(
    desc: &TableDescriptor,
    patch: &RecordPatch,
    keep_parent: bool,
) -> Vec<(String, String, Vec<SqlValue>)> {
    let text = |s: &str| SqlValue::Text(s.to_string());
    let opt = |s: &Option<String>| s.as_ref().map_or(SqlValue::Null, |v| SqlValue::Text(v.clone()));

    let mut cols = vec![
        ("uuid".to_string(), "?".to_string(), vec![text(&patch.identity_key)]),
        (desc.name_column().to_string(), "?".to_string(), vec![text(&patch.display_name)]),
        ("externalid".to_string(), "?".to_string(), vec![text(&patch.external_id)]),
    ];
    if let Some(codes) = &patch.codes {
        cols.push(("isocode".into(), "?".into(), vec![opt(&codes.iso_code)]));
        cols.push(("unocode".into(), "?".into(), vec![opt(&codes.uno_code)]));
    }
    if let (Some(parent), Some(column)) = (&patch.parent, desc.parent_column()) {
        let lookup = format!("(SELECT id FROM {} WHERE uuid = ?)", parent.kind.table_name());
        let expr = if keep_parent {
            format!("COALESCE({lookup}, {column})")
        } else {
            lookup
        };
        cols.push((column.to_string(), expr, vec![text(&parent.identity_key)]));
    }
    cols
}

impl LocalStore for SqliteStore {
    fn find(&self, desc: &TableDescriptor, predicate: &Predicate) -> Result<Vec<LocalRecord>, StoreError> {
        let mut params = Vec::new();
        let clause = where_clause(predicate, desc, &mut params);
        let sql = format!(
            "SELECT {} FROM {} WHERE {clause} ORDER BY id",
            select_columns(desc),
            desc.table_name()
        );
        let mut stmt = self.conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), read_row)
            .map_err(store_err)?;
        let records = rows.collect::<Result<Vec<_>, _>>().map_err(store_err)?;
        Ok(records)
    }

    fn count(&self, desc: &TableDescriptor, predicate: &Predicate) -> Result<usize, StoreError> {
        let mut params = Vec::new();
        let clause = where_clause(predicate, desc, &mut params);
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {clause}", desc.table_name());
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))
            .map_err(store_err)?;
        Ok(count as usize)
    }

    fn update(
        &mut self,
        desc: &TableDescriptor,
        predicate: &Predicate,
        patch: &RecordPatch,
    ) -> Result<WriteOutcome, StoreError> {
        let mut params = Vec::new();
        let mut sets = Vec::new();
        for (column, expr, values) in patch_columns(desc, patch, true) {
            sets.push(format!("{column} = {expr}"));
            params.extend(values);
        }
        sets.push("archived = 0".into());
        let clause = where_clause(predicate, desc, &mut params);
        let sql = format!("UPDATE {} SET {} WHERE {clause}", desc.table_name(), sets.join(", "));

        match self.conn.execute(&sql, params_from_iter(params.iter())) {
            Ok(rows) => Ok(WriteOutcome::Applied { rows }),
            Err(e) if is_unique_violation(&e) => Ok(WriteOutcome::UniqueViolation { detail: e.to_string() }),
            Err(e) => Err(store_err(e)),
        }
    }

    fn insert(&mut self, desc: &TableDescriptor, patch: &RecordPatch) -> Result<i64, StoreError> {
        let mut params = Vec::new();
        let mut columns = vec!["archived".to_string(), "centrally_managed".to_string()];
        let mut values = vec!["0".to_string(), "1".to_string()];
        for (column, expr, bound) in patch_columns(desc, patch, false) {
            columns.push(column);
            values.push(expr);
            params.extend(bound);
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            desc.table_name(),
            columns.join(", "),
            values.join(", ")
        );
        self.conn
            .execute(&sql, params_from_iter(params.iter()))
            .map_err(store_err)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn archive_all(&mut self, desc: &TableDescriptor) -> Result<usize, StoreError> {
        self.conn
            .execute(&format!("UPDATE {} SET archived = 1", desc.table_name()), [])
            .map_err(store_err)
    }

    fn disable_manual_edits(&mut self) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE featureconfiguration SET enabled = 0 WHERE featuretype = ?1",
                params![MANUAL_EDIT_FEATURE],
            )
            .map_err(store_err)?;
        Ok(())
    }

    fn has_dependents(&self, _desc: &TableDescriptor, rule: &AdjacencyRule, row_id: i64) -> Result<bool, StoreError> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)",
            rule.child_table, rule.foreign_key
        );
        self.conn
            .query_row(&sql, params![row_id], |row| row.get(0))
            .map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoalign_recon::model::{CentralRecord, ParentRef};
    use geoalign_recon::table::TableKind;
    use tempfile::tempdir;

    fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.init_schema().unwrap();
        store
    }

    fn central(key: &str, name: &str, ext: &str) -> CentralRecord {
        CentralRecord {
            identity_key: key.into(),
            display_name: name.into(),
            external_id: ext.into(),
            iso_code: None,
            uno_code: None,
            parent: None,
        }
    }

    #[test]
    fn where_clause_binds_values_in_order() {
        let desc = TableKind::Country.descriptor();
        let mut c = central("u1", "Germany", "DE");
        c.iso_code = Some("DEU".into());
        let mut params = Vec::new();
        let clause = where_clause(&Predicate::name_id_or_codes(&c), &desc, &mut params);
        assert_eq!(clause, "(defaultname = ? OR externalid = ? OR isocode = ?)");
        assert_eq!(
            params,
            vec![
                SqlValue::Text("Germany".into()),
                SqlValue::Text("DE".into()),
                SqlValue::Text("DEU".into()),
            ]
        );
    }

    #[test]
    fn codes_on_kinds_without_code_columns_never_match() {
        let desc = TableKind::Region.descriptor();
        let mut params = Vec::new();
        let clause = where_clause(&Predicate::eq(Field::IsoCode, "DEU"), &desc, &mut params);
        assert_eq!(clause, "0");
        assert!(params.is_empty());
    }

    #[test]
    fn find_uses_kind_name_column() {
        let s = store();
        s.connection()
            .execute_batch(
                "INSERT INTO country (id, uuid, defaultname, externalid, isocode) VALUES (1, 'c1', 'Germany', 'DE', 'DEU');
                 INSERT INTO region (id, uuid, name, externalid, country_id) VALUES (2, NULL, 'Bayern', '09', 1);",
            )
            .unwrap();

        let rows = s
            .find(&TableKind::Country.descriptor(), &Predicate::eq(Field::Name, "Germany"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].iso_code.as_deref(), Some("DEU"));

        let rows = s
            .find(&TableKind::Region.descriptor(), &Predicate::eq(Field::Name, "Bayern"))
            .unwrap();
        assert_eq!(rows[0].identity_key, None);
        assert_eq!(rows[0].parent_row_id, Some(1));
    }

    #[test]
    fn update_reports_unique_violation_as_outcome() {
        let mut s = store();
        s.connection()
            .execute_batch(
                "INSERT INTO district (id, uuid, name, externalid) VALUES (1, 'd1', 'Mitte', '11');
                 INSERT INTO district (id, uuid, name, externalid) VALUES (2, NULL, 'Nord', '12');",
            )
            .unwrap();
        let desc = TableKind::District.descriptor();
        let patch = RecordPatch::from_central(&desc, &central("d1", "Nord", "12"));

        let out = s.update(&desc, &Predicate::row_id(2), &patch).unwrap();
        assert!(matches!(out, WriteOutcome::UniqueViolation { .. }));
        let row = &s.find(&desc, &Predicate::row_id(2)).unwrap()[0];
        assert_eq!(row.identity_key, None);
    }

    #[test]
    fn update_multi_row_identity_is_rejected_atomically() {
        let mut s = store();
        s.connection()
            .execute_batch(
                "INSERT INTO community (id, name, externalid, archived) VALUES (1, 'Springfield', '41', 1);
                 INSERT INTO community (id, name, externalid, archived) VALUES (2, 'Springfield', '43', 1);",
            )
            .unwrap();
        let desc = TableKind::Community.descriptor();
        let patch = RecordPatch::from_central(&desc, &central("u1", "Springfield", "42"));

        let out = s.update(&desc, &Predicate::eq(Field::Name, "Springfield"), &patch).unwrap();
        assert!(matches!(out, WriteOutcome::UniqueViolation { .. }));
        assert_eq!(s.count(&desc, &Predicate::identity_key("u1")).unwrap(), 0);
        assert_eq!(s.count(&desc, &Predicate::eq(Field::ExternalId, "42")).unwrap(), 0);
    }

    #[test]
    fn update_resolves_parent_or_keeps_existing() {
        let mut s = store();
        s.connection()
            .execute_batch(
                "INSERT INTO district (id, uuid, name, externalid) VALUES (5, 'd1', 'Mitte', '11');
                 INSERT INTO district (id, uuid, name, externalid) VALUES (6, 'd2', 'Nord', '12');
                 INSERT INTO community (id, uuid, name, externalid, archived, district_id) VALUES (7, 'u0', 'Springfield', '42', 1, 6);",
            )
            .unwrap();
        let desc = TableKind::Community.descriptor();

        let mut c = central("u1", "Springfield", "42");
        c.parent = Some(ParentRef { kind: TableKind::District, identity_key: "unknown".into() });
        let out = s
            .update(&desc, &Predicate::row_id(7), &RecordPatch::from_central(&desc, &c))
            .unwrap();
        assert_eq!(out, WriteOutcome::Applied { rows: 1 });
        assert_eq!(s.find(&desc, &Predicate::row_id(7)).unwrap()[0].parent_row_id, Some(6));

        c.parent = Some(ParentRef { kind: TableKind::District, identity_key: "d1".into() });
        s.update(&desc, &Predicate::row_id(7), &RecordPatch::from_central(&desc, &c))
            .unwrap();
        let row = &s.find(&desc, &Predicate::row_id(7)).unwrap()[0];
        assert_eq!(row.parent_row_id, Some(5));
        assert_eq!(row.identity_key.as_deref(), Some("u1"));
        assert!(!row.archived);
    }

    #[test]
    fn insert_archive_and_feature_switch() {
        let mut s = store();
        let desc = TableKind::Country.descriptor();
        let mut c = central("c1", "Germany", "DE");
        c.iso_code = Some("DEU".into());

        let id = s.insert(&desc, &RecordPatch::from_central(&desc, &c)).unwrap();
        let row = &s.find(&desc, &Predicate::row_id(id)).unwrap()[0];
        assert!(row.centrally_managed);
        assert!(!row.archived);
        assert_eq!(row.iso_code.as_deref(), Some("DEU"));
        assert_eq!(row.parent_row_id, None);
        assert!(s.insert(&desc, &RecordPatch::from_central(&desc, &c)).is_err());

        assert_eq!(s.archive_all(&desc).unwrap(), 1);
        assert!(s.find(&desc, &Predicate::row_id(id)).unwrap()[0].archived);

        assert!(s.manual_edits_enabled().unwrap());
        s.disable_manual_edits().unwrap();
        assert!(!s.manual_edits_enabled().unwrap());
    }

    #[test]
    fn dependents_via_facility() {
        let s = store();
        s.connection()
            .execute_batch(
                "INSERT INTO community (id, name, externalid) VALUES (1, 'A', '1');
                 INSERT INTO community (id, name, externalid) VALUES (2, 'A', '2');
                 INSERT INTO facility (id, name, community_id) VALUES (10, 'Clinic', 2);",
            )
            .unwrap();
        let desc = TableKind::Community.descriptor();
        assert!(!s.has_dependents(&desc, &AdjacencyRule::FACILITY, 1).unwrap());
        assert!(s.has_dependents(&desc, &AdjacencyRule::FACILITY, 2).unwrap());
    }

    #[test]
    fn create_on_disk_is_reopenable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("local.db");
        {
            let mut s = SqliteStore::create(&path).unwrap();
            let desc = TableKind::Continent.descriptor();
            s.insert(&desc, &RecordPatch::from_central(&desc, &central("k1", "Europe", "EU")))
                .unwrap();
        }
        let s = SqliteStore::create(&path).unwrap();
        let desc = TableKind::Continent.descriptor();
        assert_eq!(s.count(&desc, &Predicate::identity_key("k1")).unwrap(), 1);
    }
}
