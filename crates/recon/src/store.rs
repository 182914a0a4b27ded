//! Storage abstraction for the local store.
//!
//! The engine never builds query text. It hands typed [`Predicate`]s to a
//! [`LocalStore`], and each backend evaluates them its own way: `MemoryStore`
//! below checks rows directly, while the SQLite backend in `geoalign-io`
//! translates them to SQL.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::model::{CentralRecord, LocalRecord, ParentRef, RecordPatch};
use crate::table::{AdjacencyRule, TableDescriptor, TableKind};

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// Abstract column. `Name` resolves to the table kind's name column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    RowId,
    IdentityKey,
    Name,
    ExternalId,
    IsoCode,
    UnoCode,
}

impl Field {
    pub fn column(&self, desc: &TableDescriptor) -> &'static str {
        match self {
            Self::RowId => "id",
            Self::IdentityKey => "uuid",
            Self::Name => desc.name_column(),
            Self::ExternalId => "externalid",
            Self::IsoCode => "isocode",
            Self::UnoCode => "unocode",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Text(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Eq(Field, Value),
    /// Logical OR. Empty matches nothing.
    Any(Vec<Predicate>),
    /// Logical AND. Empty matches everything.
    All(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(field: Field, value: impl Into<Value>) -> Self {
        Self::Eq(field, value.into())
    }

    pub fn row_id(row_id: i64) -> Self {
        Self::eq(Field::RowId, row_id)
    }

    pub fn identity_key(key: &str) -> Self {
        Self::eq(Field::IdentityKey, key)
    }

    /// Loose duplicates: name OR external id.
    pub fn name_or_external_id(central: &CentralRecord) -> Self {
        Self::Any(vec![
            Self::eq(Field::Name, central.display_name.as_str()),
            Self::eq(Field::ExternalId, central.external_id.as_str()),
        ])
    }

    /// True duplicates: name AND external id.
    pub fn name_and_external_id(central: &CentralRecord) -> Self {
        Self::All(vec![
            Self::eq(Field::Name, central.display_name.as_str()),
            Self::eq(Field::ExternalId, central.external_id.as_str()),
        ])
    }

    /// Name OR external id OR whichever secondary codes central carries.
    pub fn name_id_or_codes(central: &CentralRecord) -> Self {
        let mut any = vec![
            Self::eq(Field::Name, central.display_name.as_str()),
            Self::eq(Field::ExternalId, central.external_id.as_str()),
        ];
        if let Some(iso) = &central.iso_code {
            any.push(Self::eq(Field::IsoCode, iso.as_str()));
        }
        if let Some(uno) = &central.uno_code {
            any.push(Self::eq(Field::UnoCode, uno.as_str()));
        }
        Self::Any(any)
    }

    pub fn matches(&self, row: &LocalRecord) -> bool {
        match self {
            Self::Eq(field, value) => field_matches(row, *field, value),
            Self::Any(preds) => preds.iter().any(|p| p.matches(row)),
            Self::All(preds) => preds.iter().all(|p| p.matches(row)),
        }
    }

    /// SQL-like rendering for diagnostics, e.g. `name='Nord' OR externalid='7'`.
    pub fn describe(&self, desc: &TableDescriptor) -> String {
        match self {
            Self::Eq(field, value) => format!("{}={value}", field.column(desc)),
            Self::Any(preds) if preds.is_empty() => "FALSE".into(),
            Self::All(preds) if preds.is_empty() => "TRUE".into(),
            Self::Any(preds) => join_described(preds, " OR ", desc),
            Self::All(preds) => join_described(preds, " AND ", desc),
        }
    }
}

fn join_described(preds: &[Predicate], sep: &str, desc: &TableDescriptor) -> String {
    preds
        .iter()
        .map(|p| match p {
            Predicate::Eq(..) => p.describe(desc),
            _ => format!("({})", p.describe(desc)),
        })
        .collect::<Vec<_>>()
        .join(sep)
}

fn field_matches(row: &LocalRecord, field: Field, value: &Value) -> bool {
    let text = |col: &Option<String>| match value {
        Value::Text(v) => col.as_deref() == Some(v.as_str()),
        Value::Int(_) => false,
    };
    match field {
        Field::RowId => matches!(value, Value::Int(id) if *id == row.row_id),
        Field::IdentityKey => text(&row.identity_key),
        Field::Name => text(&row.display_name),
        Field::ExternalId => text(&row.external_id),
        Field::IsoCode => text(&row.iso_code),
        Field::UnoCode => text(&row.uno_code),
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StoreError {}

/// Result of a conditional write. A uniqueness violation is an outcome the
/// engine acts on, so it is returned as a value rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied { rows: usize },
    UniqueViolation { detail: String },
}

pub trait LocalStore {
    /// Rows matching `predicate`, ascending by row id.
    fn find(&self, desc: &TableDescriptor, predicate: &Predicate) -> Result<Vec<LocalRecord>, StoreError>;

    fn count(&self, desc: &TableDescriptor, predicate: &Predicate) -> Result<usize, StoreError>;

    /// Apply `patch` to every row matching `predicate`, all or nothing.
    fn update(
        &mut self,
        desc: &TableDescriptor,
        predicate: &Predicate,
        patch: &RecordPatch,
    ) -> Result<WriteOutcome, StoreError>;

    /// Insert a new centrally managed, non-archived row. Returns its row id.
    fn insert(&mut self, desc: &TableDescriptor, patch: &RecordPatch) -> Result<i64, StoreError>;

    /// Mark every row of the table archived. Returns the number of rows.
    fn archive_all(&mut self, desc: &TableDescriptor) -> Result<usize, StoreError>;

    /// Switch off manual editing of infrastructure data.
    fn disable_manual_edits(&mut self) -> Result<(), StoreError>;

    /// Whether any row of `rule.child_table` references `row_id`.
    fn has_dependents(&self, desc: &TableDescriptor, rule: &AdjacencyRule, row_id: i64) -> Result<bool, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// In-memory local store with a unique identity-key constraint per table.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    tables: HashMap<TableKind, Vec<LocalRecord>>,
    dependents: HashSet<(&'static str, i64)>,
    manual_edits_enabled: bool,
    next_row_id: i64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            dependents: HashSet::new(),
            manual_edits_enabled: true,
            next_row_id: 1,
        }
    }

    /// Add a row as-is. A zero `row_id` is replaced by the next free id.
    pub fn push(&mut self, kind: TableKind, mut row: LocalRecord) -> i64 {
        if row.row_id == 0 {
            row.row_id = self.next_row_id;
        }
        self.next_row_id = self.next_row_id.max(row.row_id + 1);
        let id = row.row_id;
        self.tables.entry(kind).or_default().push(row);
        id
    }

    /// Record that a `child_table` row references `row_id`.
    pub fn add_dependent(&mut self, child_table: &'static str, row_id: i64) {
        self.dependents.insert((child_table, row_id));
    }

    pub fn rows(&self, kind: TableKind) -> &[LocalRecord] {
        self.tables.get(&kind).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn row(&self, kind: TableKind, row_id: i64) -> Option<&LocalRecord> {
        self.rows(kind).iter().find(|r| r.row_id == row_id)
    }

    pub fn manual_edits_enabled(&self) -> bool {
        self.manual_edits_enabled
    }

    fn resolve_parent(&self, parent: &Option<ParentRef>) -> Option<i64> {
        let parent = parent.as_ref()?;
        self.rows(parent.kind)
            .iter()
            .find(|r| r.identity_key.as_deref() == Some(parent.identity_key.as_str()))
            .map(|r| r.row_id)
    }

    fn key_taken(&self, kind: TableKind, key: &str, except: &[usize]) -> bool {
        self.rows(kind)
            .iter()
            .enumerate()
            .any(|(i, r)| !except.contains(&i) && r.identity_key.as_deref() == Some(key))
    }
}

impl LocalStore for MemoryStore {
    fn find(&self, desc: &TableDescriptor, predicate: &Predicate) -> Result<Vec<LocalRecord>, StoreError> {
        let mut rows: Vec<LocalRecord> = self
            .rows(desc.kind)
            .iter()
            .filter(|r| predicate.matches(r))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.row_id);
        Ok(rows)
    }

    fn count(&self, desc: &TableDescriptor, predicate: &Predicate) -> Result<usize, StoreError> {
        Ok(self.rows(desc.kind).iter().filter(|r| predicate.matches(r)).count())
    }

    fn update(
        &mut self,
        desc: &TableDescriptor,
        predicate: &Predicate,
        patch: &RecordPatch,
    ) -> Result<WriteOutcome, StoreError> {
        let hits: Vec<usize> = self
            .rows(desc.kind)
            .iter()
            .enumerate()
            .filter(|(_, r)| predicate.matches(r))
            .map(|(i, _)| i)
            .collect();

        if hits.len() > 1 || (!hits.is_empty() && self.key_taken(desc.kind, &patch.identity_key, &hits)) {
            return Ok(WriteOutcome::UniqueViolation {
                detail: format!(
                    "duplicate key value violates unique constraint on {}.uuid ({})",
                    desc.table_name(),
                    patch.identity_key
                ),
            });
        }

        let parent_row_id = self.resolve_parent(&patch.parent);
        if let Some(rows) = self.tables.get_mut(&desc.kind) {
            for i in &hits {
                patch.apply(&mut rows[*i], parent_row_id);
            }
        }
        Ok(WriteOutcome::Applied { rows: hits.len() })
    }

    fn insert(&mut self, desc: &TableDescriptor, patch: &RecordPatch) -> Result<i64, StoreError> {
        if self.key_taken(desc.kind, &patch.identity_key, &[]) {
            return Err(StoreError::new(format!(
                "{}: identity key {} already present",
                desc.table_name(),
                patch.identity_key
            )));
        }
        let mut row = LocalRecord {
            centrally_managed: true,
            ..Default::default()
        };
        patch.apply(&mut row, self.resolve_parent(&patch.parent));
        Ok(self.push(desc.kind, row))
    }

    fn archive_all(&mut self, desc: &TableDescriptor) -> Result<usize, StoreError> {
        let rows = self.tables.entry(desc.kind).or_default();
        for row in rows.iter_mut() {
            row.archived = true;
        }
        Ok(rows.len())
    }

    fn disable_manual_edits(&mut self) -> Result<(), StoreError> {
        self.manual_edits_enabled = false;
        Ok(())
    }

    fn has_dependents(&self, _desc: &TableDescriptor, rule: &AdjacencyRule, row_id: i64) -> Result<bool, StoreError> {
        Ok(self.dependents.contains(&(rule.child_table, row_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn central(name: &str, ext: &str) -> CentralRecord {
        CentralRecord {
            identity_key: "u1".into(),
            display_name: name.into(),
            external_id: ext.into(),
            iso_code: None,
            uno_code: None,
            parent: None,
        }
    }

    fn local(row_id: i64, key: Option<&str>, name: &str, ext: &str) -> LocalRecord {
        LocalRecord {
            row_id,
            identity_key: key.map(String::from),
            display_name: Some(name.into()),
            external_id: Some(ext.into()),
            ..Default::default()
        }
    }

    fn patch(key: &str) -> RecordPatch {
        RecordPatch {
            identity_key: key.into(),
            display_name: "Springfield".into(),
            external_id: "42".into(),
            codes: None,
            parent: None,
        }
    }

    #[test]
    fn describe_uses_table_kind_name_column() {
        let c = central("O'Hara", "42");
        let pred = Predicate::name_or_external_id(&c);
        assert_eq!(
            pred.describe(&TableKind::Country.descriptor()),
            "defaultname='O''Hara' OR externalid='42'"
        );
        assert_eq!(
            Predicate::name_and_external_id(&c).describe(&TableKind::Community.descriptor()),
            "name='O''Hara' AND externalid='42'"
        );
    }

    #[test]
    fn codes_only_included_when_present() {
        let mut c = central("Germany", "DE1");
        assert_eq!(Predicate::name_id_or_codes(&c), Predicate::name_or_external_id(&c));
        c.iso_code = Some("DEU".into());
        let Predicate::Any(parts) = Predicate::name_id_or_codes(&c) else {
            panic!("expected OR predicate");
        };
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn null_columns_never_match() {
        let row = LocalRecord { row_id: 1, ..Default::default() };
        assert!(!Predicate::eq(Field::ExternalId, "42").matches(&row));
        assert!(Predicate::row_id(1).matches(&row));
        assert!(!Predicate::Any(vec![]).matches(&row));
        assert!(Predicate::All(vec![]).matches(&row));
    }

    #[test]
    fn update_rejects_multi_row_identity_assignment() {
        let desc = TableKind::Region.descriptor();
        let mut store = MemoryStore::new();
        store.push(TableKind::Region, local(1, None, "Springfield", "1"));
        store.push(TableKind::Region, local(2, None, "Springfield", "2"));

        let pred = Predicate::eq(Field::Name, "Springfield");
        let out = store.update(&desc, &pred, &patch("u1")).unwrap();
        assert!(matches!(out, WriteOutcome::UniqueViolation { .. }));
        assert!(store.rows(TableKind::Region).iter().all(|r| r.identity_key.is_none()));
    }

    #[test]
    fn update_rejects_key_held_by_another_row() {
        let desc = TableKind::Region.descriptor();
        let mut store = MemoryStore::new();
        store.push(TableKind::Region, local(1, Some("u1"), "Other", "9"));
        store.push(TableKind::Region, local(2, None, "Springfield", "42"));

        let out = store.update(&desc, &Predicate::row_id(2), &patch("u1")).unwrap();
        assert!(matches!(out, WriteOutcome::UniqueViolation { .. }));
    }

    #[test]
    fn update_resolves_parent_by_identity_key() {
        let mut store = MemoryStore::new();
        store.push(TableKind::District, local(5, Some("d1"), "Mitte", "11"));
        store.push(TableKind::Community, local(9, None, "Springfield", "42"));

        let mut p = patch("u1");
        p.parent = Some(ParentRef { kind: TableKind::District, identity_key: "d1".into() });
        let out = store
            .update(&TableKind::Community.descriptor(), &Predicate::row_id(9), &p)
            .unwrap();
        assert_eq!(out, WriteOutcome::Applied { rows: 1 });
        assert_eq!(store.row(TableKind::Community, 9).unwrap().parent_row_id, Some(5));
    }

    #[test]
    fn archive_all_and_feature_switch() {
        let desc = TableKind::Region.descriptor();
        let mut store = MemoryStore::new();
        store.push(TableKind::Region, local(1, None, "A", "1"));
        store.push(TableKind::Region, local(2, None, "B", "2"));
        assert_eq!(store.archive_all(&desc).unwrap(), 2);
        assert!(store.rows(TableKind::Region).iter().all(|r| r.archived));
        assert!(store.manual_edits_enabled());
        store.disable_manual_edits().unwrap();
        assert!(!store.manual_edits_enabled());
    }

    #[test]
    fn insert_assigns_fresh_row_id() {
        let desc = TableKind::Community.descriptor();
        let mut store = MemoryStore::new();
        store.push(TableKind::Community, local(40, Some("u0"), "A", "1"));
        let id = store.insert(&desc, &patch("u1")).unwrap();
        assert_eq!(id, 41);
        let row = store.row(TableKind::Community, 41).unwrap();
        assert!(row.centrally_managed);
        assert!(!row.archived);
        assert!(store.insert(&desc, &patch("u1")).is_err());
    }
}
