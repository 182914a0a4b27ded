use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ReconError;
use crate::table::{TableDescriptor, TableKind, EXTERNAL_ID_ALIASES};

// ---------------------------------------------------------------------------
// Central snapshot
// ---------------------------------------------------------------------------

/// One entry of a central snapshot file: `{ "key": ..., "value": {...} }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralEntry {
    pub key: String,
    pub value: JsonValue,
}

/// Central entries for every table kind, as loaded for one run.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    tables: BTreeMap<TableKind, Vec<CentralEntry>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: TableKind, entries: Vec<CentralEntry>) {
        self.tables.insert(kind, entries);
    }

    pub fn entries(&self, kind: TableKind) -> &[CentralEntry] {
        self.tables.get(&kind).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Entries in processing order: ascending by identity key.
pub fn sorted_entries(entries: &[CentralEntry]) -> Vec<&CentralEntry> {
    let mut sorted: Vec<&CentralEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));
    sorted
}

// ---------------------------------------------------------------------------
// Central record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    pub kind: TableKind,
    pub identity_key: String,
}

/// A central entry normalized for one table kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralRecord {
    pub identity_key: String,
    pub display_name: String,
    pub external_id: String,
    pub iso_code: Option<String>,
    pub uno_code: Option<String>,
    pub parent: Option<ParentRef>,
}

impl CentralRecord {
    pub fn from_entry(desc: &TableDescriptor, entry: &CentralEntry) -> Result<Self, ReconError> {
        let missing = |field: String| ReconError::MissingField {
            table: desc.kind,
            identity_key: entry.key.clone(),
            field,
        };

        let name_field = desc.naming.central_field();
        let display_name = text_field(&entry.value, name_field).ok_or_else(|| missing(name_field.into()))?;

        let external_id = EXTERNAL_ID_ALIASES
            .iter()
            .find_map(|alias| text_field(&entry.value, alias))
            .ok_or_else(|| missing(EXTERNAL_ID_ALIASES.join("/")))?;

        let (iso_code, uno_code) = if desc.secondary_codes {
            (text_field(&entry.value, "isoCode"), text_field(&entry.value, "unoCode"))
        } else {
            (None, None)
        };

        let parent = desc.parent.and_then(|kind| {
            entry
                .value
                .get(kind.table_name())
                .and_then(|p| text_field(p, "uuid"))
                .map(|identity_key| ParentRef { kind, identity_key })
        });

        Ok(Self {
            identity_key: entry.key.clone(),
            display_name,
            external_id,
            iso_code,
            uno_code,
            parent,
        })
    }
}

/// Non-empty string (or number) field of a JSON object.
fn text_field(value: &JsonValue, field: &str) -> Option<String> {
    match value.get(field)? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Local record
// ---------------------------------------------------------------------------

/// A row of the local store. `display_name` holds whichever name column the
/// table kind uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalRecord {
    pub row_id: i64,
    pub identity_key: Option<String>,
    pub display_name: Option<String>,
    pub external_id: Option<String>,
    pub archived: bool,
    pub centrally_managed: bool,
    pub iso_code: Option<String>,
    pub uno_code: Option<String>,
    pub parent_row_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Patch + diff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryCodes {
    pub iso_code: Option<String>,
    pub uno_code: Option<String>,
}

/// Values an alignment writes to a local row. Always de-archives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPatch {
    pub identity_key: String,
    pub display_name: String,
    pub external_id: String,
    /// Present only for kinds with secondary codes.
    pub codes: Option<SecondaryCodes>,
    pub parent: Option<ParentRef>,
}

impl RecordPatch {
    pub fn from_central(desc: &TableDescriptor, central: &CentralRecord) -> Self {
        Self {
            identity_key: central.identity_key.clone(),
            display_name: central.display_name.clone(),
            external_id: central.external_id.clone(),
            codes: desc.secondary_codes.then(|| SecondaryCodes {
                iso_code: central.iso_code.clone(),
                uno_code: central.uno_code.clone(),
            }),
            parent: central.parent.clone(),
        }
    }

    /// Apply to a row in place. `parent_row_id` is the already-resolved parent,
    /// if any; an unresolved parent leaves the row's reference untouched.
    pub fn apply(&self, row: &mut LocalRecord, parent_row_id: Option<i64>) {
        row.identity_key = Some(self.identity_key.clone());
        row.display_name = Some(self.display_name.clone());
        row.external_id = Some(self.external_id.clone());
        row.archived = false;
        if let Some(codes) = &self.codes {
            row.iso_code = codes.iso_code.clone();
            row.uno_code = codes.uno_code.clone();
        }
        if parent_row_id.is_some() {
            row.parent_row_id = parent_row_id;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffField {
    IdentityKey,
    Name,
    ExternalId,
    IsoCode,
    UnoCode,
}

impl DiffField {
    fn label(&self) -> &'static str {
        match self {
            Self::IdentityKey => "UUID",
            Self::Name => "Name",
            Self::ExternalId => "Ext. ID",
            Self::IsoCode => "ISO",
            Self::UnoCode => "UNO",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: DiffField,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Fields an update changes on one row. Unchanged fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordDiff {
    pub changes: Vec<FieldChange>,
}

impl RecordDiff {
    pub fn between(local: &LocalRecord, patch: &RecordPatch) -> Self {
        let mut diff = RecordDiff::default();
        diff.push(DiffField::IdentityKey, &local.identity_key, Some(&patch.identity_key));
        diff.push(DiffField::Name, &local.display_name, Some(&patch.display_name));
        diff.push(DiffField::ExternalId, &local.external_id, Some(&patch.external_id));
        if let Some(codes) = &patch.codes {
            diff.push(DiffField::IsoCode, &local.iso_code, codes.iso_code.as_ref());
            diff.push(DiffField::UnoCode, &local.uno_code, codes.uno_code.as_ref());
        }
        diff
    }

    fn push(&mut self, field: DiffField, before: &Option<String>, after: Option<&String>) {
        if before.as_ref() != after {
            self.changes.push(FieldChange {
                field,
                before: before.clone(),
                after: after.cloned(),
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn touches(&self, field: DiffField) -> bool {
        self.changes.iter().any(|c| c.field == field)
    }
}

impl fmt::Display for RecordDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.changes.is_empty() {
            return f.write_str("no changes");
        }
        let parts: Vec<String> = self
            .changes
            .iter()
            .map(|c| {
                format!(
                    "{}: {} -> {}",
                    c.field.label(),
                    c.before.as_deref().unwrap_or("<none>"),
                    c.after.as_deref().unwrap_or("<none>"),
                )
            })
            .collect();
        f.write_str(&parts.join(", "))
    }
}
