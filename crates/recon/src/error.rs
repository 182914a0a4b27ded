use std::fmt;

use crate::report::RunReport;
use crate::store::StoreError;
use crate::table::TableKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconError {
    /// Central payload carries neither alias of a required field.
    MissingField {
        table: TableKind,
        identity_key: String,
        field: String,
    },
    /// Located local row disagrees with central on both name and external id.
    SanityCheckFailed {
        table: TableKind,
        identity_key: String,
        central_name: String,
        central_external_id: String,
        local_name: Option<String>,
        local_external_id: Option<String>,
    },
    /// No local counterpart found by any strategy.
    NotFoundLocally {
        table: TableKind,
        identity_key: String,
        name: String,
        external_id: String,
    },
    /// A write (real or simulated) would touch more than one row.
    AmbiguousMatch {
        table: TableKind,
        identity_key: String,
        criteria: String,
        detail: String,
    },
    /// Duplicates the engine refuses to resolve on its own.
    ManualCleanupRequired {
        table: TableKind,
        identity_key: String,
        name: String,
        external_id: String,
        query: String,
    },
    /// Local store failure.
    Store(String),
    /// Central snapshot could not be read or parsed.
    Snapshot(String),
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error.
    ConfigValidation(String),
    /// IO error (file read, etc.).
    Io(String),
}

impl ReconError {
    /// Only an unresolved manual cleanup stops a run; everything else is
    /// recorded against its record and the walk continues.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ManualCleanupRequired { .. })
    }

    pub fn identity_key(&self) -> Option<&str> {
        match self {
            Self::MissingField { identity_key, .. }
            | Self::SanityCheckFailed { identity_key, .. }
            | Self::NotFoundLocally { identity_key, .. }
            | Self::AmbiguousMatch { identity_key, .. }
            | Self::ManualCleanupRequired { identity_key, .. } => Some(identity_key),
            _ => None,
        }
    }
}

fn or_none(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("<none>")
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { table, identity_key, field } => {
                write!(f, "{table} record {identity_key}: missing field '{field}'")
            }
            Self::SanityCheckFailed {
                table,
                central_name,
                central_external_id,
                local_name,
                local_external_id,
                ..
            } => write!(
                f,
                "Sanity check failed for {table}: Central: {central_name}, {central_external_id} and Local: {}, {}",
                or_none(local_name),
                or_none(local_external_id),
            ),
            Self::NotFoundLocally { identity_key, name, external_id, .. } => write!(
                f,
                "Could not find local item present in central ({identity_key}, {name}, {external_id})"
            ),
            Self::AmbiguousMatch { table, identity_key, criteria, detail } => write!(
                f,
                "Could not align {identity_key}: duplicate in {table} WHERE {criteria} ({detail})"
            ),
            Self::ManualCleanupRequired { table, identity_key, name, external_id, query } => write!(
                f,
                "Multiple duplicates found for {identity_key} ({name}, {external_id}) in {table}. \
                 THIS CANNOT BE FIXED AUTOMATICALLY. PLEASE CLEANUP MANUALLY AND THEN RESTART. \
                 Run {query} to see the duplicates."
            ),
            Self::Store(msg) => write!(f, "store error: {msg}"),
            Self::Snapshot(msg) => write!(f, "snapshot error: {msg}"),
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}

impl From<StoreError> for ReconError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.message)
    }
}

/// A run stopped by a fatal error. Carries everything recorded up to that point.
#[derive(Debug)]
pub struct Aborted {
    pub cause: ReconError,
    pub report: RunReport,
}

impl fmt::Display for Aborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run aborted: {}", self.cause)
    }
}

impl std::error::Error for Aborted {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_manual_cleanup_is_fatal() {
        let cleanup = ReconError::ManualCleanupRequired {
            table: TableKind::Region,
            identity_key: "u1".into(),
            name: "Nord".into(),
            external_id: "7".into(),
            query: "SELECT * FROM region WHERE name='Nord' OR externalid='7'".into(),
        };
        assert!(cleanup.is_fatal());
        assert!(!ReconError::Store("locked".into()).is_fatal());
        assert!(!ReconError::NotFoundLocally {
            table: TableKind::Region,
            identity_key: "u1".into(),
            name: "Nord".into(),
            external_id: "7".into(),
        }
        .is_fatal());
    }

    #[test]
    fn sanity_message_shows_missing_local_values() {
        let err = ReconError::SanityCheckFailed {
            table: TableKind::District,
            identity_key: "u9".into(),
            central_name: "Mitte".into(),
            central_external_id: "11".into(),
            local_name: Some("Altstadt".into()),
            local_external_id: None,
        };
        assert_eq!(
            err.to_string(),
            "Sanity check failed for district: Central: Mitte, 11 and Local: Altstadt, <none>"
        );
        assert_eq!(err.identity_key(), Some("u9"));
    }
}
