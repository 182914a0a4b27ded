use std::fmt;

use serde::Serialize;

use crate::config::RunOptions;
use crate::matcher::Strategy;
use crate::model::{CentralRecord, LocalRecord, RecordDiff, RecordPatch};
use crate::store::{LocalStore, Predicate, StoreError, WriteOutcome};
use crate::table::TableDescriptor;

/// How the updated row was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPath {
    IdentityKey,
    NameOrExternalId,
    SecondaryCodes,
    TrueDuplicate,
    Adjacency,
}

impl From<Strategy> for MatchPath {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::IdentityKey => Self::IdentityKey,
            Strategy::NameOrExternalId => Self::NameOrExternalId,
            Strategy::SecondaryCodes => Self::SecondaryCodes,
        }
    }
}

impl fmt::Display for MatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdentityKey => write!(f, "identity key"),
            Self::NameOrExternalId => write!(f, "name or external id"),
            Self::SecondaryCodes => write!(f, "iso/uno code"),
            Self::TrueDuplicate => write!(f, "true duplicate"),
            Self::Adjacency => write!(f, "adjacency"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Written, or in dry-run mode predicted to be written without conflict.
    Applied(RecordDiff),
    /// The write would touch more than one row or collide on a unique column.
    Conflict { detail: String },
    /// The predicate no longer matches any row.
    NoRows,
}

/// Align the row(s) matching `predicate` with `central`.
///
/// `local` is the row as it was located and only feeds the diff line. In
/// dry-run mode nothing is written; a count over the same predicate predicts
/// whether the write would conflict.
pub fn apply<S: LocalStore + ?Sized>(
    store: &mut S,
    desc: &TableDescriptor,
    central: &CentralRecord,
    local: &LocalRecord,
    predicate: &Predicate,
    path: MatchPath,
    options: &RunOptions,
) -> Result<ApplyOutcome, StoreError> {
    let patch = RecordPatch::from_central(desc, central);
    let diff = RecordDiff::between(local, &patch);

    if options.dry_run {
        let count = store.count(desc, predicate)?;
        if count > 1 {
            return Ok(ApplyOutcome::Conflict {
                detail: format!("{count} rows would be updated"),
            });
        }
        if count == 0 {
            return Ok(ApplyOutcome::NoRows);
        }
        log::info!("\t\t[dry run] Would update local item {} via {path} ({diff})", local.row_id);
        return Ok(ApplyOutcome::Applied(diff));
    }

    match store.update(desc, predicate, &patch)? {
        WriteOutcome::Applied { rows: 0 } => Ok(ApplyOutcome::NoRows),
        WriteOutcome::Applied { .. } => {
            log::info!("\t\tUpdated local item {} via {path} ({diff})", local.row_id);
            Ok(ApplyOutcome::Applied(diff))
        }
        WriteOutcome::UniqueViolation { detail } => Ok(ApplyOutcome::Conflict { detail }),
    }
}
