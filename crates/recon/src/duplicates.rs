//! Duplicate resolution.
//!
//! Loose duplicates share the central name OR external id; true duplicates
//! share both. One true duplicate is taken as the target. Anything else is
//! escalated: communities may be settled by adjacency (the single candidate
//! with facilities attached), and what remains needs manual cleanup.

use crate::config::RunOptions;
use crate::engine::RecordOutcome;
use crate::error::ReconError;
use crate::executor::{self, ApplyOutcome, MatchPath};
use crate::model::{CentralRecord, LocalRecord};
use crate::store::{LocalStore, Predicate, StoreError};
use crate::table::{AdjacencyRule, TableDescriptor};

pub fn is_loose_duplicate(central: &CentralRecord, row: &LocalRecord) -> bool {
    Predicate::name_or_external_id(central).matches(row)
}

pub fn is_true_duplicate(central: &CentralRecord, row: &LocalRecord) -> bool {
    Predicate::name_and_external_id(central).matches(row)
}

/// Candidates split into everything the locating predicate found and the
/// subset agreeing with central on both name and external id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSet {
    pub loose: Vec<LocalRecord>,
    pub true_duplicates: Vec<LocalRecord>,
}

pub fn classify(central: &CentralRecord, candidates: Vec<LocalRecord>) -> DuplicateSet {
    let true_duplicates = candidates
        .iter()
        .filter(|row| is_true_duplicate(central, row))
        .cloned()
        .collect();
    DuplicateSet { loose: candidates, true_duplicates }
}

/// Settle an ambiguous match among `candidates`, the rows `locating` found.
/// `Err` is returned only for a manual cleanup the options do not allow to
/// be downgraded, or for a store failure.
pub fn resolve<S: LocalStore + ?Sized>(
    store: &mut S,
    desc: &TableDescriptor,
    central: &CentralRecord,
    candidates: Vec<LocalRecord>,
    locating: &Predicate,
    options: &RunOptions,
) -> Result<RecordOutcome, ReconError> {
    let set = classify(central, candidates);
    log::info!(
        "\tfound {} duplicates in {} WHERE {}",
        set.loose.len(),
        desc.table_name(),
        locating.describe(desc)
    );
    log::info!(
        "\tfound {} true duplicates of {} and {} in {}",
        set.true_duplicates.len(),
        central.display_name,
        central.external_id,
        desc.table_name()
    );

    match set.true_duplicates.as_slice() {
        [target] => resolve_true_duplicate(store, desc, central, target, options),
        _ => escalate(store, desc, central, &set.loose, locating, options),
    }
}

/// Several countries share the central ISO/UNO code. Recorded against the
/// record; the rows stay archived.
pub fn code_collision(
    desc: &TableDescriptor,
    central: &CentralRecord,
    locating: &Predicate,
    candidates: &[LocalRecord],
) -> RecordOutcome {
    let ids: Vec<String> = candidates.iter().map(|r| r.row_id.to_string()).collect();
    RecordOutcome::Unresolved(ambiguous(
        desc,
        central,
        locating,
        format!("local rows {} share the code", ids.join(", ")),
    ))
}

fn resolve_true_duplicate<S: LocalStore + ?Sized>(
    store: &mut S,
    desc: &TableDescriptor,
    central: &CentralRecord,
    target: &LocalRecord,
    options: &RunOptions,
) -> Result<RecordOutcome, ReconError> {
    let predicate = Predicate::name_and_external_id(central);

    // Last-moment collision guard.
    let count = store.count(desc, &predicate)?;
    if count > 1 {
        return Ok(RecordOutcome::Unresolved(ambiguous(
            desc,
            central,
            &predicate,
            format!("{count} rows match"),
        )));
    }

    let outcome = executor::apply(store, desc, central, target, &predicate, MatchPath::TrueDuplicate, options)?;
    Ok(settle(outcome, desc, central, &predicate, MatchPath::TrueDuplicate))
}

fn escalate<S: LocalStore + ?Sized>(
    store: &mut S,
    desc: &TableDescriptor,
    central: &CentralRecord,
    candidates: &[LocalRecord],
    locating: &Predicate,
    options: &RunOptions,
) -> Result<RecordOutcome, ReconError> {
    if options.adjacency_resolution {
        if let Some(rule) = &desc.adjacency {
            if let Some(outcome) = resolve_by_adjacency(store, desc, central, candidates, rule, options)? {
                return Ok(outcome);
            }
        }
    }
    manual_cleanup(desc, central, locating, options)
}

/// `None` when adjacency is inconclusive.
fn resolve_by_adjacency<S: LocalStore + ?Sized>(
    store: &mut S,
    desc: &TableDescriptor,
    central: &CentralRecord,
    candidates: &[LocalRecord],
    rule: &AdjacencyRule,
    options: &RunOptions,
) -> Result<Option<RecordOutcome>, ReconError> {
    let mut attached = Vec::new();
    for candidate in candidates.iter() {
        if store.has_dependents(desc, rule, candidate.row_id)? {
            attached.push(candidate);
        }
    }
    log::info!(
        "\tadjacency: {} of {} candidates have a {} attached",
        attached.len(),
        candidates.len(),
        rule.child_table
    );

    let [target] = attached.as_slice() else {
        return Ok(None);
    };

    let predicate = Predicate::row_id(target.row_id);
    let outcome = executor::apply(store, desc, central, target, &predicate, MatchPath::Adjacency, options)?;
    Ok(Some(settle(outcome, desc, central, &predicate, MatchPath::Adjacency)))
}

fn manual_cleanup(
    desc: &TableDescriptor,
    central: &CentralRecord,
    locating: &Predicate,
    options: &RunOptions,
) -> Result<RecordOutcome, ReconError> {
    let err = ReconError::ManualCleanupRequired {
        table: desc.kind,
        identity_key: central.identity_key.clone(),
        name: central.display_name.clone(),
        external_id: central.external_id.clone(),
        query: format!(
            "SELECT * FROM {} WHERE {}",
            desc.table_name(),
            locating.describe(desc)
        ),
    };
    // A simulated run previews every collision instead of stopping at the first.
    if options.dry_run || options.archive_on_conflict {
        return Ok(RecordOutcome::Unresolved(err));
    }
    Err(err)
}

fn settle(
    outcome: ApplyOutcome,
    desc: &TableDescriptor,
    central: &CentralRecord,
    predicate: &Predicate,
    path: MatchPath,
) -> RecordOutcome {
    match outcome {
        ApplyOutcome::Applied(diff) => RecordOutcome::Aligned { diff, path },
        ApplyOutcome::Conflict { detail } => RecordOutcome::Unresolved(ambiguous(desc, central, predicate, detail)),
        ApplyOutcome::NoRows => RecordOutcome::Unresolved(not_found(desc, central)),
    }
}

pub(crate) fn ambiguous(
    desc: &TableDescriptor,
    central: &CentralRecord,
    predicate: &Predicate,
    detail: String,
) -> ReconError {
    ReconError::AmbiguousMatch {
        table: desc.kind,
        identity_key: central.identity_key.clone(),
        criteria: predicate.describe(desc),
        detail,
    }
}

pub(crate) fn not_found(desc: &TableDescriptor, central: &CentralRecord) -> ReconError {
    ReconError::NotFoundLocally {
        table: desc.kind,
        identity_key: central.identity_key.clone(),
        name: central.display_name.clone(),
        external_id: central.external_id.clone(),
    }
}
