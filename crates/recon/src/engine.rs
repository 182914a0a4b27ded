use std::collections::HashMap;

use crate::config::RunOptions;
use crate::duplicates;
use crate::error::{Aborted, ReconError};
use crate::executor::{self, ApplyOutcome, MatchPath};
use crate::matcher::{self, MatchOutcome, Strategy};
use crate::model::{sorted_entries, CentralEntry, CentralRecord, LocalRecord, RecordDiff, Snapshot};
use crate::report::RunReport;
use crate::store::{Field, LocalStore, Predicate, StoreError};
use crate::table::{TableDescriptor, TableKind};

/// What became of one central record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Aligned { diff: RecordDiff, path: MatchPath },
    Unresolved(ReconError),
}

/// State that lives for exactly one run.
#[derive(Debug, Default)]
struct RunContext {
    /// Central records per (table, name), for tables that track name frequency.
    name_counts: HashMap<(TableKind, String), usize>,
}

impl RunContext {
    fn count_names(&mut self, kind: TableKind, records: &[CentralRecord]) {
        for record in records {
            *self
                .name_counts
                .entry((kind, record.display_name.clone()))
                .or_insert(0) += 1;
        }
    }

    fn central_count(&self, kind: TableKind, name: &str) -> usize {
        self.name_counts
            .get(&(kind, name.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

/// Align every table of `snapshot`, parents before children.
///
/// Per-record problems are recorded in the returned report. The only error is
/// a manual cleanup that `options` does not allow to be downgraded; it stops
/// the run and hands back the partial report.
pub fn run<S: LocalStore + ?Sized>(
    store: &mut S,
    snapshot: &Snapshot,
    options: &RunOptions,
) -> Result<RunReport, Aborted> {
    let mut report = RunReport::new(options.dry_run);
    let mut ctx = RunContext::default();

    for kind in TableKind::HIERARCHY {
        let desc = kind.descriptor();
        if let Err(cause) = align_table(store, &desc, snapshot.entries(kind), options, &mut ctx, &mut report) {
            report.error(kind, &cause);
            return Err(Aborted { cause, report });
        }
    }

    log::info!(
        "Finished: {} errors, {} warnings",
        report.errors().count(),
        report.warnings().count()
    );
    Ok(report)
}

/// Quarantine, then walk. Returns `Err` only for a fatal error.
fn align_table<S: LocalStore + ?Sized>(
    store: &mut S,
    desc: &TableDescriptor,
    entries: &[CentralEntry],
    options: &RunOptions,
    ctx: &mut RunContext,
    report: &mut RunReport,
) -> Result<(), ReconError> {
    let kind = desc.kind;
    log::info!("Process table {kind}");
    report.summary_mut(kind).central_records = entries.len();

    if !options.dry_run {
        if let Err(err) = quarantine(store, desc) {
            report.error(kind, &ReconError::from(err));
            return Ok(());
        }
    }

    let mut records = Vec::with_capacity(entries.len());
    for entry in sorted_entries(entries) {
        match CentralRecord::from_entry(desc, entry) {
            Ok(record) => records.push(record),
            Err(err) => {
                report.error(kind, &err);
                report.summary_mut(kind).unresolved += 1;
            }
        }
    }

    if desc.track_name_frequency {
        ctx.count_names(kind, &records);
    }

    let total = records.len();
    for (i, central) in records.iter().enumerate() {
        log::info!(
            "{}/{total}: Processing {}, {}, {}",
            i + 1,
            central.display_name,
            central.external_id,
            central.identity_key
        );

        if desc.track_name_frequency {
            if let Err(err) = check_name_frequency(store, desc, central, ctx, report) {
                report.error(kind, &ReconError::from(err));
            }
        }

        match reconcile_record(store, desc, central, options) {
            Ok(RecordOutcome::Aligned { diff, path }) => {
                let summary = report.summary_mut(kind);
                if diff.is_empty() {
                    summary.unchanged += 1;
                } else {
                    summary.aligned += 1;
                }
                if path == MatchPath::Adjacency {
                    summary.adjacency_resolved += 1;
                    report.warning(
                        kind,
                        Some(central.identity_key.as_str()),
                        format!(
                            "Aligned {} ({}, {}) by adjacency",
                            central.identity_key, central.display_name, central.external_id
                        ),
                    );
                }
            }
            Ok(RecordOutcome::Unresolved(err)) => {
                if matches!(err, ReconError::ManualCleanupRequired { .. }) && options.archive_on_conflict {
                    log::warn!("\tarchive on conflict: leaving {} archived", central.identity_key);
                }
                report.error(kind, &err);
                report.summary_mut(kind).unresolved += 1;
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                report.error(kind, &err);
                report.summary_mut(kind).unresolved += 1;
            }
        }
    }

    Ok(())
}

fn quarantine<S: LocalStore + ?Sized>(store: &mut S, desc: &TableDescriptor) -> Result<(), StoreError> {
    store.disable_manual_edits()?;
    let archived = store.archive_all(desc)?;
    log::info!("\tarchived {archived} rows of {}", desc.table_name());
    Ok(())
}

fn check_name_frequency<S: LocalStore + ?Sized>(
    store: &S,
    desc: &TableDescriptor,
    central: &CentralRecord,
    ctx: &RunContext,
    report: &mut RunReport,
) -> Result<(), StoreError> {
    let central_count = ctx.central_count(desc.kind, &central.display_name);
    let local_count = store.count(desc, &Predicate::eq(Field::Name, central.display_name.as_str()))?;
    if central_count != local_count {
        report.warning(
            desc.kind,
            Some(central.identity_key.as_str()),
            format!(
                "Number of {} name {} differs: Central {central_count}, Local {local_count}",
                desc.table_name(),
                central.display_name
            ),
        );
    }
    Ok(())
}

/// Run the lookup strategies in order and act on the first one that finds
/// anything.
pub fn reconcile_record<S: LocalStore + ?Sized>(
    store: &mut S,
    desc: &TableDescriptor,
    central: &CentralRecord,
    options: &RunOptions,
) -> Result<RecordOutcome, ReconError> {
    for &strategy in matcher::strategies(desc) {
        match matcher::lookup(store, desc, central, strategy)? {
            MatchOutcome::Matched(local) => {
                return apply_match(store, desc, central, &local, strategy, options);
            }
            MatchOutcome::Ambiguous(candidates) => {
                log::info!("\t{} candidates by {strategy}", candidates.len());
                return resolve_ambiguous(store, desc, central, strategy, candidates, options);
            }
            MatchOutcome::NotFound => {
                log::debug!("\tno match by {strategy}");
            }
        }
    }
    Ok(RecordOutcome::Unresolved(duplicates::not_found(desc, central)))
}

fn apply_match<S: LocalStore + ?Sized>(
    store: &mut S,
    desc: &TableDescriptor,
    central: &CentralRecord,
    local: &LocalRecord,
    strategy: Strategy,
    options: &RunOptions,
) -> Result<RecordOutcome, ReconError> {
    if strategy.needs_sanity_check() {
        if let Err(err) = matcher::sanity_check(desc, central, local) {
            return Ok(RecordOutcome::Unresolved(err));
        }
    }

    let predicate = strategy.predicate(central);
    let path = MatchPath::from(strategy);
    match executor::apply(store, desc, central, local, &predicate, path, options)? {
        ApplyOutcome::Applied(diff) => Ok(RecordOutcome::Aligned { diff, path }),
        ApplyOutcome::Conflict { detail } => {
            log::info!("\tconflict while writing by {strategy}: {detail}");
            // Identity-key conflicts are settled among the name/external-id rows.
            let scope = match strategy {
                Strategy::SecondaryCodes => Strategy::SecondaryCodes,
                _ => Strategy::NameOrExternalId,
            };
            let candidates = store.find(desc, &scope.predicate(central))?;
            resolve_ambiguous(store, desc, central, scope, candidates, options)
        }
        ApplyOutcome::NoRows => Ok(RecordOutcome::Unresolved(duplicates::not_found(desc, central))),
    }
}

fn resolve_ambiguous<S: LocalStore + ?Sized>(
    store: &mut S,
    desc: &TableDescriptor,
    central: &CentralRecord,
    strategy: Strategy,
    candidates: Vec<LocalRecord>,
    options: &RunOptions,
) -> Result<RecordOutcome, ReconError> {
    let locating = strategy.predicate(central);
    if strategy == Strategy::SecondaryCodes {
        return Ok(duplicates::code_collision(desc, central, &locating, &candidates));
    }
    duplicates::resolve(store, desc, central, candidates, &locating, options)
}
