//! Presence check: is every central record represented locally by its
//! identity key? Optionally inserts the missing ones.

use serde::Serialize;

use crate::model::{sorted_entries, CentralEntry, CentralRecord, RecordPatch};
use crate::report::Diagnostic;
use crate::report::Severity;
use crate::store::{LocalStore, Predicate};
use crate::table::TableKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    pub insert_missing: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub present: usize,
    /// Identity keys without a local row, in processing order.
    pub missing: Vec<String>,
    /// Identity keys inserted by this run.
    pub inserted: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl VerifyReport {
    pub fn lines(&self) -> Vec<String> {
        self.diagnostics.iter().map(|d| d.to_string()).collect()
    }

    /// Entries that could not be checked or inserted: malformed payloads and
    /// store failures.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }

    fn record(&mut self, severity: Severity, table: TableKind, identity_key: &str, message: String) {
        match severity {
            Severity::Warning => log::warn!("{message}"),
            Severity::Error => log::error!("{message}"),
        }
        self.diagnostics.push(Diagnostic {
            severity,
            table,
            identity_key: Some(identity_key.to_string()),
            message,
        });
    }
}

pub fn verify_presence<S: LocalStore + ?Sized>(
    store: &mut S,
    kind: TableKind,
    entries: &[CentralEntry],
    options: &VerifyOptions,
) -> VerifyReport {
    let desc = kind.descriptor();
    let mut report = VerifyReport::default();

    for entry in sorted_entries(entries) {
        let central = match CentralRecord::from_entry(&desc, entry) {
            Ok(central) => central,
            Err(err) => {
                report.record(Severity::Error, kind, &entry.key, err.to_string());
                continue;
            }
        };

        let found = match store.count(&desc, &Predicate::identity_key(&central.identity_key)) {
            Ok(n) => n,
            Err(err) => {
                report.record(Severity::Error, kind, &central.identity_key, err.to_string());
                continue;
            }
        };
        if found > 0 {
            report.present += 1;
            continue;
        }

        report.missing.push(central.identity_key.clone());
        report.record(
            Severity::Warning,
            kind,
            &central.identity_key,
            format!(
                "{kind} {} ({}, {}) missing locally",
                central.identity_key, central.display_name, central.external_id
            ),
        );

        if !options.insert_missing {
            continue;
        }
        if options.dry_run {
            log::info!("\t[dry run] Would insert {}", central.identity_key);
            continue;
        }
        match store.insert(&desc, &RecordPatch::from_central(&desc, &central)) {
            Ok(row_id) => {
                log::info!("\tInserted {} as local item {row_id}", central.identity_key);
                report.inserted.push(central.identity_key.clone());
            }
            Err(err) => report.record(Severity::Error, kind, &central.identity_key, err.to_string()),
        }
    }

    log::info!(
        "Verified {kind}: {} present, {} missing, {} inserted",
        report.present,
        report.missing.len(),
        report.inserted.len()
    );
    report
}
