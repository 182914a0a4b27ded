use std::fmt;

use serde::Serialize;

use crate::error::ReconError;
use crate::table::TableKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One recorded problem, in the order it was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub table: TableKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_key: Option<String>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.table, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub table: TableKind,
    pub central_records: usize,
    /// Written (or, in a dry run, predicted) with at least one changed field.
    pub aligned: usize,
    /// Matched but already identical to central.
    pub unchanged: usize,
    pub adjacency_resolved: usize,
    pub unresolved: usize,
}

impl TableSummary {
    pub fn new(table: TableKind) -> Self {
        Self {
            table,
            central_records: 0,
            aligned: 0,
            unchanged: 0,
            adjacency_resolved: 0,
            unresolved: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub engine_version: String,
    pub run_at: String,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub meta: RunMeta,
    pub tables: Vec<TableSummary>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            meta: RunMeta {
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                run_at: chrono::Utc::now().to_rfc3339(),
                dry_run,
            },
            tables: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Record an error and echo it to the log.
    pub fn error(&mut self, table: TableKind, err: &ReconError) {
        log::error!("{err}");
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            table,
            identity_key: err.identity_key().map(String::from),
            message: err.to_string(),
        });
    }

    pub fn warning(&mut self, table: TableKind, identity_key: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            table,
            identity_key: identity_key.map(String::from),
            message,
        });
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// The error log, one line per diagnostic.
    pub fn lines(&self) -> Vec<String> {
        self.diagnostics.iter().map(|d| d.to_string()).collect()
    }

    pub fn summary(&self, table: TableKind) -> Option<&TableSummary> {
        self.tables.iter().find(|s| s.table == table)
    }

    pub(crate) fn summary_mut(&mut self, table: TableKind) -> &mut TableSummary {
        if let Some(i) = self.tables.iter().position(|s| s.table == table) {
            return &mut self.tables[i];
        }
        self.tables.push(TableSummary::new(table));
        let last = self.tables.len() - 1;
        &mut self.tables[last]
    }
}
