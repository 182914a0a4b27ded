//! `geoalign-recon`: central/local alignment engine for the administrative
//! hierarchy (continent down to community).
//!
//! Pure engine crate: receives a loaded central snapshot and a [`LocalStore`],
//! aligns the store in place and returns a report. No CLI or IO dependencies.

pub mod config;
pub mod duplicates;
pub mod engine;
pub mod error;
pub mod executor;
pub mod matcher;
pub mod model;
pub mod report;
pub mod store;
pub mod table;
pub mod verify;

pub use config::{AlignConfig, RunOptions};
pub use engine::run;
pub use error::{Aborted, ReconError};
pub use model::{CentralEntry, CentralRecord, LocalRecord, Snapshot};
pub use report::{Diagnostic, RunReport, Severity, TableSummary};
pub use store::{LocalStore, MemoryStore, Predicate, StoreError, WriteOutcome};
pub use table::{TableDescriptor, TableKind};
pub use verify::{verify_presence, VerifyOptions, VerifyReport};
