// Snapshot loading and the SQLite local store

pub mod snapshot;
pub mod sqlite;

pub use snapshot::{load_entries, load_snapshot, load_table};
pub use sqlite::SqliteStore;
