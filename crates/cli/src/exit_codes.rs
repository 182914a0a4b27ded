//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Description                                                 |
//! |------|-------------------------------------------------------------|
//! | 0    | Success                                                     |
//! | 1    | General error (unspecified)                                 |
//! | 2    | CLI usage error (bad args, missing file)                    |
//! | 3    | Run finished but recorded unresolved records                |
//! | 4    | Run aborted: duplicates need manual cleanup                 |
//! | 5    | Invalid config                                              |
//! | 6    | Snapshot or local store could not be read/written           |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use geoalign_recon::ReconError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
#[allow(dead_code)]
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// The run completed but at least one error diagnostic was recorded
/// (not found locally, sanity check, downgraded cleanup, ...).
pub const EXIT_UNRESOLVED: u8 = 3;

/// Duplicates the engine refuses to resolve; nothing after them was processed.
pub const EXIT_ABORTED: u8 = 4;

/// Config failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 5;

/// Snapshot file or local store I/O failure.
pub const EXIT_IO: u8 = 6;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ManualCleanupRequired { .. } => EXIT_ABORTED,
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        ReconError::Store(_) | ReconError::Snapshot(_) | ReconError::Io(_) => EXIT_IO,
        ReconError::MissingField { .. }
        | ReconError::SanityCheckFailed { .. }
        | ReconError::NotFoundLocally { .. }
        | ReconError::AmbiguousMatch { .. } => EXIT_UNRESOLVED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_and_io_errors_have_distinct_codes() {
        assert_eq!(recon_exit_code(&ReconError::ConfigParse("x".into())), EXIT_INVALID_CONFIG);
        assert_eq!(recon_exit_code(&ReconError::Io("x".into())), EXIT_IO);
        assert_eq!(recon_exit_code(&ReconError::Store("x".into())), EXIT_IO);
        assert_ne!(EXIT_ABORTED, EXIT_UNRESOLVED);
    }
}
