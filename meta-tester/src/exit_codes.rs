//! Stable exit codes for the tester binary.

use crate::core::errors::ConfigurationError;

/// Every selected file and install passed.
pub const OK: i32 = 0;
/// Some file or install failed, or the run hit an unexpected error.
pub const FAILED: i32 = 1;
/// The run could not start: unknown game, unusable base ref or bad config.
pub const INVALID: i32 = 2;

/// Exit code for an error that aborted the run.
pub fn for_error(err: &anyhow::Error) -> i32 {
    if err.chain().any(|cause| cause.is::<ConfigurationError>()) {
        INVALID
    } else {
        FAILED
    }
}
