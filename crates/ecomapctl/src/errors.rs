//! Exit codes for ecomapctl
//!
//! `fix` needs three distinct failure codes so scripts can tell "could not
//! start" from "started but never came up".

use ecomap_common::EcomapError;

/// Exit code for success (also "nothing to forward")
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for general errors (missing config, unwritable report)
pub const EXIT_GENERAL_ERROR: i32 = 1;

/// Exit code when the remediation script could not be started
pub const EXIT_SPAWN_FAILED: i32 = 2;

/// Exit code when `check` finds at least one failing probe
pub const EXIT_CHECKS_FAILED: i32 = 2;

/// Exit code when port-forwards did not stabilize
pub const EXIT_NOT_STABILIZED: i32 = 3;

/// Exit code after Ctrl-C (128 + SIGINT)
pub const EXIT_INTERRUPTED: i32 = 130;

/// Exit code for a command that failed with an error
pub fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<EcomapError>() {
        Some(EcomapError::Spawn { .. }) => EXIT_SPAWN_FAILED,
        _ => EXIT_GENERAL_ERROR,
    }
}

/// Stable error code for the audit log
pub fn error_code(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<EcomapError>()
        .map(EcomapError::code)
        .unwrap_or("error")
}
