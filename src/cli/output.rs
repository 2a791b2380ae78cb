//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ResolveError;

/// Render an error and its causes on one line.
pub fn map_error(e: &anyhow::Error) -> String {
    format!("{:#}", e)
}

/// Process exit code: 2 for caller mistakes (4xx family), 1 otherwise.
pub fn exit_code(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<ResolveError>() {
        Some(err) if (400..500).contains(&err.status_code()) => 2,
        _ => 1,
    }
}
