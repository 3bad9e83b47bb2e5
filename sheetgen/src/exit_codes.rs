//! Stable exit codes for the `sheetgen` CLI.

use crate::error::GenError;

/// Formula evaluated and the grid was printed.
pub const OK: i32 = 0;
/// Bad arguments, schema, tool spec, settings, or missing credential.
pub const INVALID: i32 = 1;
/// The completion service failed (rate limit, timeout, upstream error).
pub const UPSTREAM: i32 = 2;

/// Map a pipeline error to the exit code the CLI reports.
pub fn for_error(err: &GenError) -> i32 {
    match err {
        GenError::RateLimited(_) | GenError::Timeout(_) | GenError::Upstream(_) => UPSTREAM,
        _ => INVALID,
    }
}
