//! Spreadsheet formula generation backed by a hosted text-completion model.
//!
//! A formula cell calls one of four surfaces (`text`, `list`, `record`,
//! `record_list`) with positional arguments; the crate turns that call into a
//! prompt, asks the completion service, and shapes the answer into a
//! deterministic single-column grid. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (argument parsing, configuration
//!   resolution, prompt assembly, shaping, post-processing). No I/O, fully
//!   testable in isolation.
//! - **[`io`]**: Side-effecting operations (settings files, HTTP transport,
//!   the model client). Isolated behind traits so tests can script them.
//!
//! [`pipeline`] sequences the two into the formula entry points.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::GenError;
pub use pipeline::{Generation, Pipeline};
