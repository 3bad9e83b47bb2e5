//! Deterministic, pure logic for the generation pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests. The
//! only outside state they read is the injected [`resolve::SettingsStore`].

pub mod args;
pub mod count;
pub mod postprocess;
pub mod prompt;
pub mod resolve;
pub mod shaper;
pub mod tool_spec;
pub mod tools;
pub mod types;
