//! Error taxonomy surfaced to formula cells.
//!
//! Every variant carries a human message and maps to a stable tag via
//! [`GenError::tag`]. The formula surface renders `"<tag> <message>"` in the
//! cell, so tags must never change once published.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenError {
    #[error("{0}")]
    MissingInput(String),

    #[error("{0}")]
    BadSchema(String),

    #[error("{0}")]
    UnknownTool(String),

    #[error("{0}")]
    BadToolSpec(String),

    #[error("{0}")]
    NoCredential(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Upstream(String),

    /// Raised only when strict mode is active.
    #[error("{0}")]
    JsonParse(String),

    #[error("{0}")]
    InternalShape(String),
}

impl GenError {
    /// Stable machine-readable tag for this error kind.
    pub fn tag(&self) -> &'static str {
        match self {
            GenError::MissingInput(_) => "#GPT_MISSING_INPUT",
            GenError::BadSchema(_) => "#GPT_BAD_SCHEMA",
            GenError::UnknownTool(_) => "#GPT_TOOL_UNKNOWN",
            GenError::BadToolSpec(_) => "#GPT_TOOL_BAD_SPEC",
            GenError::NoCredential(_) => "#GPT_NO_KEY",
            GenError::RateLimited(_) => "#GPT_RATE_LIMIT",
            GenError::Timeout(_) => "#GPT_TIMEOUT",
            GenError::Upstream(_) => "#GPT_UPSTREAM",
            GenError::JsonParse(_) => "#GPT_JSON_PARSE",
            GenError::InternalShape(_) => "#GPT_INTERNAL",
        }
    }

    /// Human message without the tag.
    pub fn message(&self) -> &str {
        match self {
            GenError::MissingInput(msg)
            | GenError::BadSchema(msg)
            | GenError::UnknownTool(msg)
            | GenError::BadToolSpec(msg)
            | GenError::NoCredential(msg)
            | GenError::RateLimited(msg)
            | GenError::Timeout(msg)
            | GenError::Upstream(msg)
            | GenError::JsonParse(msg)
            | GenError::InternalShape(msg) => msg,
        }
    }

    /// Cell text for this error: tag followed by the message.
    pub fn render(&self) -> String {
        format!("{} {}", self.tag(), self.message())
    }
}
