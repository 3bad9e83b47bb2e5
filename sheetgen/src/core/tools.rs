//! Tool runner: turns a normalized tool spec into prompt context.
//!
//! `web_search` is the only registered capability. Failures here never reach
//! the caller; they degrade to a context string that asks the model to answer
//! from general knowledge.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::args::{cell_number, is_present};
use crate::core::tool_spec::{ToolSpec, WEB_SEARCH, is_primitive};
use crate::core::types::Diagnostics;

pub const MAX_QUERY_CHARS: usize = 400;
pub const MAX_RECENCY_CHARS: usize = 32;
pub const MAX_RESULTS_RANGE: (i64, i64) = (1, 25);

const CONTEXT_QUERY_CHARS: usize = 200;
const CONTEXT_PROMPT_CHARS: usize = 300;
const SUMMARY_VALUE_CHARS: usize = 60;

const QUERY_KEYS: [&str; 3] = ["search_query", "query", "q"];
const HANDLED_KEYS: [&str; 6] = [
    "search_query",
    "query",
    "q",
    "max_results",
    "recency_filter",
    "include_images",
];

/// Tool capability forwarded to the model client.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTool {
    pub name: &'static str,
    pub parameters: Map<String, Value>,
}

/// Result of running the requested tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutcome {
    /// Text injected into the system message; empty when no tool ran.
    pub context: String,
    pub diagnostics: Diagnostics,
    pub request_tool: Option<RequestTool>,
}

#[derive(Debug, Error)]
enum ToolError {
    #[error("web search query is empty")]
    EmptyQuery,
}

/// Run the tool named by `spec` for the instruction `text`.
#[instrument(skip_all, fields(tool = spec.name().unwrap_or("none")))]
pub fn run_tool(spec: &ToolSpec, text: &str) -> ToolOutcome {
    let ToolSpec::WebSearch { parameters } = spec else {
        return ToolOutcome::default();
    };

    match prepare_web_search(parameters, text) {
        Ok(outcome) => {
            let query = outcome
                .diagnostics
                .get("tool_query")
                .and_then(Value::as_str);
            debug!(query, "web search prepared");
            outcome
        }
        Err(err) => {
            warn!(error = %err, "tool failed; continuing without context");
            let mut diagnostics = Diagnostics::new();
            diagnostics.insert("tool_used", WEB_SEARCH);
            diagnostics.insert("tool_mode", "fallback");
            diagnostics.insert("tool_error", err.to_string());
            ToolOutcome {
                context: format!(
                    "Web search context could not be retrieved. Use your general knowledge to answer the prompt: {}",
                    truncate_chars(text, CONTEXT_PROMPT_CHARS)
                ),
                diagnostics,
                request_tool: None,
            }
        }
    }
}

fn prepare_web_search(raw: &Map<String, Value>, text: &str) -> Result<ToolOutcome, ToolError> {
    let parameters = sanitize_parameters(raw, text)?;
    let query = parameters
        .get("search_query")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut diagnostics = Diagnostics::new();
    diagnostics.insert("tool_used", WEB_SEARCH);
    diagnostics.insert("tool_mode", "openai");
    diagnostics.insert("tool_query", query.as_str());
    diagnostics.insert("tool_parameters", Value::Object(parameters.clone()).to_string());

    Ok(ToolOutcome {
        context: build_context(text, &query, &parameters),
        diagnostics,
        request_tool: Some(RequestTool {
            name: WEB_SEARCH,
            parameters,
        }),
    })
}

/// Normalize search parameters. The query falls back to the instruction
/// text when no explicit query is set or the explicit one collapses to
/// nothing.
fn sanitize_parameters(raw: &Map<String, Value>, text: &str) -> Result<Map<String, Value>, ToolError> {
    let mut out = Map::new();

    let explicit = QUERY_KEYS
        .iter()
        .find_map(|key| raw.get(*key).filter(|value| is_present(value)))
        .map(|value| collapse_query(&value_text(value)))
        .filter(|query| !query.is_empty());
    let query = explicit
        .or_else(|| Some(collapse_query(text)).filter(|query| !query.is_empty()))
        .ok_or(ToolError::EmptyQuery)?;
    out.insert("search_query".to_string(), Value::String(query));

    if let Some(max) = raw.get("max_results").and_then(cell_number) {
        let (low, high) = MAX_RESULTS_RANGE;
        out.insert("max_results".to_string(), Value::from((max.trunc() as i64).clamp(low, high)));
    }

    if let Some(recency) = raw.get("recency_filter").filter(|value| is_present(value)) {
        let recency = truncate_chars(&value_text(recency), MAX_RECENCY_CHARS);
        out.insert("recency_filter".to_string(), Value::String(recency));
    }

    if let Some(images) = raw.get("include_images") {
        out.insert("include_images".to_string(), Value::Bool(truthy(images)));
    }

    for (key, value) in raw {
        if HANDLED_KEYS.contains(&key.as_str()) || !is_primitive(value) {
            continue;
        }
        out.insert(key.clone(), value.clone());
    }

    Ok(out)
}

fn build_context(text: &str, query: &str, parameters: &Map<String, Value>) -> String {
    let mut prompt = truncate_chars(text, CONTEXT_PROMPT_CHARS);
    let query = truncate_chars(query, CONTEXT_QUERY_CHARS);
    if prompt.trim().is_empty() {
        prompt.clone_from(&query);
    }

    let mut parts = vec![
        "A live web search has been requested for real-time data.".to_string(),
        format!("Query: \"{query}\"."),
    ];
    let summary = summarize(parameters);
    if !summary.is_empty() {
        parts.push(format!("Preferences: {summary}."));
    }
    parts.push(format!(
        "If the web search tool is unavailable, rely on your general knowledge to answer the prompt: {prompt}"
    ));
    parts.join(" ")
}

fn summarize(parameters: &Map<String, Value>) -> String {
    let mut parts = Vec::new();
    if let Some(max) = parameters.get("max_results") {
        parts.push(format!("max results {max}"));
    }
    if let Some(recency) = parameters.get("recency_filter").and_then(Value::as_str) {
        parts.push(format!("recency filter {recency}"));
    }
    if let Some(images) = parameters.get("include_images").and_then(Value::as_bool) {
        parts.push(if images { "include images" } else { "text-only results" }.to_string());
    }
    for (key, value) in parameters {
        if HANDLED_KEYS.contains(&key.as_str()) || !is_present(value) {
            continue;
        }
        parts.push(format!(
            "{key}: {}",
            truncate_chars(&value_text(value), SUMMARY_VALUE_CHARS)
        ));
    }
    parts.join(", ")
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

fn collapse_query(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, MAX_QUERY_CHARS)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
