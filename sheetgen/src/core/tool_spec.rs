//! Normalization of the optional tool setting into a closed tagged union.
//!
//! A tool may arrive as a plain name (`web_search`, `none`), as a mapping
//! (from structured settings), or as JSON text beginning with `{` or `[`.
//! Anything that names a tool other than `web_search` is rejected instead of
//! being silently ignored.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::GenError;

pub const WEB_SEARCH: &str = "web_search";

/// Maximum nesting of mappings/arrays kept inside tool parameters.
pub const MAX_PARAM_DEPTH: usize = 3;
/// Arrays inside tool parameters keep at most this many elements.
pub const MAX_ARRAY_LEN: usize = 10;

/// Keys that may carry the tool name, checked in order.
const NAME_KEYS: [&str; 3] = ["name", "type", "tool"];
/// Sub-mappings merged into the parameters, later keys winning.
const PARAM_KEYS: [&str; 4] = ["parameters", "args", "arguments", "web_search"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ToolSpec {
    #[default]
    None,
    WebSearch { parameters: Map<String, Value> },
}

impl ToolSpec {
    /// Normalize a raw tool setting.
    pub fn parse(raw: &Value) -> Result<Self, GenError> {
        match raw {
            Value::Null => Ok(ToolSpec::None),
            Value::String(text) => parse_text(text),
            Value::Object(map) => from_mapping(map),
            Value::Array(items) => from_array(items),
            other => Err(GenError::BadToolSpec(format!(
                "Unable to determine tool name from {other}."
            ))),
        }
    }

    pub fn name(&self) -> Option<&'static str> {
        match self {
            ToolSpec::None => None,
            ToolSpec::WebSearch { .. } => Some(WEB_SEARCH),
        }
    }
}

fn parse_text(text: &str) -> Result<ToolSpec, GenError> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|err| GenError::BadToolSpec(format!("Malformed tool spec: {err}")))?;
        return match value {
            Value::Object(map) => from_mapping(&map),
            Value::Array(items) => from_array(&items),
            _ => Err(GenError::BadToolSpec("Malformed tool spec.".to_string())),
        };
    }
    named(trimmed, Map::new())
}

fn named(name: &str, parameters: Map<String, Value>) -> Result<ToolSpec, GenError> {
    let name = name.trim();
    if name.is_empty() || name.eq_ignore_ascii_case("none") {
        return Ok(ToolSpec::None);
    }
    if name.eq_ignore_ascii_case(WEB_SEARCH) {
        return Ok(ToolSpec::WebSearch { parameters });
    }
    Err(GenError::UnknownTool(format!("Unsupported tool: {name}")))
}

fn from_array(items: &[Value]) -> Result<ToolSpec, GenError> {
    match items.first() {
        Some(Value::Object(map)) => from_mapping(map),
        Some(Value::String(name)) if !name.trim().starts_with(['{', '[']) => named(name, Map::new()),
        Some(_) => Err(GenError::BadToolSpec(
            "Tool list entries must be objects or names.".to_string(),
        )),
        None => Err(GenError::BadToolSpec("Tool list is empty.".to_string())),
    }
}

fn from_mapping(map: &Map<String, Value>) -> Result<ToolSpec, GenError> {
    let name = NAME_KEYS
        .iter()
        .find_map(|key| {
            map.get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
        })
        .ok_or_else(|| GenError::BadToolSpec("Unable to determine tool name.".to_string()))?;

    let mut merged = Map::new();
    for (key, value) in map {
        if NAME_KEYS.contains(&key.as_str()) || PARAM_KEYS.contains(&key.as_str()) {
            continue;
        }
        if is_primitive(value) {
            merged.insert(key.clone(), value.clone());
        }
    }
    for key in PARAM_KEYS {
        if let Some(Value::Object(sub)) = map.get(key) {
            for (inner_key, inner_value) in sub {
                merged.insert(inner_key.clone(), inner_value.clone());
            }
        }
    }

    named(name, sanitize_mapping(&merged, 1))
}

pub(crate) fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

fn sanitize_mapping(map: &Map<String, Value>, depth: usize) -> Map<String, Value> {
    map.iter()
        .filter_map(|(key, value)| sanitize_value(value, depth).map(|value| (key.clone(), value)))
        .collect()
}

fn sanitize_value(value: &Value, depth: usize) -> Option<Value> {
    match value {
        Value::Object(map) => {
            (depth < MAX_PARAM_DEPTH).then(|| Value::Object(sanitize_mapping(map, depth + 1)))
        }
        Value::Array(items) => (depth < MAX_PARAM_DEPTH).then(|| {
            Value::Array(
                items
                    .iter()
                    .take(MAX_ARRAY_LEN)
                    .filter_map(|item| sanitize_value(item, depth + 1))
                    .collect(),
            )
        }),
        primitive => Some(primitive.clone()),
    }
}
