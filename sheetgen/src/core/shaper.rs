//! Shaper: raw completion text → typed intermediate items.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::core::args::normalize_key;
use crate::core::types::{Diagnostics, Item, Record, Schema, Shape};
use crate::error::GenError;

static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-•*]+|[0-9]+[.)])\s*").expect("bullet regex should compile")
});

static OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("object regex should compile"));

/// Items plus shaping diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shaped {
    pub items: Vec<Item>,
    pub diagnostics: Diagnostics,
}

/// Convert completion `content` into items for `shape`.
pub fn shape_items(
    shape: Shape,
    content: &str,
    schema: Option<&Schema>,
    strict: bool,
    target: u32,
) -> Result<Shaped, GenError> {
    match shape {
        Shape::Text => Ok(Shaped {
            items: vec![Item::Text(content.to_string())],
            diagnostics: Diagnostics::new(),
        }),
        Shape::List => Ok(shape_list(content, target)),
        Shape::Record => shape_record(content, require_schema(shape, schema)?, strict),
        Shape::RecordList => shape_record_list(content, require_schema(shape, schema)?, strict, target),
    }
}

fn require_schema(shape: Shape, schema: Option<&Schema>) -> Result<&Schema, GenError> {
    schema
        .filter(|schema| !schema.fields.is_empty())
        .ok_or_else(|| GenError::InternalShape(format!("Shaping {shape} output requires a schema.")))
}

fn shape_list(content: &str, target: u32) -> Shaped {
    let mut lines: Vec<String> = content
        .lines()
        .map(strip_bullet)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if lines.is_empty() && !content.trim().is_empty() {
        lines.push(content.trim().to_string());
    }

    let mut diagnostics = Diagnostics::new();
    diagnostics.insert("requested", target);
    diagnostics.insert("received", lines.len());
    Shaped {
        items: lines.into_iter().map(Item::Text).collect(),
        diagnostics,
    }
}

/// Strip one leading bullet or number marker and surrounding whitespace.
pub fn strip_bullet(line: &str) -> &str {
    let rest = match BULLET_RE.find(line) {
        Some(marker) => &line[marker.end()..],
        None => line,
    };
    rest.trim()
}

fn shape_record(content: &str, schema: &Schema, strict: bool) -> Result<Shaped, GenError> {
    let items = parse_record(content, schema, strict)?
        .map(Item::Record)
        .into_iter()
        .collect();
    let mut diagnostics = Diagnostics::new();
    diagnostics.insert("record_fields", schema.fields.len());
    Ok(Shaped { items, diagnostics })
}

fn shape_record_list(
    content: &str,
    schema: &Schema,
    strict: bool,
    target: u32,
) -> Result<Shaped, GenError> {
    let mut records: Vec<Record> = parse_document(content)
        .map(|maps| maps.iter().map(|map| project(map, schema)).collect())
        .unwrap_or_default();
    if records.is_empty() {
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with("```") {
                continue;
            }
            records.extend(parse_record(line, schema, strict)?);
        }
    }
    if records.is_empty() {
        records.extend(parse_record(content, schema, strict)?);
    }

    let mut diagnostics = Diagnostics::new();
    diagnostics.insert("requested", target);
    diagnostics.insert("received", records.len());
    Ok(Shaped {
        items: records.into_iter().map(Item::Record).collect(),
        diagnostics,
    })
}

/// Parse one candidate and project it onto `schema`.
///
/// Tried in order: direct JSON, the outermost `{...}` substring, then
/// `key: value` lines. `None` means nothing usable was found; in strict mode
/// that is an error instead.
pub fn parse_record(text: &str, schema: &Schema, strict: bool) -> Result<Option<Record>, GenError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let source = parse_object(trimmed)
        .or_else(|| OBJECT_RE.find(trimmed).and_then(|m| parse_object(m.as_str())))
        .or_else(|| parse_key_values(trimmed, schema));

    match source {
        Some(source) => Ok(Some(project(&source, schema))),
        None if strict => Err(GenError::JsonParse(
            "Unable to parse record output.".to_string(),
        )),
        None => Ok(None),
    }
}

/// Objects from the content read as a stream of JSON values, with code fence
/// lines removed. Arrays contribute their object elements. `None` when any
/// value fails to parse or no object is found.
fn parse_document(content: &str) -> Option<Vec<Map<String, Value>>> {
    let body: String = content
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut maps = Vec::new();
    for value in serde_json::Deserializer::from_str(&body).into_iter::<Value>() {
        match value.ok()? {
            Value::Object(map) => maps.push(map),
            Value::Array(values) => maps.extend(values.into_iter().filter_map(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            })),
            _ => {}
        }
    }
    (!maps.is_empty()).then_some(maps)
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// `key: value` lines, split on the first colon. Usable only when at least
/// one key names a schema field.
fn parse_key_values(text: &str, schema: &Schema) -> Option<Map<String, Value>> {
    let mut map = Map::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = normalize_key(strip_bullet(key));
        if key.is_empty() {
            continue;
        }
        map.insert(key, Value::String(value.trim().to_string()));
    }
    map.keys().any(|key| schema.has_key(key)).then_some(map)
}

/// Project `source` onto the schema in field order. Keys match exactly
/// first, then by normalized form; missing fields become empty strings.
fn project(source: &Map<String, Value>, schema: &Schema) -> Record {
    let mut record = Record::new();
    for field in &schema.fields {
        let value = source
            .get(&field.key)
            .or_else(|| {
                source
                    .iter()
                    .find(|(key, _)| normalize_key(key) == field.key)
                    .map(|(_, value)| value)
            })
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()));
        record.insert(field.key.clone(), value);
    }
    record
}
