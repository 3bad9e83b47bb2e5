//! Positional formula arguments → structured generation request.
//!
//! Layout: `text, [schema,] system_message, model, max_tokens, temperature, tool`.
//! The schema slot exists only for record shapes. Every override is optional
//! and a blank cell is the same as an absent one.

use serde_json::Value;

use crate::core::count::infer_count;
use crate::core::types::{FieldType, Schema, SchemaField, Shape};
use crate::error::GenError;

/// Call-level configuration overrides taken from the formula arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub system_message: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    /// Raw tool value; normalized by the configuration resolver.
    pub tool: Option<Value>,
}

/// Structured request produced from one formula call.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArgs {
    pub shape: Shape,
    pub text: String,
    /// Present for record shapes only.
    pub schema: Option<Schema>,
    /// Count inferred from the instruction text, falling back to the
    /// internal default; `None` for the text shape.
    pub inferred_count: Option<u32>,
    pub overrides: Overrides,
}

/// Parse the positional argument list for `shape`.
pub fn parse_args(shape: Shape, args: &[Value]) -> Result<ParsedArgs, GenError> {
    let text = args
        .first()
        .and_then(cell_raw_text)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| GenError::MissingInput("Missing prompt text.".to_string()))?;

    let mut rest = args.iter().skip(1);
    let schema = if shape.needs_schema() {
        let source = rest
            .next()
            .and_then(cell_text)
            .ok_or_else(|| GenError::BadSchema("Schema is required for record outputs.".into()))?;
        Some(parse_schema(&source)?)
    } else {
        None
    };

    let overrides = Overrides {
        system_message: rest.next().and_then(cell_text),
        model: rest.next().and_then(cell_text),
        max_tokens: rest.next().and_then(cell_positive_int),
        temperature: rest.next().and_then(cell_number),
        tool: rest.next().filter(|value| is_present(value)).cloned(),
    };

    let inferred_count = shape.is_counted().then(|| infer_count(&text));

    Ok(ParsedArgs {
        shape,
        text,
        schema,
        inferred_count,
        overrides,
    })
}

/// Parse `name:type;name:type;` into an ordered schema.
///
/// The type defaults to `string` when omitted; unknown types, empty keys, and
/// schemas without any field are rejected.
pub fn parse_schema(source: &str) -> Result<Schema, GenError> {
    let segments: Vec<&str> = source
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        return Err(GenError::BadSchema(
            "Provide fields using \"name:type;\" syntax.".to_string(),
        ));
    }

    let mut fields = Vec::with_capacity(segments.len());
    for segment in segments {
        let mut parts = segment.split(':');
        let key = normalize_key(parts.next().unwrap_or_default());
        if key.is_empty() {
            return Err(GenError::BadSchema(format!(
                "Missing field name in schema segment: {segment}"
            )));
        }
        let field_type = match parts.next().map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => FieldType::parse(raw)
                .ok_or_else(|| GenError::BadSchema(format!("Unsupported field type: {raw}")))?,
            None => FieldType::String,
        };
        fields.push(SchemaField { key, field_type });
    }

    Ok(Schema { fields })
}

/// Normalize a field key: whitespace runs become `_`, anything outside
/// `[A-Za-z0-9_]` is dropped, and the result is lowercased.
pub fn normalize_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_space = false;
    for c in raw.trim().chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
                in_space = true;
            }
            continue;
        }
        in_space = false;
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}

/// A cell counts as present unless it is null or a blank string.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn cell_raw_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Trimmed, non-empty text for a cell (numbers and booleans stringified).
pub fn cell_text(value: &Value) -> Option<String> {
    cell_raw_text(value)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Finite number from a numeric cell or numeric text.
pub fn cell_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// Positive integer (fractions truncate) from a numeric cell or text.
pub fn cell_positive_int(value: &Value) -> Option<u32> {
    let number = cell_number(value)?.trunc();
    if number < 1.0 {
        return None;
    }
    Some(number.min(f64::from(u32::MAX)) as u32)
}

/// Boolean from a boolean cell or the text `true`/`false`.
pub fn cell_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
