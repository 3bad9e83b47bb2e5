//! Shared deterministic types for the generation pipeline.
//!
//! These types define stable contracts between pipeline stages. They hold no
//! references to settings or transports and are rebuilt on every invocation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GenError;

/// Requested output structure for one formula call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Text,
    List,
    Record,
    RecordList,
}

impl Shape {
    pub fn as_str(self) -> &'static str {
        match self {
            Shape::Text => "text",
            Shape::List => "list",
            Shape::Record => "record",
            Shape::RecordList => "record_list",
        }
    }

    /// Record shapes take a mandatory schema as their second argument.
    pub fn needs_schema(self) -> bool {
        matches!(self, Shape::Record | Shape::RecordList)
    }

    /// Shapes whose output cardinality is governed by the target count.
    pub fn is_counted(self) -> bool {
        matches!(self, Shape::List | Shape::RecordList)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of field types a schema may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Currency,
}

impl FieldType {
    /// Parse a type name (trimmed, case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "string" => Some(FieldType::String),
            "number" => Some(FieldType::Number),
            "boolean" => Some(FieldType::Boolean),
            "date" => Some(FieldType::Date),
            "currency" => Some(FieldType::Currency),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Currency => "currency",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Normalized identifier (see `core::args::normalize_key`).
    pub key: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Ordered field declaration. Duplicate keys are allowed; the last
/// declaration wins when a record is projected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<SchemaField>,
}

impl Schema {
    /// Render as `key: type, key: type` for prompt instructions.
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|field| format!("{}: {}", field.key, field.field_type.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.fields.iter().any(|field| field.key == key)
    }
}

/// Field key to value mapping, in schema order.
pub type Record = Map<String, Value>;

/// Output of the shaper, consumed by the post-processor.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Text(String),
    Record(Record),
}

/// Observational key/value data merged across pipeline stages.
///
/// Never affects the returned grid. Later merges overwrite earlier keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(BTreeMap<String, Value>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Merge `other` into `self`; keys from `other` win.
    pub fn merge(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Two-dimensional single-column output that a formula cell spills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Grid {
    rows: Vec<Vec<String>>,
}

impl Grid {
    /// One row per value, one column.
    pub fn from_column(values: Vec<String>) -> Self {
        Self {
            rows: values.into_iter().map(|value| vec![value]).collect(),
        }
    }

    pub fn single(value: impl Into<String>) -> Self {
        Self::from_column(vec![value.into()])
    }

    /// The single-cell grid shown when a formula fails.
    pub fn from_error(err: &GenError) -> Self {
        Self::single(err.render())
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// First cell of every row.
    pub fn column(&self) -> Vec<&str> {
        self.rows
            .iter()
            .map(|row| row.first().map(String::as_str).unwrap_or(""))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diagnostics_merge_overwrites_earlier_keys() {
        let mut first = Diagnostics::new();
        first.insert("requested", 3);
        first.insert("tool_used", "web_search");
        let mut second = Diagnostics::new();
        second.insert("requested", 5);

        first.merge(second);
        assert_eq!(first.get("requested"), Some(&json!(5)));
        assert_eq!(first.get("tool_used"), Some(&json!("web_search")));
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn grid_is_single_column() {
        let grid = Grid::from_column(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(grid.rows(), &[vec!["a".to_string()], vec!["b".to_string()]]);
        assert_eq!(grid.column(), vec!["a", "b"]);
    }

    #[test]
    fn error_grid_renders_tag() {
        let grid = Grid::from_error(&GenError::MissingInput("Missing prompt text.".into()));
        assert_eq!(grid.column(), vec!["#GPT_MISSING_INPUT Missing prompt text."]);
    }

    #[test]
    fn schema_describe_lists_fields_in_order() {
        let schema = Schema {
            fields: vec![
                SchemaField {
                    key: "title".to_string(),
                    field_type: FieldType::String,
                },
                SchemaField {
                    key: "score".to_string(),
                    field_type: FieldType::Number,
                },
            ],
        };
        assert_eq!(schema.describe(), "title: string, score: number");
    }
}
