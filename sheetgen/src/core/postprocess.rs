//! Post-processor: dedupe, cap, coerce and render items into the output grid.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Number, Value};

use crate::core::types::{FieldType, Grid, Item, Record, Schema, Shape};
use crate::error::GenError;

pub const NO_RESULTS: &str = "(no results)";
pub const NO_DATA: &str = "(no data)";
pub const EMPTY_RECORD: &str = "{}";

static LEADING_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?")
        .expect("number regex should compile")
});

const DATE_TIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Render shaped items for `shape` as a single-column grid.
///
/// `cap` bounds how many distinct items are kept before truncating to
/// `target`.
pub fn post_process(
    shape: Shape,
    items: Vec<Item>,
    schema: Option<&Schema>,
    cap: u32,
    target: u32,
) -> Result<Grid, GenError> {
    match shape {
        Shape::Text => Ok(Grid::single(
            items.into_iter().next().map(item_text).unwrap_or_default(),
        )),
        Shape::List => Ok(render_list(items, cap, target)),
        Shape::Record => {
            let schema = require_schema(shape, schema)?;
            let record = items.into_iter().find_map(|item| match item {
                Item::Record(record) => Some(record),
                Item::Text(_) => None,
            });
            Ok(render_record(record.as_ref(), schema))
        }
        Shape::RecordList => {
            let schema = require_schema(shape, schema)?;
            Ok(render_record_list(items, schema, cap, target))
        }
    }
}

fn require_schema(shape: Shape, schema: Option<&Schema>) -> Result<&Schema, GenError> {
    schema.ok_or_else(|| GenError::InternalShape(format!("Rendering {shape} output requires a schema.")))
}

fn item_text(item: Item) -> String {
    match item {
        Item::Text(text) => text,
        Item::Record(record) => Value::Object(record).to_string(),
    }
}

fn render_list(items: Vec<Item>, cap: u32, target: u32) -> Grid {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    for item in items {
        let text = item_text(item).trim().to_string();
        if text.is_empty() || !seen.insert(dedupe_key(&text)) {
            continue;
        }
        kept.push(text);
        if kept.len() >= cap as usize {
            break;
        }
    }
    kept.truncate(target as usize);
    if kept.is_empty() {
        kept.push(NO_RESULTS.to_string());
    }
    Grid::from_column(kept)
}

/// Case and punctuation folded form used to detect duplicate list items.
pub fn dedupe_key(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn render_record(record: Option<&Record>, schema: &Schema) -> Grid {
    let Some(record) = record else {
        return Grid::single(NO_DATA);
    };
    let rows: Vec<String> = schema
        .fields
        .iter()
        .map(|field| {
            let raw = record.get(&field.key).unwrap_or(&Value::Null);
            let coerced = coerce_field(raw, field.field_type);
            format!("{}: {}", field.key, format_field(&coerced, field.field_type))
        })
        .collect();
    if rows.is_empty() {
        return Grid::single(NO_DATA);
    }
    Grid::from_column(rows)
}

fn render_record_list(items: Vec<Item>, schema: &Schema, cap: u32, target: u32) -> Grid {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for item in items {
        let Item::Record(record) = item else {
            continue;
        };
        let row = Value::Object(coerce_record(&record, schema)).to_string();
        if !seen.insert(row.clone()) {
            continue;
        }
        rows.push(row);
        if rows.len() >= cap as usize {
            break;
        }
    }
    rows.truncate(target as usize);
    if rows.is_empty() {
        rows.push(EMPTY_RECORD.to_string());
    }
    Grid::from_column(rows)
}

/// Project and coerce a record onto the schema, in field order.
pub fn coerce_record(record: &Record, schema: &Schema) -> Record {
    schema
        .fields
        .iter()
        .map(|field| {
            let raw = record.get(&field.key).unwrap_or(&Value::Null);
            (field.key.clone(), coerce_field(raw, field.field_type))
        })
        .collect()
}

/// Coerce one raw value to the JSON form of `field_type`.
///
/// Numbers and currency become numbers (or null), booleans become
/// true/false (or null), dates become ISO-8601 UTC strings (or null), and
/// everything else becomes a string.
pub fn coerce_field(value: &Value, field_type: FieldType) -> Value {
    match field_type {
        FieldType::Number | FieldType::Currency => {
            parse_number(value).map_or(Value::Null, number_value)
        }
        FieldType::Boolean => parse_bool(value).map_or(Value::Null, Value::Bool),
        FieldType::Date => parse_date(value).map_or(Value::Null, |date| {
            Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true))
        }),
        FieldType::String => Value::String(match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
    }
}

/// Display text for an already coerced value.
pub fn format_field(value: &Value, field_type: FieldType) -> String {
    match (value, field_type) {
        (Value::Null, _) => String::new(),
        (_, FieldType::Currency) => value
            .as_f64()
            .map(|amount| format!("${amount:.2}"))
            .unwrap_or_default(),
        (Value::String(s), FieldType::Date) => s.split('T').next().unwrap_or_default().to_string(),
        (Value::Bool(flag), _) => flag.to_string(),
        (Value::String(s), _) => s.clone(),
        (other, _) => other.to_string(),
    }
}

fn number_value(number: f64) -> Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if number.fract() == 0.0 && number.abs() < MAX_EXACT {
        return Value::from(number as i64);
    }
    Number::from_f64(number).map_or(Value::Null, Value::Number)
}

/// Lenient number parse: optional sign, leading currency symbols and
/// thousands separators are ignored, and trailing text after the number is
/// dropped.
fn parse_number(value: &Value) -> Option<f64> {
    let text = match value {
        Value::Number(n) => return n.as_f64(),
        Value::String(s) => s.trim(),
        _ => return None,
    };
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let cleaned: String = rest
        .trim_start_matches(['$', '€', '£', ' '])
        .chars()
        .filter(|c| *c != ',')
        .collect();
    let digits = LEADING_NUMBER_RE.find(&cleaned)?.as_str();
    let number: f64 = digits.parse().ok()?;
    let number = if negative { -number } else { number };
    number.is_finite().then_some(number)
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    let text = match value {
        Value::Number(n) => {
            let millis = n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64));
            return millis.and_then(DateTime::from_timestamp_millis);
        }
        Value::String(s) => s.trim(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Some(parsed) = DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
    {
        return Some(parsed.and_utc());
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::args::parse_schema;
    use serde_json::json;

    fn text_items(values: &[&str]) -> Vec<Item> {
        values.iter().map(|value| Item::Text((*value).to_string())).collect()
    }

    fn record(value: Value) -> Item {
        let Value::Object(map) = value else {
            panic!("record must be an object");
        };
        Item::Record(map)
    }

    #[test]
    fn text_wraps_first_item_or_empty() {
        let grid = post_process(Shape::Text, text_items(&["hi", "ignored"]), None, 10, 10)
            .expect("grid");
        assert_eq!(grid.column(), vec!["hi"]);
        let grid = post_process(Shape::Text, Vec::new(), None, 10, 10).expect("grid");
        assert_eq!(grid.column(), vec![""]);
    }

    #[test]
    fn list_dedupes_folded_forms_in_first_seen_order() {
        let items = text_items(&["Apple pie", "apple-pie!", "  Banana ", "APPLE PIE", "Cherry", ""]);
        let grid = post_process(Shape::List, items, None, 200, 10).expect("grid");
        assert_eq!(grid.column(), vec!["Apple pie", "Banana", "Cherry"]);
    }

    #[test]
    fn list_respects_cap_then_target() {
        let items = text_items(&["a", "b", "c", "d", "e"]);
        let grid = post_process(Shape::List, items.clone(), None, 200, 3).expect("grid");
        assert_eq!(grid.column(), vec!["a", "b", "c"]);
        let grid = post_process(Shape::List, items, None, 2, 3).expect("grid");
        assert_eq!(grid.column(), vec!["a", "b"]);
    }

    #[test]
    fn empty_list_has_placeholder() {
        let grid = post_process(Shape::List, text_items(&["  "]), None, 10, 10).expect("grid");
        assert_eq!(grid.column(), vec![NO_RESULTS]);
    }

    #[test]
    fn dedupe_key_folds_unicode() {
        assert_eq!(dedupe_key("Café — Ünïcode!"), "café ünïcode");
        assert_eq!(dedupe_key("东京, 日本"), "东京 日本");
    }

    #[test]
    fn record_renders_one_row_per_field() {
        let schema = parse_schema("name;price:currency;launched:date;active:boolean;units:number")
            .expect("schema");
        let item = record(json!({
            "name": "Widget",
            "price": "$1,234.5",
            "launched": "2024-03-15T10:00:00Z",
            "active": "yes",
            "units": "n/a",
        }));
        let grid = post_process(Shape::Record, vec![item], Some(&schema), 200, 10).expect("grid");
        assert_eq!(
            grid.column(),
            vec![
                "name: Widget",
                "price: $1234.50",
                "launched: 2024-03-15",
                "active: true",
                "units: ",
            ]
        );
    }

    #[test]
    fn missing_record_is_no_data() {
        let schema = parse_schema("name").expect("schema");
        let grid = post_process(Shape::Record, Vec::new(), Some(&schema), 200, 10).expect("grid");
        assert_eq!(grid.column(), vec![NO_DATA]);
    }

    #[test]
    fn record_list_coerces_and_keeps_schema_order() {
        let schema = parse_schema("title:string;score:number").expect("schema");
        let items = vec![
            record(json!({"score": "7", "title": "A"})),
            record(json!({"title": "B", "score": "oops"})),
            record(json!({"title": "A", "score": 7})),
            record(json!({"title": "C", "score": 2.5})),
        ];
        let grid = post_process(Shape::RecordList, items, Some(&schema), 200, 10).expect("grid");
        assert_eq!(
            grid.column(),
            vec![
                r#"{"title":"A","score":7}"#,
                r#"{"title":"B","score":null}"#,
                r#"{"title":"C","score":2.5}"#,
            ]
        );
    }

    #[test]
    fn record_list_truncates_and_has_placeholder() {
        let schema = parse_schema("n:number").expect("schema");
        let items = (1..=5).map(|n| record(json!({"n": n}))).collect();
        let grid = post_process(Shape::RecordList, items, Some(&schema), 200, 2).expect("grid");
        assert_eq!(grid.len(), 2);

        let grid = post_process(Shape::RecordList, Vec::new(), Some(&schema), 200, 2).expect("grid");
        assert_eq!(grid.column(), vec![EMPTY_RECORD]);
    }

    #[test]
    fn coerce_field_handles_each_type() {
        assert_eq!(coerce_field(&json!("€ 12"), FieldType::Currency), json!(12));
        assert_eq!(coerce_field(&json!("-3.5 points"), FieldType::Number), json!(-3.5));
        assert_eq!(coerce_field(&json!(""), FieldType::Number), Value::Null);
        assert_eq!(coerce_field(&json!(true), FieldType::Number), Value::Null);
        assert_eq!(coerce_field(&json!("No"), FieldType::Boolean), json!(false));
        assert_eq!(coerce_field(&json!(0), FieldType::Boolean), json!(false));
        assert_eq!(coerce_field(&json!("maybe"), FieldType::Boolean), Value::Null);
        assert_eq!(coerce_field(&Value::Null, FieldType::String), json!(""));
        assert_eq!(coerce_field(&json!(42), FieldType::String), json!("42"));
    }

    #[test]
    fn coerce_field_parses_common_date_forms() {
        let iso = json!("2024-03-15T00:00:00.000Z");
        for raw in ["2024-03-15", "2024/03/15", "03/15/2024", "March 15, 2024", "15 Mar 2024"] {
            assert_eq!(coerce_field(&json!(raw), FieldType::Date), iso, "{raw}");
        }
        assert_eq!(
            coerce_field(&json!("2024-03-15T12:30:00+02:00"), FieldType::Date),
            json!("2024-03-15T10:30:00.000Z")
        );
        assert_eq!(
            coerce_field(&json!(1_710_460_800_000_i64), FieldType::Date),
            json!("2024-03-15T00:00:00.000Z")
        );
        assert_eq!(coerce_field(&json!("someday"), FieldType::Date), Value::Null);
    }

    #[test]
    fn fractional_epoch_millis_truncate() {
        assert_eq!(
            coerce_field(&json!(1.7e12), FieldType::Date),
            json!("2023-11-14T22:13:20.000Z")
        );
        assert_eq!(
            coerce_field(&json!(1_710_460_800_000.75), FieldType::Date),
            json!("2024-03-15T00:00:00.000Z")
        );
        assert_eq!(coerce_field(&json!(1e300), FieldType::Date), Value::Null);
    }

    #[test]
    fn format_field_renders_display_text() {
        assert_eq!(format_field(&json!(3), FieldType::Currency), "$3.00");
        assert_eq!(format_field(&json!(2.5), FieldType::Number), "2.5");
        assert_eq!(format_field(&json!(false), FieldType::Boolean), "false");
        assert_eq!(format_field(&Value::Null, FieldType::Date), "");
        assert_eq!(
            format_field(&json!("2024-03-15T00:00:00.000Z"), FieldType::Date),
            "2024-03-15"
        );
    }
}
