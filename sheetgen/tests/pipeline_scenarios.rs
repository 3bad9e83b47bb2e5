//! End-to-end pipeline scenarios over a scripted completion service.
//!
//! Each test runs a formula surface from raw cell arguments to the output grid
//! and checks what was sent to the service along the way.

use serde_json::{Value, json};

use sheetgen::Pipeline;
use sheetgen::core::resolve::{Tier, keys};
use sheetgen::core::types::Shape;
use sheetgen::test_support::{
    ScriptedTransport, error_body, output_text_body, store_with_key, test_client,
    tool_rejection_body,
};

#[test]
fn list_of_three_product_names() {
    let store = store_with_key();
    let transport = ScriptedTransport::new().respond(
        200,
        output_text_body("1. Lumen\n2. Brightly\n3. lumen!\n4. Glowbox\n5. Beacon"),
    );
    let pipeline = Pipeline::new(&store, test_client(&transport));

    let generation = pipeline
        .generate(Shape::List, &[json!("3 product name ideas")])
        .expect("generate");

    assert_eq!(generation.config.target_count(), 3);
    assert_eq!(generation.grid.column(), vec!["Lumen", "Brightly", "Glowbox"]);

    let body = &transport.requests()[0].body;
    assert_eq!(
        body["input"][0]["content"],
        json!("Return exactly 3 items, one per line, without numbering or bullet characters.")
    );
    assert_eq!(
        body["input"][1]["content"],
        json!("3 product name ideas\n\nNumber of items needed: 3.")
    );
}

#[test]
fn hard_cap_bounds_the_list() {
    let store = store_with_key().with(Tier::Document, keys::HARD_COUNT_CAP, json!(2));
    let transport = ScriptedTransport::new().respond(200, output_text_body("a\nb\nc\nd"));
    let pipeline = Pipeline::new(&store, test_client(&transport));

    let grid = pipeline.list(&[json!("give me a dozen ideas")]);
    assert_eq!(grid.column(), vec!["a", "b"]);
}

#[test]
fn rejected_web_search_falls_back_to_plain_completion() {
    let store = store_with_key();
    let transport = ScriptedTransport::new()
        .respond(400, tool_rejection_body())
        .respond(200, output_text_body("Rust 1.90 shipped."));
    let pipeline = Pipeline::new(&store, test_client(&transport));

    let args = [
        json!("latest rust release"),
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Null,
        json!("web_search"),
    ];
    let generation = pipeline.generate(Shape::Text, &args).expect("generate");

    assert_eq!(generation.grid.column(), vec!["Rust 1.90 shipped."]);
    assert_eq!(generation.diagnostics.get("tool_dropped"), Some(&json!(true)));
    assert_eq!(generation.diagnostics.get("model_attempts"), Some(&json!(2)));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body["tools"], json!([{"type": "web_search"}]));
    assert!(requests[1].body.get("tools").is_none());
    assert_eq!(transport.remaining(), 0);
}

#[test]
fn record_list_coerces_fields_in_schema_order() {
    let store = store_with_key();
    let transport = ScriptedTransport::new().respond(
        200,
        output_text_body("{\"title\":\"A\",\"score\":\"7\"}\n{\"score\":\"$1,200\",\"title\":\"B\"}"),
    );
    let pipeline = Pipeline::new(&store, test_client(&transport));

    let grid = pipeline.record_list(&[json!("2 movies"), json!("title:string;score:number;")]);
    assert_eq!(
        grid.column(),
        vec![r#"{"title":"A","score":7}"#, r#"{"title":"B","score":1200}"#]
    );
}

#[test]
fn record_renders_key_value_rows() {
    let store = store_with_key();
    let transport = ScriptedTransport::new().respond(
        200,
        output_text_body("```json\n{\"name\":\"Ada\",\"born\":\"1815-12-10\",\"salary\":\"1000\"}\n```"),
    );
    let pipeline = Pipeline::new(&store, test_client(&transport));

    let grid = pipeline.record(&[json!("Ada Lovelace"), json!("name;born:date;salary:currency;alive:boolean")]);
    assert_eq!(
        grid.column(),
        vec!["name: Ada", "born: 1815-12-10", "salary: $1000.00", "alive: "]
    );
}

#[test]
fn strict_mode_surfaces_parse_failures() {
    let store = store_with_key().with(Tier::Installation, keys::STRICT, json!(true));
    let transport = ScriptedTransport::new().respond(200, output_text_body("Sorry, I cannot do that."));
    let pipeline = Pipeline::new(&store, test_client(&transport));

    let grid = pipeline.record(&[json!("a city"), json!("name;population:number")]);
    assert_eq!(grid.column(), vec!["#GPT_JSON_PARSE Unable to parse record output."]);
}

#[test]
fn lenient_mode_shows_placeholder_for_unparseable_record() {
    let store = store_with_key();
    let transport = ScriptedTransport::new().respond(200, output_text_body("Sorry, I cannot do that."));
    let pipeline = Pipeline::new(&store, test_client(&transport));

    let grid = pipeline.record(&[json!("a city"), json!("name;population:number")]);
    assert_eq!(grid.column(), vec!["(no data)"]);
}

#[test]
fn rate_limit_is_retried_once_then_reported() {
    let store = store_with_key();
    let transport = ScriptedTransport::new()
        .respond(429, error_body("Rate limit reached."))
        .respond(429, error_body("Rate limit reached."));
    let pipeline = Pipeline::new(&store, test_client(&transport));

    let grid = pipeline.text(&[json!("hello")]);
    assert_eq!(grid.column(), vec!["#GPT_RATE_LIMIT Rate limit reached."]);
    assert_eq!(transport.requests().len(), 2);
}

#[test]
fn transient_failure_recovers_on_retry() {
    let store = store_with_key();
    let transport = ScriptedTransport::new()
        .respond(503, error_body("overloaded"))
        .respond(200, output_text_body("fine now"));
    let pipeline = Pipeline::new(&store, test_client(&transport));

    let generation = pipeline.generate(Shape::Text, &[json!("hello")]).expect("generate");
    assert_eq!(generation.grid.column(), vec!["fine now"]);
    assert_eq!(generation.diagnostics.get("model_attempts"), Some(&json!(2)));
}

#[test]
fn unknown_tool_fails_before_any_request() {
    let store = store_with_key().with(Tier::Document, keys::DEFAULT_TOOL, json!("{\"name\":\"code_interpreter\"}"));
    let transport = ScriptedTransport::new();
    let pipeline = Pipeline::new(&store, test_client(&transport));

    let grid = pipeline.text(&[json!("hello")]);
    assert_eq!(grid.column(), vec!["#GPT_TOOL_UNKNOWN Unsupported tool: code_interpreter"]);
    assert!(transport.requests().is_empty());
}

#[test]
fn empty_list_response_shows_placeholder() {
    let store = store_with_key();
    let transport = ScriptedTransport::new().respond(200, output_text_body("  \n \n"));
    let pipeline = Pipeline::new(&store, test_client(&transport));

    let grid = pipeline.list(&[json!("5 ideas")]);
    assert_eq!(grid.column(), vec!["(no results)"]);
}
