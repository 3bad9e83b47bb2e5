//! Pipeline orchestrator and the per-shape formula surfaces.
//!
//! Stages run in a fixed order: parse, resolve, tool, prompt, complete,
//! shape, post-process. Every stage except the tool runner propagates its
//! error unchanged; the surfaces render that error as a one-cell grid.

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::args::parse_args;
use crate::core::postprocess::post_process;
use crate::core::prompt::{PromptInputs, build_prompt};
use crate::core::resolve::{ResolvedConfig, SettingsStore, resolve_config, resolve_credential};
use crate::core::shaper::shape_items;
use crate::core::tools::run_tool;
use crate::core::types::{Diagnostics, Grid, Shape};
use crate::error::GenError;
use crate::io::client::{CompletionRequest, ModelClient};

/// Output of one successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub grid: Grid,
    pub diagnostics: Diagnostics,
    pub config: ResolvedConfig,
}

pub struct Pipeline<'a> {
    store: &'a dyn SettingsStore,
    client: ModelClient,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a dyn SettingsStore, client: ModelClient) -> Self {
        Self { store, client }
    }

    /// Run every stage for one formula call.
    #[instrument(skip_all, fields(shape = %shape))]
    pub fn generate(&self, shape: Shape, args: &[Value]) -> Result<Generation, GenError> {
        let parsed = parse_args(shape, args)?;
        let config = resolve_config(&parsed, self.store)?;
        let target = config.target_count();
        debug!(
            model = %config.model,
            target,
            tool = config.tool.name().unwrap_or("none"),
            "configuration resolved"
        );

        let tool = run_tool(&config.tool, &parsed.text);
        let prompt = build_prompt(&PromptInputs {
            shape,
            text: &parsed.text,
            schema: parsed.schema.as_ref(),
            config: &config,
            tool_context: &tool.context,
        })?;

        let credential = resolve_credential(self.store)?;
        let completion = self.client.complete(
            &CompletionRequest {
                model: config.model.clone(),
                messages: prompt.messages,
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                tool: tool.request_tool,
            },
            &credential,
        )?;

        let mut diagnostics = tool.diagnostics;
        diagnostics.insert("tool_dropped", completion.tool_dropped);
        diagnostics.insert("model_attempts", completion.attempts);
        if let Some(usage) = completion.usage {
            diagnostics.insert("usage", usage);
        }

        let shaped = shape_items(
            shape,
            &completion.text,
            parsed.schema.as_ref(),
            config.strict,
            target,
        )?;
        diagnostics.merge(shaped.diagnostics);

        let grid = post_process(
            shape,
            shaped.items,
            parsed.schema.as_ref(),
            config.hard_count_cap,
            target,
        )?;
        debug!(rows = grid.len(), "generation complete");

        Ok(Generation {
            grid,
            diagnostics,
            config,
        })
    }

    /// Single text cell.
    pub fn text(&self, args: &[Value]) -> Grid {
        self.surface(Shape::Text, args)
    }

    /// One item per row.
    pub fn list(&self, args: &[Value]) -> Grid {
        self.surface(Shape::List, args)
    }

    /// One `key: value` row per schema field.
    pub fn record(&self, args: &[Value]) -> Grid {
        self.surface(Shape::Record, args)
    }

    /// One compact JSON object per row.
    pub fn record_list(&self, args: &[Value]) -> Grid {
        self.surface(Shape::RecordList, args)
    }

    fn surface(&self, shape: Shape, args: &[Value]) -> Grid {
        match self.generate(shape, args) {
            Ok(generation) => generation.grid,
            Err(err) => {
                warn!(tag = err.tag(), error = %err, "formula failed");
                Grid::from_error(&err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resolve::{Tier, keys};
    use crate::io::settings::MemoryStore;
    use crate::test_support::{
        ScriptedTransport, output_blocks_body, output_text_body, store_with_key, test_client,
    };
    use serde_json::json;

    #[test]
    fn text_surface_returns_one_cell() {
        let store = store_with_key();
        let transport = ScriptedTransport::new().respond(200, output_text_body("Hello!"));
        let pipeline = Pipeline::new(&store, test_client(&transport));
        let grid = pipeline.text(&[json!("Say hello")]);
        assert_eq!(grid.column(), vec!["Hello!"]);
    }

    #[test]
    fn errors_render_as_single_cell() {
        let store = MemoryStore::new();
        let transport = ScriptedTransport::new();
        let pipeline = Pipeline::new(&store, test_client(&transport));

        let grid = pipeline.list(&[json!("")]);
        assert_eq!(grid.column(), vec!["#GPT_MISSING_INPUT Missing prompt text."]);

        let grid = pipeline.record(&[json!("a car"), json!("price:money")]);
        assert_eq!(grid.column(), vec!["#GPT_BAD_SCHEMA Unsupported field type: money"]);

        let grid = pipeline.text(&[json!("hi")]);
        assert_eq!(grid.len(), 1);
        assert!(grid.column()[0].starts_with("#GPT_NO_KEY "));
        assert!(transport.requests().is_empty(), "no request without a key");
    }

    #[test]
    fn diagnostics_merge_tool_client_and_shaper() {
        let store = store_with_key().with(Tier::Document, keys::DEFAULT_TOOL, json!("web_search"));
        let transport = ScriptedTransport::new().respond(200, output_blocks_body(&["- a\n", "- b\n- c"]));
        let pipeline = Pipeline::new(&store, test_client(&transport));
        let generation = pipeline
            .generate(Shape::List, &[json!("list 2 headlines")])
            .expect("generate");

        assert_eq!(generation.grid.column(), vec!["a", "b"]);
        let diagnostics = &generation.diagnostics;
        assert_eq!(diagnostics.get("tool_used"), Some(&json!("web_search")));
        assert_eq!(diagnostics.get("tool_query"), Some(&json!("list 2 headlines")));
        assert_eq!(diagnostics.get("tool_dropped"), Some(&json!(false)));
        assert_eq!(diagnostics.get("model_attempts"), Some(&json!(1)));
        assert_eq!(diagnostics.get("requested"), Some(&json!(2)));
        assert_eq!(diagnostics.get("received"), Some(&json!(3)));

        let body = &transport.requests()[0].body;
        let system = body["input"][0]["content"].as_str().expect("system message");
        assert!(system.contains("Tool context:\nA live web search has been requested"));
        assert_eq!(body["tools"], json!([{"type": "web_search"}]));
    }

    #[test]
    fn call_level_overrides_reach_the_request() {
        let store = store_with_key().with(Tier::Installation, keys::MODEL, json!("install-model"));
        let transport = ScriptedTransport::new().respond(200, output_text_body("ok"));
        let pipeline = Pipeline::new(&store, test_client(&transport));
        let args = [json!("hi"), json!("Be brief."), json!("call-model"), json!(99), json!(1.5)];
        let generation = pipeline.generate(Shape::Text, &args).expect("generate");

        assert_eq!(generation.config.model, "call-model");
        let body = &transport.requests()[0].body;
        assert_eq!(body["model"], json!("call-model"));
        assert_eq!(body["max_output_tokens"], json!(99));
        assert_eq!(body["temperature"], json!(1.5));
        assert_eq!(body["input"][0], json!({"role": "system", "content": "Be brief."}));
    }
}
