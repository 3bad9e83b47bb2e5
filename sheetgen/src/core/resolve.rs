//! Layered configuration resolution.
//!
//! Every field is resolved by [`first_present`] over an explicit candidate
//! list in precedence order: call-level override, document setting,
//! installation setting, internal default. Clamps are applied after merging.

use serde::Serialize;
use serde_json::Value;

use crate::core::args::{ParsedArgs, cell_flag, cell_number, cell_positive_int, cell_text, is_present};
use crate::core::count::DEFAULT_COUNT;
use crate::core::tool_spec::ToolSpec;
use crate::error::GenError;

pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_MAX_TOKENS: u32 = 512;
pub const DEFAULT_TEMPERATURE: f64 = 0.3;
pub const DEFAULT_HARD_COUNT_CAP: u32 = 200;
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/responses";

pub const MAX_TOKENS_LIMIT: u32 = 32_768;
pub const HARD_COUNT_CAP_LIMIT: u32 = 1_000;
pub const MAX_TEMPERATURE: f64 = 2.0;

/// Setting key names, shared by the document and installation tiers.
pub mod keys {
    pub const MODEL: &str = "model";
    pub const MAX_TOKENS: &str = "max_tokens";
    pub const TEMPERATURE: &str = "temperature";
    pub const SYSTEM_MESSAGE: &str = "system_message";
    pub const DEFAULT_TOOL: &str = "default_tool";
    pub const DEFAULT_COUNT: &str = "default_count";
    pub const HARD_COUNT_CAP: &str = "hard_count_cap";
    pub const STRICT: &str = "strict";
    /// Installation tier only.
    pub const API_BASE: &str = "api_base";
    /// User tier only.
    pub const API_KEY: &str = "api_key";
}

/// Precedence tier of a stored setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// Per-user secrets (the API credential).
    User,
    /// Settings attached to one spreadsheet.
    Document,
    /// Settings shared by every document of the installation.
    Installation,
}

/// Read-only settings lookup, injected into the resolver.
pub trait SettingsStore {
    fn get(&self, tier: Tier, key: &str) -> Option<Value>;
}

/// Fully-specified configuration for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub system_message: String,
    pub tool: ToolSpec,
    pub default_inferred_count: u32,
    pub hard_count_cap: u32,
    pub strict: bool,
}

impl ResolvedConfig {
    /// Number of items requested for counted shapes.
    pub fn target_count(&self) -> u32 {
        self.default_inferred_count.min(self.hard_count_cap)
    }
}

/// First candidate that is present, in order.
pub fn first_present<T>(candidates: impl IntoIterator<Item = Option<T>>) -> Option<T> {
    candidates.into_iter().flatten().next()
}

/// Document then installation candidate for `key`, converted by `convert`.
fn stored<T>(
    store: &dyn SettingsStore,
    key: &str,
    convert: impl Fn(&Value) -> Option<T>,
) -> [Option<T>; 2] {
    [Tier::Document, Tier::Installation].map(|tier| store.get(tier, key).as_ref().and_then(&convert))
}

/// Merge call overrides with stored settings and internal defaults.
pub fn resolve_config(
    args: &ParsedArgs,
    store: &dyn SettingsStore,
) -> Result<ResolvedConfig, GenError> {
    let overrides = &args.overrides;

    let [doc, inst] = stored(store, keys::MODEL, cell_text);
    let model = first_present([overrides.model.clone(), doc, inst])
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let [doc, inst] = stored(store, keys::MAX_TOKENS, cell_positive_int);
    let max_tokens = first_present([overrides.max_tokens, doc, inst])
        .unwrap_or(DEFAULT_MAX_TOKENS)
        .clamp(1, MAX_TOKENS_LIMIT);

    let [doc, inst] = stored(store, keys::TEMPERATURE, cell_number);
    let temperature = first_present([overrides.temperature, doc, inst])
        .unwrap_or(DEFAULT_TEMPERATURE)
        .clamp(0.0, MAX_TEMPERATURE);

    let [doc, inst] = stored(store, keys::SYSTEM_MESSAGE, cell_text);
    let system_message =
        first_present([overrides.system_message.clone(), doc, inst]).unwrap_or_default();

    let [doc, inst] = stored(store, keys::DEFAULT_TOOL, |value| {
        is_present(value).then(|| value.clone())
    });
    let tool = match first_present([overrides.tool.clone(), doc, inst]) {
        Some(raw) => ToolSpec::parse(&raw)?,
        None => ToolSpec::None,
    };

    let [doc, inst] = stored(store, keys::HARD_COUNT_CAP, cell_positive_int);
    let hard_count_cap = first_present([doc, inst])
        .unwrap_or(DEFAULT_HARD_COUNT_CAP)
        .clamp(1, HARD_COUNT_CAP_LIMIT);

    let [doc, inst] = stored(store, keys::DEFAULT_COUNT, cell_positive_int);
    let default_inferred_count = first_present([args.inferred_count, doc, inst])
        .unwrap_or(DEFAULT_COUNT)
        .clamp(1, hard_count_cap);

    let [doc, inst] = stored(store, keys::STRICT, cell_flag);
    let strict = first_present([doc, inst]).unwrap_or(false);

    Ok(ResolvedConfig {
        model,
        max_tokens,
        temperature,
        system_message,
        tool,
        default_inferred_count,
        hard_count_cap,
        strict,
    })
}

/// API credential from the user tier.
pub fn resolve_credential(store: &dyn SettingsStore) -> Result<String, GenError> {
    store
        .get(Tier::User, keys::API_KEY)
        .as_ref()
        .and_then(cell_text)
        .ok_or_else(|| {
            GenError::NoCredential("Add your OpenAI API key to the user settings.".to_string())
        })
}

/// Completion endpoint from the installation tier, or the default.
pub fn resolve_endpoint(store: &dyn SettingsStore) -> String {
    store
        .get(Tier::Installation, keys::API_BASE)
        .as_ref()
        .and_then(cell_text)
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
}

/// Mask all but the last four characters of a credential.
pub fn mask_credential(credential: &str) -> String {
    let chars: Vec<char> = credential.chars().collect();
    let visible = chars.len().min(4);
    let hidden = chars.len() - visible;
    let suffix: String = chars[hidden..].iter().collect();
    format!("{}{}", "*".repeat(hidden), suffix)
}
