//! Prompt builder: system instructions plus one user message.

use std::sync::LazyLock;

use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::resolve::ResolvedConfig;
use crate::core::types::{Schema, Shape};
use crate::error::GenError;

const LIST_TEMPLATE: &str = include_str!("prompts/list.md");
const RECORD_TEMPLATE: &str = include_str!("prompts/record.md");
const RECORD_LIST_TEMPLATE: &str = include_str!("prompts/record_list.md");

static ENGINE: LazyLock<PromptEngine> = LazyLock::new(PromptEngine::new);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Ordered messages sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub messages: Vec<Message>,
}

impl Prompt {
    pub fn system(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|message| message.role == Role::System)
            .map(|message| message.content.as_str())
    }

    pub fn user(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
    }
}

/// Everything the builder needs for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub shape: Shape,
    pub text: &'a str,
    pub schema: Option<&'a Schema>,
    pub config: &'a ResolvedConfig,
    /// Tool runner context; empty when no tool ran.
    pub tool_context: &'a str,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("list", LIST_TEMPLATE)
            .expect("list template should be valid");
        env.add_template("record", RECORD_TEMPLATE)
            .expect("record template should be valid");
        env.add_template("record_list", RECORD_LIST_TEMPLATE)
            .expect("record_list template should be valid");
        Self { env }
    }

    /// Shape-specific formatting instruction; `None` for plain text.
    fn shape_instruction(&self, input: &PromptInputs<'_>) -> Result<Option<String>, GenError> {
        let count = input.config.target_count();
        let rendered = match input.shape {
            Shape::Text => return Ok(None),
            Shape::List => self.render("list", context! { count => count })?,
            Shape::Record | Shape::RecordList => {
                let schema = input.schema.ok_or_else(|| {
                    GenError::InternalShape(format!("{} prompt requires a schema.", input.shape))
                })?;
                self.render(
                    input.shape.as_str(),
                    context! { fields => schema.describe(), count => count },
                )?
            }
        };
        Ok(Some(rendered))
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String, GenError> {
        self.env
            .get_template(name)
            .and_then(|template| template.render(ctx))
            .map(|rendered| rendered.trim().to_string())
            .map_err(|err| GenError::InternalShape(format!("Prompt template {name} failed: {err}")))
    }
}

/// Assemble the system and user messages for one call.
pub fn build_prompt(input: &PromptInputs<'_>) -> Result<Prompt, GenError> {
    let mut system_parts = Vec::new();
    let system_message = input.config.system_message.trim();
    if !system_message.is_empty() {
        system_parts.push(system_message.to_string());
    }
    if !input.tool_context.is_empty() {
        system_parts.push(format!("Tool context:\n{}", input.tool_context));
    }
    if let Some(instruction) = ENGINE.shape_instruction(input)? {
        system_parts.push(instruction);
    }

    let mut messages = Vec::with_capacity(2);
    if !system_parts.is_empty() {
        messages.push(Message {
            role: Role::System,
            content: system_parts.join("\n\n"),
        });
    }

    let count = input.config.target_count();
    let mut user_parts = vec![input.text.to_string()];
    match input.shape {
        Shape::List => user_parts.push(format!("Number of items needed: {count}.")),
        Shape::RecordList => user_parts.push(format!("Produce {count} entries as JSON lines.")),
        Shape::Text | Shape::Record => {}
    }
    messages.push(Message {
        role: Role::User,
        content: user_parts.join("\n\n"),
    });

    Ok(Prompt { messages })
}
