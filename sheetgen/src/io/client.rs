//! Model client for the completion service.
//!
//! One call runs a small state machine. The first attempt carries the tool
//! capability when one was requested. If the service rejects that capability
//! the tool is dropped for the rest of the call and the request is resent
//! immediately. Any other failure is retried once after a fixed backoff.

use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::prompt::Message;
use crate::core::resolve::mask_credential;
use crate::core::tools::RequestTool;
use crate::error::GenError;
use crate::io::transport::{HttpRequest, HttpResponse, Transport, TransportError};

pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(600);

/// Markers that, next to `web_search`, identify a rejected tool capability.
const TOOL_REJECTION_MARKERS: [&str; 3] = ["invalid value", "supported values", "unsupported"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Sleep before the generic retry.
    pub backoff: Duration,
    /// Generic retries after the first failed attempt.
    pub retries: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_BACKOFF,
            retries: 1,
        }
    }
}

/// Everything sent for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub tool: Option<RequestTool>,
}

/// Successful completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Usage accounting as reported by the service.
    pub usage: Option<Value>,
    /// The tool capability was rejected and removed.
    pub tool_dropped: bool,
    /// HTTP attempts made, including the successful one.
    pub attempts: u32,
}

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    input: &'a [Message],
    temperature: f64,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolEntry>,
}

#[derive(Serialize)]
struct ToolEntry {
    #[serde(rename = "type")]
    kind: &'static str,
}

pub struct ModelClient {
    transport: Box<dyn Transport>,
    endpoint: String,
    options: ClientOptions,
}

impl ModelClient {
    pub fn new(transport: impl Transport + 'static, endpoint: impl Into<String>) -> Self {
        Self {
            transport: Box::new(transport),
            endpoint: endpoint.into(),
            options: ClientOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Send `request`, retrying and downgrading the tool as needed.
    #[instrument(skip_all, fields(model = %request.model, tool = request.tool.is_some()))]
    pub fn complete(
        &self,
        request: &CompletionRequest,
        credential: &str,
    ) -> Result<Completion, GenError> {
        debug!(credential = %mask_credential(credential), endpoint = %self.endpoint, "sending completion");

        let mut with_tool = request.tool.is_some();
        let mut tool_dropped = false;
        let mut retries_left = self.options.retries;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.attempt(request, credential, with_tool) {
                Ok((text, usage)) => {
                    info!(attempts, tool_dropped, "completion received");
                    return Ok(Completion {
                        text,
                        usage,
                        tool_dropped,
                        attempts,
                    });
                }
                Err(err) if with_tool && is_tool_rejection(&err) => {
                    warn!(error = %err, "tool capability rejected; resending without it");
                    with_tool = false;
                    tool_dropped = true;
                }
                Err(err) if retries_left > 0 => {
                    retries_left -= 1;
                    warn!(error = %err, backoff_ms = self.options.backoff.as_millis() as u64, "completion failed; retrying");
                    if !self.options.backoff.is_zero() {
                        thread::sleep(self.options.backoff);
                    }
                }
                Err(err) => {
                    warn!(error = %err, attempts, "completion failed");
                    return Err(err);
                }
            }
        }
    }

    fn attempt(
        &self,
        request: &CompletionRequest,
        credential: &str,
        with_tool: bool,
    ) -> Result<(String, Option<Value>), GenError> {
        let tools = match (&request.tool, with_tool) {
            (Some(tool), true) => vec![ToolEntry { kind: tool.name }],
            _ => Vec::new(),
        };
        let body = RequestBody {
            model: &request.model,
            input: &request.messages,
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
            tools,
        };
        let body = serde_json::to_value(&body)
            .map_err(|err| GenError::InternalShape(format!("Unable to encode request: {err}")))?;

        let response = self
            .transport
            .post_json(&HttpRequest {
                url: self.endpoint.clone(),
                bearer: credential.to_string(),
                body,
            })
            .map_err(transport_error)?;
        debug!(status = response.status, "completion response");
        read_response(&response)
    }
}

fn transport_error(err: TransportError) -> GenError {
    match err {
        TransportError::Timeout(_) => GenError::Timeout(err.to_string()),
        TransportError::Connect(_) | TransportError::Client(_) => GenError::Upstream(err.to_string()),
    }
}

/// Classify a response and pull out its text and usage.
fn read_response(response: &HttpResponse) -> Result<(String, Option<Value>), GenError> {
    if !response.is_success() {
        let message = error_message(&response.body);
        return Err(match response.status {
            429 => GenError::RateLimited(message),
            408 => GenError::Timeout(message),
            status => GenError::Upstream(format!("{message} (HTTP {status})")),
        });
    }

    if response.body.trim().is_empty() {
        return Err(GenError::Upstream(
            "Empty response from completion service.".to_string(),
        ));
    }
    let json: Value = serde_json::from_str(&response.body).map_err(|err| {
        GenError::Upstream(format!("Malformed response from completion service: {err}"))
    })?;
    let text = extract_text(&json).ok_or_else(|| {
        GenError::Upstream("Completion response contained no text.".to_string())
    })?;
    Ok((text, json.get("usage").cloned()))
}

/// `{error: {message}}`, or a generic message.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| "Unknown error.".to_string())
}

/// Response text, checked in order: a flat `output_text`, the text of
/// `output[].content[]` blocks, then legacy `choices[0].message.content`.
pub fn extract_text(json: &Value) -> Option<String> {
    if let Some(text) = json.get("output_text").and_then(Value::as_str) {
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }

    let blocks: String = json
        .get("output")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .flat_map(|output| {
            let nested = output
                .get("content")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|block| block.get("text").and_then(Value::as_str));
            nested.chain(output.get("text").and_then(Value::as_str))
        })
        .collect();
    if !blocks.is_empty() {
        return Some(blocks);
    }

    json.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn is_tool_rejection(err: &GenError) -> bool {
    let message = err.message().to_lowercase();
    message.contains("web_search")
        && TOOL_REJECTION_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
}
