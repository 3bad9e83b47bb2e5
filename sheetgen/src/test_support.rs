//! Test-only helpers: scripted transports, fixture stores and canned bodies.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::rc::Rc;
use std::time::Duration;

use serde_json::{Value, json};

use crate::core::resolve::{Tier, keys};
use crate::io::client::{ClientOptions, ModelClient};
use crate::io::settings::MemoryStore;
use crate::io::transport::{HttpRequest, HttpResponse, Transport, TransportError};

pub const TEST_ENDPOINT: &str = "https://completions.test/v1/responses";
pub const TEST_KEY: &str = "sk-test-0000";

#[derive(Debug, Default)]
struct Script {
    responses: VecDeque<Result<HttpResponse, TransportError>>,
    requests: Vec<HttpRequest>,
}

/// Transport that replays queued responses and records every request.
///
/// Clones share one script, so a test can hand a clone to the client and keep
/// another handle for assertions.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Rc<RefCell<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an HTTP response.
    pub fn respond(self, status: u16, body: impl Into<String>) -> Self {
        self.script.borrow_mut().responses.push_back(Ok(HttpResponse {
            status,
            body: body.into(),
        }));
        self
    }

    /// Queue a transport failure.
    pub fn fail(self, err: TransportError) -> Self {
        self.script.borrow_mut().responses.push_back(Err(err));
        self
    }

    /// Requests sent so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.script.borrow().requests.clone()
    }

    /// Responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.borrow().responses.len()
    }
}

impl Transport for ScriptedTransport {
    fn post_json(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut script = self.script.borrow_mut();
        script.requests.push(request.clone());
        script
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Client("script exhausted".to_string())))
    }
}

/// Client over `transport` with no backoff.
pub fn test_client(transport: &ScriptedTransport) -> ModelClient {
    ModelClient::new(transport.clone(), TEST_ENDPOINT).with_options(ClientOptions {
        backoff: Duration::ZERO,
        retries: 1,
    })
}

/// Store holding only the test credential.
pub fn store_with_key() -> MemoryStore {
    MemoryStore::new().with(Tier::User, keys::API_KEY, json!(TEST_KEY))
}

/// Success body with a flat `output_text` field and usage accounting.
pub fn output_text_body(text: &str) -> String {
    json!({
        "output_text": text,
        "usage": {"input_tokens": 12, "output_tokens": 7, "total_tokens": 19},
    })
    .to_string()
}

/// Success body using `output[].content[]` blocks.
pub fn output_blocks_body(parts: &[&str]) -> String {
    let content: Vec<Value> = parts
        .iter()
        .map(|text| json!({"type": "output_text", "text": text}))
        .collect();
    json!({"output": [{"type": "message", "content": content}]}).to_string()
}

/// `{error: {message}}` body.
pub fn error_body(message: &str) -> String {
    json!({"error": {"message": message}}).to_string()
}

/// Body returned when the service does not accept the `web_search` tool.
pub fn tool_rejection_body() -> String {
    error_body(
        "Invalid value: 'web_search'. Supported values are: 'function' and 'file_search'.",
    )
}

/// Temp directory populated with `(file name, contents)` pairs.
pub fn settings_dir(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for (name, contents) in files {
        fs::write(dir.path().join(name), contents).expect("write settings file");
    }
    dir
}
