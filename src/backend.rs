//! Inference backend abstraction.
//!
//! The backend is a black box to the harness: it accepts the materialized
//! message list plus sampling parameters and returns text with opaque
//! metadata. The orchestrator never passes ambient wall-clock time to it —
//! that is the experiment's isolation boundary.

use crate::error::{Error, Result};
use crate::record::ResponsePayload;
use crate::request_log::RequestLogger;
use crate::scenario::PromptMessage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// A text-generation backend.
pub trait Backend: Send {
    /// Human-friendly identifier for logs and the artifact descriptor.
    fn label(&self) -> String;

    /// Generate one completion for the materialized message list.
    fn generate(&mut self, messages: &[PromptMessage]) -> Result<ResponsePayload>;
}

/// Sampling parameters passed through to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub repeat_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 512,
            top_p: 0.9,
            repeat_penalty: 1.05,
        }
    }
}

/// Backend configuration, tagged by type in the campaign spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BackendSpec {
    /// OpenAI-compatible chat completions endpoint of a local llama.cpp
    /// server (`llama-server`).
    LlamaServer {
        base_url: String,
        model: String,
        #[serde(flatten)]
        params: GenerationParams,
    },
    /// Canned reply cycle for offline smoke runs and tests.
    Scripted {
        #[serde(default)]
        replies: Vec<String>,
    },
}

impl BackendSpec {
    /// Human-friendly identifier for tables and logs.
    pub fn label(&self) -> String {
        match self {
            Self::LlamaServer { model, .. } => format!("llama-server:{model}"),
            Self::Scripted { .. } => "scripted".to_string(),
        }
    }
}

/// Build a backend from its spec. Unsupported configurations fail at
/// campaign validation time, not mid-run.
pub fn build_backend(
    spec: &BackendSpec,
    logger: Option<RequestLogger>,
) -> Result<Box<dyn Backend>> {
    match spec {
        BackendSpec::LlamaServer {
            base_url,
            model,
            params,
        } => Ok(Box::new(LlamaServerBackend::new(
            base_url.clone(),
            model.clone(),
            params.clone(),
            logger,
        ))),
        BackendSpec::Scripted { replies } => Ok(Box::new(ScriptedBackend::new(replies.clone()))),
    }
}

// ============================================================================
// llama-server backend
// ============================================================================

/// Blocking HTTP client for llama.cpp's OpenAI-compatible chat endpoint.
pub struct LlamaServerBackend {
    base_url: String,
    model: String,
    params: GenerationParams,
    client: reqwest::blocking::Client,
    logger: Option<RequestLogger>,
}

impl LlamaServerBackend {
    pub fn new(
        base_url: String,
        model: String,
        params: GenerationParams,
        logger: Option<RequestLogger>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            params,
            client: reqwest::blocking::Client::new(),
            logger,
        }
    }

    fn request_body(&self, messages: &[PromptMessage]) -> Value {
        // Only role/content cross the boundary; the stamped virtual
        // timestamp stays in the artifact record.
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role.to_string(), "content": m.content }))
            .collect();
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.params.temperature,
            "max_tokens": self.params.max_tokens,
            "top_p": self.params.top_p,
            "repeat_penalty": self.params.repeat_penalty,
        })
    }
}

impl Backend for LlamaServerBackend {
    fn label(&self) -> String {
        format!("llama-server:{}", self.model)
    }

    fn generate(&mut self, messages: &[PromptMessage]) -> Result<ResponsePayload> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.request_body(messages);
        debug!(url = %url, "dispatching chat completion request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|err| Error::backend(self.label(), err.to_string()))?;

        let raw: Value = response
            .json()
            .map_err(|err| Error::backend(self.label(), format!("malformed response: {err}")))?;

        let content = raw
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if let Some(logger) = &mut self.logger {
            logger.log(&body, &raw)?;
        }

        Ok(ResponsePayload::ok(content, Some(raw)))
    }
}

// ============================================================================
// Scripted backend
// ============================================================================

/// Deterministic backend that cycles through canned replies.
///
/// Used for offline smoke runs and in tests, where it doubles as the
/// "identical backend response trace" that makes campaign replay checkable.
pub struct ScriptedBackend {
    replies: Vec<String>,
    cursor: usize,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<String>) -> Self {
        Self { replies, cursor: 0 }
    }
}

impl Backend for ScriptedBackend {
    fn label(&self) -> String {
        "scripted".to_string()
    }

    fn generate(&mut self, _messages: &[PromptMessage]) -> Result<ResponsePayload> {
        if self.replies.is_empty() {
            return Ok(ResponsePayload::ok("", None));
        }
        let reply = self.replies[self.cursor % self.replies.len()].clone();
        self.cursor += 1;
        Ok(ResponsePayload::ok(reply, None))
    }
}
