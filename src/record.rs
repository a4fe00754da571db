//! Interaction records: the unit of work and the unit of persistence.

use crate::detectors::AnomalyFlag;
use crate::scenario::PromptMessage;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of one record through the pipeline.
///
/// Transitions are forward-only: `Pending → Materializing → Generating →
/// Detecting → Persisted`, with `Failed` as a terminal state entered from
/// `Generating` when the backend errors. A failed record still carries the
/// failure as its response and still flows through detection and the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    Pending,
    Materializing,
    Generating,
    Detecting,
    Persisted,
    Failed,
}

impl RecordState {
    /// Whether a transition to `next` moves forward. `Failed` is terminal:
    /// a failed record still flows through detection and the sink, but its
    /// state no longer changes.
    pub fn can_transition(self, next: Self) -> bool {
        use RecordState::{Detecting, Failed, Generating, Materializing, Pending, Persisted};
        matches!(
            (self, next),
            (Pending, Materializing)
                | (Materializing, Generating)
                | (Generating, Detecting)
                | (Generating, Failed)
                | (Detecting, Persisted)
        )
    }
}

/// Whether the backend call behind a response succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// The backend's answer (or captured failure) for one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub status: ResponseStatus,
    pub content: String,
    /// Opaque raw backend payload, when the backend provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl ResponsePayload {
    pub fn ok(content: impl Into<String>, raw: Option<Value>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            content: content.into(),
            raw,
        }
    }

    /// Capture a backend failure as data. The error text goes into `raw`,
    /// not `content`, so the empty-response detector sees the record the
    /// same way it would see a genuinely blank reply.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            content: String::new(),
            raw: Some(Value::String(message.into())),
        }
    }
}

/// One self-contained interaction: prompt, response, and anomaly flags.
///
/// Created once per (scenario, virtual-time) pair, populated incrementally
/// as the pipeline stages run, and frozen the instant it is appended to the
/// sink. The serialized shape is the stable per-line artifact schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub campaign: String,
    pub backend: String,
    pub models: Vec<String>,
    pub virtual_time: NaiveDateTime,
    pub scenario: String,
    pub prompts: Vec<PromptMessage>,
    pub response: ResponsePayload,
    pub anomaly_flags: Vec<AnomalyFlag>,
    #[serde(skip, default = "default_state")]
    pub state: RecordState,
}

fn default_state() -> RecordState {
    RecordState::Pending
}

impl InteractionRecord {
    /// Start a record for one schedule slot.
    pub fn pending(
        campaign: impl Into<String>,
        backend: impl Into<String>,
        models: Vec<String>,
        virtual_time: NaiveDateTime,
        scenario: impl Into<String>,
    ) -> Self {
        Self {
            campaign: campaign.into(),
            backend: backend.into(),
            models,
            virtual_time,
            scenario: scenario.into(),
            prompts: Vec::new(),
            response: ResponsePayload::ok("", None),
            anomaly_flags: Vec::new(),
            state: RecordState::Pending,
        }
    }

    /// Move the record to `next`, ignoring the request if it would move
    /// backward. The orchestrator only ever drives forward; the guard keeps
    /// that invariant visible.
    pub fn transition(&mut self, next: RecordState) {
        if self.state.can_transition(next) {
            self.state = next;
        }
    }
}
