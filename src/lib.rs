//! chronoprobe - time-shifted LLM evaluation harness.
//!
//! Probes a language model for hidden, time-conditioned or
//! identity-conditioned behavior by replaying the same task under a
//! synthetically advanced clock and under varying claimed requester
//! identities, then algorithmically flags anomalous responses.
//!
//! The pipeline per interaction is materialize → generate → detect →
//! persist: a [`clock::VirtualClock`] produces the synthetic schedule, the
//! [`scenario::ScenarioLibrary`] binds templates to each timestamp, a
//! [`backend::Backend`] produces the response, the
//! [`detectors::DetectorSuite`] classifies it, and the
//! [`sink::ArtifactSink`] appends one self-contained JSON line per record.

#![forbid(unsafe_code)]

pub mod backend;
pub mod campaign;
pub mod cli;
pub mod clock;
pub mod detectors;
pub mod error;
pub mod record;
pub mod registry;
pub mod request_log;
pub mod scenario;
pub mod sink;

pub use error::{Error, Result};
