//! Campaign specification and the orchestration loop.
//!
//! A campaign enumerates the full (virtual-time × scenario) schedule up
//! front, then drives one interaction at a time through materialize →
//! generate → detect → persist. One bad interaction never loses the rest of
//! the campaign: backend failures are captured into the failing record and
//! the loop continues.

use crate::backend::{build_backend, Backend, BackendSpec};
use crate::clock::VirtualClock;
use crate::detectors::DetectorSuite;
use crate::error::{Error, Result};
use crate::record::{InteractionRecord, RecordState};
use crate::request_log::RequestLogger;
use crate::scenario::{ScenarioLibrary, ScenarioTemplate};
use crate::sink::{ArtifactSink, JsonlSink};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Clock parameters of a campaign spec.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeSpec {
    /// Start timestamp, `YYYY-MM-DD` or full ISO datetime.
    pub start: String,
    /// Step size in days.
    #[serde(default = "default_step_days")]
    pub step_days: i64,
    /// Probe timestamps that must appear in the schedule.
    #[serde(default)]
    pub probes: Vec<String>,
}

fn default_step_days() -> i64 {
    1
}

/// External configuration driving one campaign run.
///
/// Parsed once at campaign start, validated fail-fast, then owned
/// exclusively by the runner for the duration of the run.
#[derive(Debug, Clone, Deserialize)]
pub struct CampaignSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Registry model ids this campaign exercises (metadata; validated
    /// against the registry when one is supplied).
    #[serde(default)]
    pub models: Vec<String>,
    pub backend: BackendSpec,
    pub time: TimeSpec,
    pub scenarios: Vec<String>,
    pub horizon: u32,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_suite")]
    pub detector_suite: String,
    #[serde(default)]
    pub log_requests: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_suite() -> String {
    "default".to_string()
}

impl CampaignSpec {
    /// Parse a campaign spec from a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let spec: Self = serde_yaml::from_str(text)
            .map_err(|err| Error::config(format!("invalid campaign config: {err}")))?;
        Ok(spec)
    }

    /// Parse a campaign spec from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Build the virtual clock from the time parameters.
    pub fn build_clock(&self) -> Result<VirtualClock> {
        let start = parse_timestamp(&self.time.start)?;
        let probes = self
            .time
            .probes
            .iter()
            .map(|p| parse_timestamp(p))
            .collect::<Result<Vec<_>>>()?;
        VirtualClock::for_days(start, self.time.step_days, probes)
    }

    /// Fail-fast structural validation, run before any interaction.
    pub fn validate(&self, library: &ScenarioLibrary) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("campaign name must not be empty"));
        }
        if self.horizon == 0 {
            return Err(Error::config("horizon must be positive"));
        }
        if self.scenarios.is_empty() {
            return Err(Error::config("at least one scenario is required"));
        }
        self.build_clock()?;
        library.resolve(&self.scenarios)?;
        DetectorSuite::by_name(&self.detector_suite)?;
        Ok(())
    }

    /// Artifact destination for this campaign.
    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.ndjson", self.name))
    }

    fn request_log_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_requests.ndjson", self.name))
    }
}

/// Accept `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| Error::config(format!("invalid timestamp: {text:?}")))
}

/// Result of one campaign run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: uuid::Uuid,
    pub campaign: String,
    pub records: usize,
    pub flagged_records: usize,
    pub total_flags: usize,
    pub failed_records: usize,
    pub elapsed: std::time::Duration,
    pub artifact_path: PathBuf,
}

/// The campaign control loop.
pub struct CampaignRunner {
    spec: CampaignSpec,
    clock: VirtualClock,
    library: ScenarioLibrary,
    suite: DetectorSuite,
    backend: Box<dyn Backend>,
}

impl CampaignRunner {
    /// Validate the spec and resolve all collaborators. Configuration
    /// errors surface here, before any interaction runs.
    pub fn new(spec: CampaignSpec, library: ScenarioLibrary) -> Result<Self> {
        spec.validate(&library)?;
        let clock = spec.build_clock()?;
        let suite = DetectorSuite::by_name(&spec.detector_suite)?;
        let logger = if spec.log_requests {
            Some(RequestLogger::create(spec.request_log_path())?)
        } else {
            None
        };
        let backend = build_backend(&spec.backend, logger)?;
        Ok(Self {
            spec,
            clock,
            library,
            suite,
            backend,
        })
    }

    /// Like [`CampaignRunner::new`], but with an explicit backend (tests,
    /// replay against a recorded trace).
    pub fn with_backend(
        spec: CampaignSpec,
        library: ScenarioLibrary,
        backend: Box<dyn Backend>,
    ) -> Result<Self> {
        spec.validate(&library)?;
        let clock = spec.build_clock()?;
        let suite = DetectorSuite::by_name(&spec.detector_suite)?;
        Ok(Self {
            spec,
            clock,
            library,
            suite,
            backend,
        })
    }

    /// Run the campaign to completion, appending to the spec's artifact
    /// file.
    pub fn run(&mut self) -> Result<RunSummary> {
        let mut sink = JsonlSink::create(self.spec.artifact_path())?;
        self.run_with_sink(&mut sink)
    }

    /// Run the campaign against an explicit sink.
    pub fn run_with_sink(&mut self, sink: &mut dyn ArtifactSink) -> Result<RunSummary> {
        let run_id = uuid::Uuid::new_v4();
        let started = Instant::now();
        let schedule = self.clock.schedule(self.spec.horizon);
        // Names were validated in new(); resolve can only succeed here.
        let scenarios: Vec<ScenarioTemplate> = self
            .library
            .resolve(&self.spec.scenarios)?
            .into_iter()
            .cloned()
            .collect();

        info!(
            run_id = %run_id,
            campaign = %self.spec.name,
            scenarios = scenarios.len(),
            schedule_slots = schedule.len(),
            suite = self.suite.name(),
            backend = %self.backend.label(),
            "starting campaign"
        );

        let mut flagged_records = 0;
        let mut total_flags = 0;
        let mut failed_records = 0;

        for virtual_time in &schedule {
            for scenario in &scenarios {
                let record = self.run_one(*virtual_time, scenario);
                if record.state == RecordState::Failed {
                    failed_records += 1;
                }
                if !record.anomaly_flags.is_empty() {
                    flagged_records += 1;
                    total_flags += record.anomaly_flags.len();
                }
                sink.append(&record)?;
            }
        }

        let summary = RunSummary {
            run_id,
            campaign: self.spec.name.clone(),
            records: sink.records_written(),
            flagged_records,
            total_flags,
            failed_records,
            elapsed: started.elapsed(),
            artifact_path: self.spec.artifact_path(),
        };
        info!(
            run_id = %run_id,
            records = summary.records,
            flagged = summary.flagged_records,
            failed = summary.failed_records,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "campaign finished"
        );
        Ok(summary)
    }

    /// Drive one record through the pipeline. Backend failures are captured
    /// as the record's response; the record still flows through detection.
    fn run_one(&mut self, virtual_time: NaiveDateTime, scenario: &ScenarioTemplate) -> InteractionRecord {
        let mut record = InteractionRecord::pending(
            self.spec.name.clone(),
            self.backend.label(),
            self.spec.models.clone(),
            virtual_time,
            scenario.name.clone(),
        );

        record.transition(RecordState::Materializing);
        record.prompts = scenario.materialize(virtual_time);

        record.transition(RecordState::Generating);
        match self.backend.generate(&record.prompts) {
            Ok(response) => {
                record.response = response;
                record.transition(RecordState::Detecting);
            }
            Err(err) => {
                warn!(
                    scenario = %scenario.name,
                    virtual_time = %virtual_time,
                    error = %err,
                    "backend failed; capturing failure and continuing"
                );
                record.response = crate::record::ResponsePayload::error(err.to_string());
                record.transition(RecordState::Failed);
            }
        }

        record.anomaly_flags = self.suite.evaluate(&record);
        record.transition(RecordState::Persisted);
        record
    }
}
