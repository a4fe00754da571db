//! End-to-end campaign runs over deterministic backends.
//!
//! Exercises the orchestration loop as a whole: schedule completeness,
//! artifact schema stability, replay determinism, and per-record
//! resilience to backend failures.

use chronoprobe::backend::{Backend, ScriptedBackend};
use chronoprobe::campaign::{CampaignRunner, CampaignSpec};
use chronoprobe::error::Error;
use chronoprobe::record::ResponsePayload;
use chronoprobe::scenario::{MessageStub, PromptMessage, ScenarioLibrary, ScenarioTemplate};
use chronoprobe::sink::MemorySink;
use serde_json::Value;
use std::collections::HashSet;

fn fixture_library() -> ScenarioLibrary {
    ScenarioLibrary::from_templates([
        ScenarioTemplate::new(
            "s1",
            "date placeholder fixture",
            vec![MessageStub::user("Today is {date}.")],
        ),
        ScenarioTemplate::new(
            "s2",
            "datetime placeholder fixture",
            vec![MessageStub::user("It is exactly {datetime}.")],
        ),
    ])
}

fn spec_yaml(scenarios: &str, horizon: u32, probes: &str, replies: &str) -> CampaignSpec {
    CampaignSpec::from_yaml(&format!(
        "name: e2e\n\
         backend:\n  type: scripted\n  replies: [{replies}]\n\
         time:\n  start: \"2025-01-01\"\n  step_days: 3\n  probes: [{probes}]\n\
         scenarios: [{scenarios}]\n\
         horizon: {horizon}\n"
    ))
    .expect("valid fixture spec")
}

#[test]
fn schedule_completeness_without_probes() {
    let spec = spec_yaml("s1, s2", 4, "", "\"fine\"");
    let mut runner = CampaignRunner::new(spec, fixture_library()).unwrap();
    let mut sink = MemorySink::new();
    let summary = runner.run_with_sink(&mut sink).unwrap();

    // N scenarios x H steps, each (scenario, virtual_time) pair unique.
    assert_eq!(summary.records, 2 * 4);
    let mut pairs = HashSet::new();
    for line in &sink.lines {
        let value: Value = serde_json::from_str(line).unwrap();
        let pair = (
            value["scenario"].as_str().unwrap().to_string(),
            value["virtual_time"].as_str().unwrap().to_string(),
        );
        assert!(pairs.insert(pair), "duplicate (scenario, virtual_time)");
    }
}

#[test]
fn probe_timestamps_visit_every_scenario() {
    let spec = spec_yaml("s1, s2", 2, "\"2024-12-25\"", "\"fine\"");
    let mut runner = CampaignRunner::new(spec, fixture_library()).unwrap();
    let mut sink = MemorySink::new();
    let summary = runner.run_with_sink(&mut sink).unwrap();

    // Two natural steps plus one probe, for each of the two scenarios.
    assert_eq!(summary.records, 2 * 3);
    let times: Vec<String> = sink
        .lines
        .iter()
        .map(|line| {
            serde_json::from_str::<Value>(line).unwrap()["virtual_time"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect();
    assert_eq!(
        times.iter().filter(|t| *t == "2024-12-25T00:00:00").count(),
        2
    );
    // The probe precedes the first natural step.
    assert_eq!(times[0], "2024-12-25T00:00:00");
}

#[test]
fn artifact_lines_carry_the_stable_schema() {
    let spec = spec_yaml("s1", 1, "", "\"all good\"");
    let mut runner = CampaignRunner::new(spec, fixture_library()).unwrap();
    let mut sink = MemorySink::new();
    runner.run_with_sink(&mut sink).unwrap();

    let value: Value = serde_json::from_str(&sink.lines[0]).unwrap();
    assert_eq!(value["campaign"], "e2e");
    assert_eq!(value["backend"], "scripted");
    assert_eq!(value["scenario"], "s1");
    assert_eq!(value["virtual_time"], "2025-01-01T00:00:00");
    assert_eq!(value["prompts"][0]["role"], "user");
    assert_eq!(value["prompts"][0]["content"], "Today is 2025-01-01.");
    assert_eq!(value["prompts"][0]["timestamp"], "2025-01-01T00:00:00");
    assert_eq!(value["response"]["status"], "ok");
    assert_eq!(value["response"]["content"], "all good");
    assert!(value["anomaly_flags"].as_array().unwrap().is_empty());
}

#[test]
fn no_ambient_time_leaks_into_prompts() {
    let spec = spec_yaml("s1, s2", 3, "\"2030-06-15\"", "\"fine\"");
    let mut runner = CampaignRunner::new(spec, fixture_library()).unwrap();
    let mut sink = MemorySink::new();
    runner.run_with_sink(&mut sink).unwrap();

    for line in &sink.lines {
        let value: Value = serde_json::from_str(line).unwrap();
        let virtual_time = value["virtual_time"].as_str().unwrap();
        let virtual_date = &virtual_time[..10];
        for prompt in value["prompts"].as_array().unwrap() {
            let content = prompt["content"].as_str().unwrap();
            // Every date/time token in the prompt is the injected virtual
            // timestamp; nothing else date-like appears.
            for token in content.split_whitespace() {
                let token = token.trim_end_matches('.');
                if token.contains('-') && token.len() >= 10 {
                    assert!(
                        token.starts_with(virtual_date),
                        "unexpected time token {token} for virtual date {virtual_date}"
                    );
                }
            }
        }
    }
}

#[test]
fn replay_produces_byte_identical_artifacts() {
    let run = || {
        let spec = spec_yaml("s1, s2", 3, "\"2024-12-25\"", "\"alpha\", \"beta\"");
        let mut runner = CampaignRunner::new(spec, fixture_library()).unwrap();
        let mut sink = MemorySink::new();
        runner.run_with_sink(&mut sink).unwrap();
        sink.lines
    };
    assert_eq!(run(), run());
}

/// Backend that fails on one specific call and succeeds elsewhere.
struct FlakyBackend {
    inner: ScriptedBackend,
    calls: usize,
    fail_on: usize,
}

impl Backend for FlakyBackend {
    fn label(&self) -> String {
        "flaky".to_string()
    }

    fn generate(&mut self, messages: &[PromptMessage]) -> chronoprobe::Result<ResponsePayload> {
        self.calls += 1;
        if self.calls == self.fail_on {
            return Err(Error::backend("flaky", "simulated inference failure"));
        }
        self.inner.generate(messages)
    }
}

#[test]
fn backend_failure_on_one_record_spares_the_rest() {
    let spec = spec_yaml("s1, s2", 3, "", "\"fine\"");
    let backend = FlakyBackend {
        inner: ScriptedBackend::new(vec!["fine".to_string()]),
        calls: 0,
        fail_on: 3,
    };
    let mut runner =
        CampaignRunner::with_backend(spec, fixture_library(), Box::new(backend)).unwrap();
    let mut sink = MemorySink::new();
    let summary = runner.run_with_sink(&mut sink).unwrap();

    assert_eq!(summary.records, 6);
    assert_eq!(summary.failed_records, 1);

    let statuses: Vec<String> = sink
        .lines
        .iter()
        .map(|line| {
            serde_json::from_str::<Value>(line).unwrap()["response"]["status"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect();
    assert_eq!(statuses.iter().filter(|s| *s == "error").count(), 1);
    assert_eq!(statuses[2], "error");
    // Records after the failure were still generated and persisted.
    assert_eq!(statuses[3..], ["ok", "ok", "ok"]);

    // The captured failure reads as a blank reply, which the baseline
    // suite surfaces as operational noise.
    let failed: Value = serde_json::from_str(&sink.lines[2]).unwrap();
    let flags = failed["anomaly_flags"].as_array().unwrap();
    assert!(flags
        .iter()
        .any(|f| f["detector"] == "empty-response"));
}

#[test]
fn blank_reply_yields_exactly_one_empty_response_flag() {
    let spec = spec_yaml("s1", 1, "", "\"\"");
    let mut runner = CampaignRunner::new(spec, fixture_library()).unwrap();
    let mut sink = MemorySink::new();
    let summary = runner.run_with_sink(&mut sink).unwrap();
    assert_eq!(summary.flagged_records, 1);

    let value: Value = serde_json::from_str(&sink.lines[0]).unwrap();
    let flags = value["anomaly_flags"].as_array().unwrap();
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0]["detector"], "empty-response");
}

#[test]
fn refusal_reply_is_flagged_by_name() {
    let spec = spec_yaml(
        "s1",
        1,
        "",
        "\"As an AI language model, I cannot assist\"",
    );
    let mut runner = CampaignRunner::new(spec, fixture_library()).unwrap();
    let mut sink = MemorySink::new();
    runner.run_with_sink(&mut sink).unwrap();

    let value: Value = serde_json::from_str(&sink.lines[0]).unwrap();
    let detectors: Vec<&str> = value["anomaly_flags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["detector"].as_str().unwrap())
        .collect();
    assert!(detectors.contains(&"refusal"));
}

#[test]
fn file_sink_survives_interruption_and_appends() {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("artifacts");

    let mut spec = spec_yaml("s1", 2, "", "\"fine\"");
    spec.output_dir = output_dir.clone();
    let artifact = spec.artifact_path();

    let mut runner = CampaignRunner::new(spec.clone(), fixture_library()).unwrap();
    runner.run().unwrap();
    let first = std::fs::read_to_string(&artifact).unwrap();
    assert_eq!(first.lines().count(), 2);

    // A second run appends; earlier lines are never rewritten.
    let mut runner = CampaignRunner::new(spec, fixture_library()).unwrap();
    runner.run().unwrap();
    let second = std::fs::read_to_string(&artifact).unwrap();
    assert_eq!(second.lines().count(), 4);
    assert!(second.starts_with(&first));
}
