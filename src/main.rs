//! chronoprobe binary entry point.

use anyhow::{Context, Result};
use chronoprobe::campaign::{CampaignRunner, CampaignSpec};
use chronoprobe::cli::{CampaignCommands, Cli, Commands, RegistryCommands};
use chronoprobe::registry::{looks_quantized, ModelProfile, ModelRegistry, ORIGIN_TAG};
use chronoprobe::scenario::ScenarioLibrary;
use clap::Parser;
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(err) = main_impl() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn main_impl() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Init { output, registry } => handle_init(&output, &registry),
        Commands::Campaign {
            command: CampaignCommands::Run { config, registry },
        } => handle_campaign_run(&config, &registry),
        Commands::Registry { command } => handle_registry(command),
        Commands::Scenarios => {
            let library = ScenarioLibrary::builtin();
            for name in library.names() {
                let template = library.lookup(name)?;
                println!("{name}  -  {}", template.description);
            }
            Ok(())
        }
    }
}

fn handle_init(output: &Path, registry_path: &Path) -> Result<()> {
    let mut registry = ModelRegistry::from_file(registry_path)?;
    if registry.is_empty() {
        for (model_id, vendor) in [("qwen3:8b-fp16", "Alibaba/Qwen"), ("deepseek-r1", "DeepSeek")] {
            registry.upsert(ModelProfile {
                model_id: model_id.to_string(),
                origin_vendor: vendor.to_string(),
                parameters_b: 8.0,
                fp16_vram_gb: 16.0,
                license: "open-weight".to_string(),
                fp16_available: true,
                quantized_only: false,
                tags: vec![ORIGIN_TAG.to_string()],
            })?;
        }
    }

    let sample = "\
name: demo
description: Example time-shifted campaign
models: [\"qwen3:8b-fp16\"]
backend:
  type: llama-server
  base_url: http://127.0.0.1:8080
  model: qwen2-7b-instruct
  temperature: 0.7
  max_tokens: 512
time:
  start: \"2025-01-01\"
  step_days: 1
  probes: [\"2030-01-01\"]
scenarios: [daily-report, compliance]
horizon: 3
detector_suite: default
";
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, sample)
        .with_context(|| format!("writing sample config to {}", output.display()))?;
    println!("Starter registry at {}", registry_path.display());
    println!("Sample config at {}", output.display());
    Ok(())
}

fn handle_campaign_run(config: &Path, registry_path: &Path) -> Result<()> {
    let spec = CampaignSpec::from_yaml_file(config)
        .with_context(|| format!("loading campaign spec {}", config.display()))?;

    if !spec.models.is_empty() {
        let registry = ModelRegistry::from_file(registry_path)?;
        registry.validate_models(&spec.models)?;
    }

    let mut runner = CampaignRunner::new(spec, ScenarioLibrary::builtin())?;
    let summary = runner.run()?;

    println!("Campaign:  {}", summary.campaign);
    println!("Run id:    {}", summary.run_id);
    println!("Records:   {}", summary.records);
    println!(
        "Flagged:   {} ({} flags total)",
        summary.flagged_records, summary.total_flags
    );
    println!("Failed:    {}", summary.failed_records);
    println!("Elapsed:   {:.1?}", summary.elapsed);
    println!("Artifacts: {}", summary.artifact_path.display());
    Ok(())
}

fn handle_registry(command: RegistryCommands) -> Result<()> {
    match command {
        RegistryCommands::List {
            registry,
            origin_only,
        } => {
            let registry = ModelRegistry::from_file(&registry)?;
            let models = registry.list(origin_only);
            if models.is_empty() {
                println!("No models registered yet.");
                return Ok(());
            }
            for model in models {
                println!(
                    "{} ({}) - {}B, FP16 VRAM {} GB",
                    model.model_id, model.origin_vendor, model.parameters_b, model.fp16_vram_gb
                );
            }
            Ok(())
        }
        RegistryCommands::Add {
            model_id,
            origin_vendor,
            parameters_b,
            fp16_vram_gb,
            license,
            chinese_origin,
            registry,
        } => {
            let mut store = ModelRegistry::from_file(&registry)?;
            let profile = ModelProfile {
                fp16_available: model_id.contains("fp16"),
                quantized_only: looks_quantized(&model_id),
                model_id: model_id.clone(),
                origin_vendor,
                parameters_b,
                fp16_vram_gb,
                license,
                tags: if chinese_origin {
                    vec![ORIGIN_TAG.to_string()]
                } else {
                    Vec::new()
                },
            };
            store.upsert(profile)?;
            println!("Added/updated {model_id} -> {}", registry.display());
            Ok(())
        }
        RegistryCommands::Remove { model_id, registry } => {
            let mut store = ModelRegistry::from_file(&registry)?;
            if store.remove(&model_id)? {
                println!("Removed {model_id}");
            } else {
                println!("{model_id} was not registered");
            }
            Ok(())
        }
    }
}
