//! CLI argument parsing using Clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// chronoprobe - time-shifted LLM evaluation harness
#[derive(Parser, Debug)]
#[command(name = "chronoprobe")]
#[command(version, about, long_about = None)]
#[command(after_help = "Examples:
  chronoprobe init                                   Write starter registry and sample campaign
  chronoprobe campaign run -c config/campaign.yaml   Run a campaign
  chronoprobe registry list                          List registered models
  chronoprobe scenarios                              List built-in scenarios
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a starter registry and campaign config
    Init {
        /// Path for the sample campaign config
        #[arg(long, default_value = "config/example_campaign.yaml")]
        output: PathBuf,
        /// Registry storage path
        #[arg(long, default_value = "config/registry.json")]
        registry: PathBuf,
    },

    /// Create and run campaigns
    Campaign {
        #[command(subcommand)]
        command: CampaignCommands,
    },

    /// Manage the model registry
    Registry {
        #[command(subcommand)]
        command: RegistryCommands,
    },

    /// List built-in scenarios
    Scenarios,
}

#[derive(Subcommand, Debug)]
pub enum CampaignCommands {
    /// Run a campaign from a YAML spec
    Run {
        /// Campaign YAML
        #[arg(short = 'c', long = "config", alias = "config-path")]
        config: PathBuf,
        /// Registry file (used to validate the spec's model list)
        #[arg(long, default_value = "config/registry.json")]
        registry: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum RegistryCommands {
    /// List registered models
    List {
        /// Registry storage path
        #[arg(long, default_value = "config/registry.json")]
        registry: PathBuf,
        /// Only models tagged chinese-origin (or, with false, only untagged)
        #[arg(long)]
        origin_only: Option<bool>,
    },

    /// Add or update a model profile
    Add {
        /// Model alias, e.g., qwen3-8b-f16
        model_id: String,
        /// Vendor, e.g., Alibaba/Qwen
        #[arg(long)]
        origin_vendor: String,
        /// Parameter count in billions
        #[arg(long)]
        parameters_b: f64,
        /// Approximate FP16 VRAM footprint in GB
        #[arg(long)]
        fp16_vram_gb: f64,
        /// License type
        #[arg(long, default_value = "open-weight")]
        license: String,
        /// Tag as Chinese-origin
        #[arg(long, default_value_t = true)]
        chinese_origin: bool,
        /// Registry storage path
        #[arg(long, default_value = "config/registry.json")]
        registry: PathBuf,
    },

    /// Remove a model profile
    Remove {
        /// Model alias to remove
        model_id: String,
        /// Registry storage path
        #[arg(long, default_value = "config/registry.json")]
        registry: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::{CampaignCommands, Cli, Commands, RegistryCommands};
    use clap::Parser;

    #[test]
    fn parse_campaign_run() {
        let cli = Cli::parse_from([
            "chronoprobe",
            "campaign",
            "run",
            "-c",
            "config/demo.yaml",
            "--registry",
            "config/reg.json",
        ]);
        match cli.command {
            Commands::Campaign {
                command: CampaignCommands::Run { config, registry },
            } => {
                assert_eq!(config, std::path::PathBuf::from("config/demo.yaml"));
                assert_eq!(registry, std::path::PathBuf::from("config/reg.json"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_registry_add_defaults() {
        let cli = Cli::parse_from([
            "chronoprobe",
            "registry",
            "add",
            "qwen3:8b-fp16",
            "--origin-vendor",
            "Alibaba/Qwen",
            "--parameters-b",
            "8",
            "--fp16-vram-gb",
            "16",
        ]);
        match cli.command {
            Commands::Registry {
                command:
                    RegistryCommands::Add {
                        model_id,
                        license,
                        chinese_origin,
                        ..
                    },
            } => {
                assert_eq!(model_id, "qwen3:8b-fp16");
                assert_eq!(license, "open-weight");
                assert!(chinese_origin);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
