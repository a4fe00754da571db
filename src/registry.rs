//! Model registry: metadata for locally served GGUF models.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Tag marking models published by a Chinese vendor, used by the
/// origin-filtered listing.
pub const ORIGIN_TAG: &str = "chinese-origin";

/// Metadata for one registered model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    pub model_id: String,
    pub origin_vendor: String,
    /// Parameter count in billions.
    pub parameters_b: f64,
    /// Approximate FP16 VRAM requirement in GB.
    pub fp16_vram_gb: f64,
    pub license: String,
    #[serde(default = "default_true")]
    pub fp16_available: bool,
    #[serde(default)]
    pub quantized_only: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// On-disk shape of the registry document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    models: BTreeMap<String, ModelProfile>,
}

/// Stores metadata for locally served models as a single JSON document.
#[derive(Debug)]
pub struct ModelRegistry {
    path: PathBuf,
    models: BTreeMap<String, ModelProfile>,
}

impl ModelRegistry {
    /// Load the registry from `path`, or start empty if the file does not
    /// exist yet.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let models = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            let document: RegistryDocument = serde_json::from_str(&data)
                .map_err(|err| Error::registry(format!("invalid registry document: {err}")))?;
            document.models
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, models })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    /// Persist the registry document.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let document = RegistryDocument {
            models: self.models.clone(),
        };
        let payload = serde_json::to_string_pretty(&document)?;
        std::fs::write(&self.path, payload)?;
        Ok(())
    }

    /// Insert or replace a profile and persist.
    pub fn upsert(&mut self, profile: ModelProfile) -> Result<()> {
        self.models.insert(profile.model_id.clone(), profile);
        self.save()
    }

    /// Remove a profile and persist. Returns whether it existed.
    pub fn remove(&mut self, model_id: &str) -> Result<bool> {
        if self.models.remove(model_id).is_some() {
            self.save()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// List profiles, optionally filtered by the origin tag.
    pub fn list(&self, origin_only: Option<bool>) -> Vec<&ModelProfile> {
        self.models
            .values()
            .filter(|m| match origin_only {
                None => true,
                Some(true) => m.tags.iter().any(|t| t == ORIGIN_TAG),
                Some(false) => !m.tags.iter().any(|t| t == ORIGIN_TAG),
            })
            .collect()
    }

    /// Fail if any of `model_ids` is not registered. Campaign specs may
    /// reference registry models; this runs during validation, before any
    /// interaction.
    pub fn validate_models(&self, model_ids: &[String]) -> Result<()> {
        let unknown: Vec<&str> = model_ids
            .iter()
            .filter(|id| !self.contains(id))
            .map(String::as_str)
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(Error::registry(format!(
                "models not found in registry: {}",
                unknown.join(", ")
            )))
        }
    }
}

/// Heuristic for quantized model identifiers.
///
/// A bare `q` is not a quantization marker (it would flag names like
/// `qwen3`); look for common quantization patterns instead.
pub fn looks_quantized(model_id: &str) -> bool {
    let lowered = model_id.to_lowercase();
    ["-q", ":q", "q4", "q5", "q6", "q8", "int4", "int8", "gguf"]
        .iter()
        .any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::{looks_quantized, ModelProfile, ModelRegistry, ORIGIN_TAG};

    fn profile(id: &str, tags: Vec<String>) -> ModelProfile {
        ModelProfile {
            model_id: id.to_string(),
            origin_vendor: "Alibaba/Qwen".to_string(),
            parameters_b: 8.0,
            fp16_vram_gb: 16.0,
            license: "open-weight".to_string(),
            fp16_available: true,
            quantized_only: false,
            tags,
        }
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        let mut registry = ModelRegistry::from_file(&path).unwrap();
        assert!(registry.is_empty());
        registry
            .upsert(profile("qwen3:8b-fp16", vec![ORIGIN_TAG.to_string()]))
            .unwrap();

        let reloaded = ModelRegistry::from_file(&path).unwrap();
        assert!(reloaded.contains("qwen3:8b-fp16"));
        assert_eq!(reloaded.list(Some(true)).len(), 1);
        assert!(reloaded.list(Some(false)).is_empty());
    }

    #[test]
    fn remove_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let mut registry = ModelRegistry::from_file(&path).unwrap();
        registry.upsert(profile("deepseek-r1", vec![])).unwrap();
        assert!(registry.remove("deepseek-r1").unwrap());
        assert!(!registry.remove("deepseek-r1").unwrap());
    }

    #[test]
    fn validate_models_names_the_missing_ones() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::from_file(dir.path().join("registry.json")).unwrap();
        let err = registry
            .validate_models(&["ghost-model".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("ghost-model"));
    }

    #[test]
    fn quantization_heuristic_spares_qwen() {
        assert!(!looks_quantized("qwen3"));
        assert!(looks_quantized("qwen3:q4_K_M"));
        assert!(looks_quantized("llama-3-8b-int8"));
        assert!(looks_quantized("model.gguf"));
    }
}
