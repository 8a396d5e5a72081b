//! Configuration types for the Skillsmith core library
//!
//! Configuration layers, lowest priority first: built-in defaults, an
//! optional YAML file, then `SKILLSMITH_*` environment variables. The CLI
//! overrides individual fields from flags after loading.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsmithConfig {
    /// Directory for cache artifacts
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Directory Skill packages are written under
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Default provider name when the CLI does not pass one
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Stage 4 worker process count, clamped to [1, 8]
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Chunking thresholds
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Enhancement validation thresholds
    #[serde(default)]
    pub enhancement: EnhancementConfig,
    /// Skill-index enhancement settings
    #[serde(default)]
    pub skill: SkillConfig,
    /// Provider sampling and model options
    #[serde(default)]
    pub provider_options: ProviderOptions,
    /// Prompt templates; overridable as configuration data
    #[serde(default)]
    pub prompts: crate::prompts::PromptTemplates,
}

impl Default for SkillsmithConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            output_dir: default_output_dir(),
            provider: default_provider(),
            workers: default_workers(),
            chunking: ChunkingConfig::default(),
            enhancement: EnhancementConfig::default(),
            skill: SkillConfig::default(),
            provider_options: ProviderOptions::default(),
            prompts: crate::prompts::PromptTemplates::default(),
        }
    }
}

impl SkillsmithConfig {
    /// Load configuration from defaults, an optional file, and environment
    ///
    /// Environment variables use the `SKILLSMITH_` prefix with `__` as the
    /// nesting separator, e.g. `SKILLSMITH_CHUNKING__MIN_CHUNK_CHARS=800`.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path.to_path_buf()));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("SKILLSMITH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: SkillsmithConfig = settings.try_deserialize()?;
        cfg.workers = cfg.workers.clamp(1, 8);
        Ok(cfg)
    }
}

/// Stage 3 chunking thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Chunks shorter than this merge into the previous chunk
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
    /// Pages per chunk when no chapter boundaries are detected
    #[serde(default = "default_pages_per_chunk")]
    pub pages_per_chunk: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_chunk_chars: default_min_chunk_chars(),
            pages_per_chunk: default_pages_per_chunk(),
        }
    }
}

/// Stage 4 output validation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementConfig {
    /// Minimum trimmed length for enhanced content to count as completed
    #[serde(default = "default_min_enhanced_chars")]
    pub min_enhanced_chars: usize,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            min_enhanced_chars: default_min_enhanced_chars(),
        }
    }
}

/// Stage 6 reference-reading caps and validation inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillConfig {
    /// Maximum reference files folded into the enhancement prompt
    #[serde(default = "default_max_reference_files")]
    pub max_reference_files: usize,
    /// Maximum characters taken from a single reference file
    #[serde(default = "default_max_chars_per_reference")]
    pub max_chars_per_reference: usize,
    /// Maximum total reference characters in the prompt
    #[serde(default = "default_max_total_reference_chars")]
    pub max_total_reference_chars: usize,
    /// Minimum length of a valid enhanced index document
    #[serde(default = "default_min_index_chars")]
    pub min_index_chars: usize,
    /// Domain-specific tokens the enhanced index must mention
    #[serde(default = "default_domain_tokens")]
    pub domain_tokens: Vec<String>,
}

impl Default for SkillConfig {
    fn default() -> Self {
        Self {
            max_reference_files: default_max_reference_files(),
            max_chars_per_reference: default_max_chars_per_reference(),
            max_total_reference_chars: default_max_total_reference_chars(),
            min_index_chars: default_min_index_chars(),
            domain_tokens: default_domain_tokens(),
        }
    }
}

/// Options a provider may recognize; unrecognized options are ignored
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderOptions {
    /// Override the backend's default model name
    #[serde(default)]
    pub model: Option<String>,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Output token cap
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    /// Opt-in deeper-reasoning mode (one backend only)
    #[serde(default)]
    pub enable_thinking: bool,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("skills")
}

fn default_provider() -> String {
    "glm".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_min_chunk_chars() -> usize {
    500
}

fn default_pages_per_chunk() -> usize {
    5
}

fn default_min_enhanced_chars() -> usize {
    50
}

fn default_max_reference_files() -> usize {
    8
}

fn default_max_chars_per_reference() -> usize {
    15_000
}

fn default_max_total_reference_chars() -> usize {
    50_000
}

fn default_min_index_chars() -> usize {
    1_000
}

fn default_domain_tokens() -> Vec<String> {
    ["T1", "T2", "T4", "T5", "Schedule"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let cfg = SkillsmithConfig::default();
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.provider, "glm");
        assert_eq!(cfg.chunking.min_chunk_chars, 500);
        assert_eq!(cfg.enhancement.min_enhanced_chars, 50);
        assert_eq!(cfg.skill.max_reference_files, 8);
        assert_eq!(cfg.skill.max_chars_per_reference, 15_000);
        assert!(cfg.skill.domain_tokens.contains(&"T4".to_string()));
    }

    #[test]
    fn test_config_load_without_file() {
        let cfg = SkillsmithConfig::load(None).unwrap();
        assert!(cfg.workers >= 1 && cfg.workers <= 8);
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("skillsmith.yaml");
        std::fs::write(
            &path,
            "provider: anthropic\nworkers: 12\nchunking:\n  min_chunk_chars: 900\n",
        )
        .unwrap();

        let cfg = SkillsmithConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.provider, "anthropic");
        // Out-of-range worker counts clamp into [1, 8]
        assert_eq!(cfg.workers, 8);
        assert_eq!(cfg.chunking.min_chunk_chars, 900);
    }

    #[test]
    fn test_provider_options_round_trip() {
        let opts = ProviderOptions {
            model: Some("glm-4.5".to_string()),
            temperature: Some(0.3),
            max_output_tokens: Some(8192),
            enable_thinking: true,
        };
        let yaml = serde_yaml::to_string(&opts).unwrap();
        let back: ProviderOptions = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.model.as_deref(), Some("glm-4.5"));
        assert!(back.enable_thinking);
    }
}
