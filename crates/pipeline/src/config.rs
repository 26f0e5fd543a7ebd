use anyhow::{Context, Result};
use extract::{RelationshipConfig, RetryPolicy};
use ingest::ChunkerConfig;
use report::ReportConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: OperationMode,
    pub bind_addr: String,
    pub llm: LlmConfig,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub extraction: ExtractionConfig,
    pub scoring: ScoringConfig,
    pub report: ReportSettings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Fast,      // Aggressive caching, more parallel calls
    Accurate,  // No caching, model scoring, more retries
    Balanced,  // Default
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Capability calls in flight per run
    pub max_concurrent_llm_calls: usize,
    /// Runs executing at once
    pub max_concurrent_runs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    /// JSON file of pinned scores keyed by excerpt hash
    pub pins_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub chunk_max_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub max_excerpt_chars: usize,
    pub require_verbatim_excerpts: bool,
    pub enforce_level_progression: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    Heuristic,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub scorer: ScorerKind,
    /// Model scores below this count as unsupported
    pub min_strength: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub excerpt_display_chars: usize,
    pub evidence_row_limit: Option<usize>,
    /// When set, every run writes `{run_id}.md` and `{run_id}.json` here
    pub output_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: OperationMode::Balanced,
            bind_addr: "0.0.0.0:3000".to_string(),
            llm: LlmConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            extraction: ExtractionConfig::default(),
            scoring: ScoringConfig::default(),
            report: ReportSettings::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_llm_calls: 3,
            max_concurrent_runs: 5,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10000,
            pins_path: None,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            chunk_max_tokens: 6000,
            chunk_overlap_tokens: 200,
            max_excerpt_chars: 600,
            require_verbatim_excerpts: true,
            enforce_level_progression: false,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            scorer: ScorerKind::Heuristic,
            min_strength: 0.2,
        }
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            excerpt_display_chars: 200,
            evidence_row_limit: None,
            output_dir: None,
        }
    }
}

impl AppConfig {
    pub fn fast_mode() -> Self {
        Self {
            mode: OperationMode::Fast,
            concurrency: ConcurrencyConfig {
                max_concurrent_llm_calls: 10,
                max_concurrent_runs: 20,
            },
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff_ms: 500,
                max_backoff_ms: 5000,
            },
            cache: CacheConfig {
                enabled: true,
                max_entries: 50000,
                pins_path: None,
            },
            ..Self::default()
        }
    }

    pub fn accurate_mode() -> Self {
        Self {
            mode: OperationMode::Accurate,
            concurrency: ConcurrencyConfig {
                max_concurrent_llm_calls: 2,
                max_concurrent_runs: 3,
            },
            retry: RetryConfig {
                max_retries: 5,
                initial_backoff_ms: 2000,
                max_backoff_ms: 20000,
            },
            cache: CacheConfig {
                enabled: false,
                max_entries: 0,
                pins_path: None,
            },
            scoring: ScoringConfig {
                scorer: ScorerKind::Model,
                min_strength: 0.2,
            },
            ..Self::default()
        }
    }

    /// Read `AOP_CONFIG` when set, otherwise start from defaults, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("AOP_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Config file {} is not valid", path.display()))?;
        info!(path = %path.display(), mode = ?config.mode, "Loaded configuration");
        Ok(config)
    }

    /// Environment variables win over file values.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("OLLAMA_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.llm.model = model;
        }
        if let Some(addr) = lookup("BIND_ADDR") {
            self.bind_addr = addr;
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            self.retry.initial_backoff_ms,
            self.retry.max_backoff_ms,
        )
    }

    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            max_tokens: self.extraction.chunk_max_tokens,
            overlap_tokens: self.extraction.chunk_overlap_tokens,
        }
    }

    pub fn relationship_config(&self) -> RelationshipConfig {
        RelationshipConfig {
            max_excerpt_chars: self.extraction.max_excerpt_chars,
            require_verbatim_excerpts: self.extraction.require_verbatim_excerpts,
            enforce_level_progression: self.extraction.enforce_level_progression,
            max_concurrent_calls: self.concurrency.max_concurrent_llm_calls,
        }
    }

    pub fn report_config(&self) -> ReportConfig {
        ReportConfig {
            excerpt_display_chars: self.report.excerpt_display_chars,
            evidence_row_limit: self.report.evidence_row_limit,
        }
    }
}
