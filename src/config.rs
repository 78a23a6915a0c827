//! Configuration for the curator.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CURATOR_HOME, CURATOR_EMBEDDING_URL,
//!    CURATOR_ZERO_SHOT_URL, CURATOR_ZERO_SHOT_TOKEN)
//! 2. Config file (.curator/config.yaml)
//! 3. Defaults (~/.curator)
//!
//! Config file discovery:
//! - Searches current directory and parents for .curator/config.yaml
//! - Relative paths in the file resolve against the .curator/ directory

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::hashing::DEFAULT_DIMENSION;
use crate::adapters::ollama::{DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_URL};
use crate::adapters::zero_shot::DEFAULT_ZERO_SHOT_URL;
use crate::adapters::{Embedder, HashingEmbedder, HttpEmbedder, HttpZeroShot, ZeroShotScorer};
use crate::core::{FusionConfig, Timeouts};
use crate::dedup::DEFAULT_THRESHOLD;
use crate::normalize::NormalizerOptions;
use crate::taxonomy::Taxonomy;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .curator/)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,

    /// Records file (relative to .curator/); defaults to <home>/records.jsonl
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<String>,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Similarity strictly above this marks a near-duplicate
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Local feature hashing, no network
    #[default]
    Hashing,
    /// Ollama-compatible HTTP server
    Http,
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}
fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}
fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,
    #[serde(default = "default_embedding_url")]
    pub url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            url: default_embedding_url(),
            model: default_embedding_model(),
            dimension: default_dimension(),
        }
    }
}

fn default_zero_shot_url() -> String {
    DEFAULT_ZERO_SHOT_URL.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroShotConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_zero_shot_url")]
    pub url: String,

    /// Also score subcategory labels
    #[serde(default)]
    pub subcategories: bool,

    /// Never serialized; set through CURATOR_ZERO_SHOT_TOKEN
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for ZeroShotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_zero_shot_url(),
            subcategories: false,
            token: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub zero_shot: ZeroShotConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    /// Taxonomy YAML; the built-in taxonomy when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Derive subcategory prototypes for the semantic classifier
    #[serde(default)]
    pub subcategory_prototypes: bool,
}

fn default_max_parallel() -> usize {
    4
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
        }
    }
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub normalizer: NormalizerOptions,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to the curator home (state directory)
    pub home: PathBuf,
    pub records: PathBuf,
    pub taxonomy_path: Option<PathBuf>,

    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,

    /// File settings with environment overrides applied
    pub settings: ConfigFile,
}

impl ResolvedConfig {
    /// The configured taxonomy, or the built-in one
    pub fn taxonomy(&self) -> Result<Taxonomy> {
        match &self.taxonomy_path {
            Some(path) => Taxonomy::from_file(path),
            None => Ok(Taxonomy::builtin()?.clone()),
        }
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        let embedding = &self.settings.capabilities.embedding;
        match embedding.provider {
            EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::new(embedding.dimension)),
            EmbeddingProvider::Http => {
                Arc::new(
                    HttpEmbedder::new(embedding.url.clone(), embedding.model.clone())
                        .with_timeout(self.settings.timeouts.embedding()),
                )
            }
        }
    }

    /// None when zero-shot scoring is disabled
    pub fn zero_shot(&self) -> Option<Arc<dyn ZeroShotScorer>> {
        let zero_shot = &self.settings.capabilities.zero_shot;
        if !zero_shot.enabled {
            return None;
        }

        let mut scorer =
            HttpZeroShot::new(zero_shot.url.clone()).with_timeout(self.settings.timeouts.zero_shot());
        if let Some(token) = &zero_shot.token {
            scorer = scorer.with_token(token.clone());
        }
        Some(Arc::new(scorer))
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".curator").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Apply environment overrides on top of file settings
fn apply_env(settings: &mut ConfigFile, var: impl Fn(&str) -> Option<String>) {
    if let Some(url) = var("CURATOR_EMBEDDING_URL") {
        settings.capabilities.embedding.url = url;
        settings.capabilities.embedding.provider = EmbeddingProvider::Http;
    }
    if let Some(url) = var("CURATOR_ZERO_SHOT_URL") {
        settings.capabilities.zero_shot.url = url;
        settings.capabilities.zero_shot.enabled = true;
    }
    if let Some(token) = var("CURATOR_ZERO_SHOT_TOKEN") {
        settings.capabilities.zero_shot.token = Some(token);
    }
}

fn resolve(
    config_file: Option<PathBuf>,
    mut settings: ConfigFile,
    var: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    apply_env(&mut settings, &var);

    let default_home = || -> Result<PathBuf> {
        Ok(dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".curator"))
    };

    // Relative paths in the file resolve against .curator/
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf);

    let home = match (var("CURATOR_HOME"), &settings.paths.home, &base_dir) {
        (Some(env_home), _, _) => PathBuf::from(env_home),
        (None, Some(home), Some(base)) => resolve_path(base, home),
        _ => default_home()?,
    };

    let records = match (&settings.paths.records, &base_dir) {
        (Some(records), Some(base)) => resolve_path(base, records),
        _ => home.join("records.jsonl"),
    };

    let taxonomy_path = match (&settings.taxonomy.path, &base_dir) {
        (Some(path), Some(base)) => Some(resolve_path(base, path)),
        (Some(path), None) => Some(PathBuf::from(path)),
        (None, _) => None,
    };

    Ok(ResolvedConfig {
        home,
        records,
        taxonomy_path,
        config_file,
        settings,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let config_file = find_config_file();
    let settings = match &config_file {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    resolve(config_file, settings, |name| std::env::var(name).ok())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the curator home directory
pub fn curator_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the records file path ($CURATOR_HOME/records.jsonl)
pub fn records_path() -> Result<PathBuf> {
    Ok(config()?.records.clone())
}
