//! Configuration Vault – reads/writes `~/.mnemo/config.toml`.

use mnemo_memory::RankerConfig;
use mnemo_runtime::curator::CuratorConfig;
use mnemo_runtime::reflector::ReflectorConfig;
use mnemo_runtime::EngineConfig;
use mnemo_types::Valence;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted user configuration stored in `~/.mnemo/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the OpenAI-compatible model server (Ollama by default).
    #[serde(default = "default_llm_url")]
    pub llm_url: String,

    /// Chat model used for curation and reflection (e.g. "llama3").
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding model (e.g. "nomic-embed-text").
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Bearer token for hosted endpoints. Leave empty for a local Ollama.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    /// Where the memory snapshot lives.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default)]
    pub min_similarity: f32,

    /// Relevance weight of the ranking blend; recency gets `1 - alpha`.
    #[serde(default = "default_alpha")]
    pub alpha: f32,

    #[serde(default)]
    pub salience_weight: f32,

    /// Reflect every this many turns; 0 disables reflection.
    #[serde(default = "default_reflection_interval")]
    pub reflection_interval: u64,

    #[serde(default = "default_reflection_min_entries")]
    pub reflection_min_entries: usize,

    /// Only reflect on memories with these valences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection_valence_filter: Option<Vec<Valence>>,

    #[serde(default = "default_curator_temperature")]
    pub curator_temperature: f32,

    #[serde(default = "default_reflector_temperature")]
    pub reflector_temperature: f32,

    /// The persona's belief list, revised by reflection.
    #[serde(default = "default_beliefs")]
    pub beliefs: Vec<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("llm_url", &self.llm_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field(
                "api_key",
                if self.api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("snapshot_path", &self.snapshot_path)
            .field("top_k", &self.top_k)
            .field("min_similarity", &self.min_similarity)
            .field("alpha", &self.alpha)
            .field("salience_weight", &self.salience_weight)
            .field("reflection_interval", &self.reflection_interval)
            .field("reflection_min_entries", &self.reflection_min_entries)
            .field("reflection_valence_filter", &self.reflection_valence_filter)
            .field("curator_temperature", &self.curator_temperature)
            .field("reflector_temperature", &self.reflector_temperature)
            .field("beliefs", &self.beliefs.len())
            .finish()
    }
}

fn default_llm_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_snapshot_path() -> PathBuf {
    mnemo_dir_for_home(&home_dir()).join("memories.json")
}
fn default_top_k() -> usize {
    mnemo_runtime::engine::DEFAULT_TOP_K
}
fn default_alpha() -> f32 {
    mnemo_memory::ranker::DEFAULT_ALPHA
}
fn default_reflection_interval() -> u64 {
    mnemo_runtime::engine::DEFAULT_REFLECTION_INTERVAL
}
fn default_reflection_min_entries() -> usize {
    mnemo_runtime::reflector::DEFAULT_MIN_ENTRIES
}
fn default_curator_temperature() -> f32 {
    mnemo_runtime::curator::DEFAULT_CURATOR_TEMPERATURE
}
fn default_reflector_temperature() -> f32 {
    mnemo_runtime::reflector::DEFAULT_REFLECTOR_TEMPERATURE
}
fn default_beliefs() -> Vec<String> {
    vec![
        "I am a curious and attentive companion.".to_string(),
        "I remember what people tell me and use it to help them.".to_string(),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_url: default_llm_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            api_key: String::new(),
            snapshot_path: default_snapshot_path(),
            top_k: default_top_k(),
            min_similarity: 0.0,
            alpha: default_alpha(),
            salience_weight: 0.0,
            reflection_interval: default_reflection_interval(),
            reflection_min_entries: default_reflection_min_entries(),
            reflection_valence_filter: None,
            curator_temperature: default_curator_temperature(),
            reflector_temperature: default_reflector_temperature(),
            beliefs: default_beliefs(),
        }
    }
}

impl Config {
    /// Engine settings derived from this config.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            top_k: self.top_k,
            min_similarity: self.min_similarity,
            ranker: RankerConfig {
                alpha: self.alpha,
                salience_weight: self.salience_weight,
            },
            reflection_interval: self.reflection_interval,
            curator: CuratorConfig {
                temperature: self.curator_temperature,
            },
            reflector: ReflectorConfig {
                temperature: self.reflector_temperature,
                min_entries: self.reflection_min_entries,
                valence_filter: self.reflection_valence_filter.clone(),
            },
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn mnemo_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".mnemo")
}

/// Return the path to `~/.mnemo/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    mnemo_dir_for_home(home).join("config.toml")
}

/// Load the config as stored on disk, without `MNEMO_*` overrides.
/// Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `MNEMO_*` environment variable overrides to `cfg`.
///
/// Overrides shape the running session only; [`update`] never writes them
/// back to disk.
///
/// | Variable | Config field |
/// |---|---|
/// | `MNEMO_LLM_URL` | `llm_url` |
/// | `MNEMO_MODEL` | `model` |
/// | `MNEMO_EMBEDDING_MODEL` | `embedding_model` |
/// | `MNEMO_SNAPSHOT_PATH` | `snapshot_path` |
/// | `MNEMO_ALPHA` | `alpha` |
/// | `MNEMO_TOP_K` | `top_k` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MNEMO_LLM_URL") {
        cfg.llm_url = v;
    }
    if let Ok(v) = std::env::var("MNEMO_MODEL") {
        cfg.model = v;
    }
    if let Ok(v) = std::env::var("MNEMO_EMBEDDING_MODEL") {
        cfg.embedding_model = v;
    }
    if let Ok(v) = std::env::var("MNEMO_SNAPSHOT_PATH") {
        cfg.snapshot_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("MNEMO_ALPHA")
        && let Ok(alpha) = v.parse::<f32>()
    {
        cfg.alpha = alpha;
    }
    if let Ok(v) = std::env::var("MNEMO_TOP_K")
        && let Ok(k) = v.parse::<usize>()
    {
        cfg.top_k = k;
    }
}

/// Re-read the stored config (defaults when absent), apply `edit`, and save.
///
/// Fields the edit leaves alone keep their on-disk values, so a session's
/// stale copy or its environment overrides never overwrite them.
pub fn update(edit: impl FnOnce(&mut Config)) -> Result<(), String> {
    update_at(&config_path(), edit)
}

pub(crate) fn update_at(path: &Path, edit: impl FnOnce(&mut Config)) -> Result<(), String> {
    let mut stored = load_from(path)?.unwrap_or_default();
    edit(&mut stored);
    save_to(&stored, path)
}

/// Copy the settings-editor fields that changed between `before` and
/// `after` into `stored`.
pub fn merge_settings(stored: &mut Config, before: &Config, after: &Config) {
    if after.llm_url != before.llm_url {
        stored.llm_url = after.llm_url.clone();
    }
    if after.model != before.model {
        stored.model = after.model.clone();
    }
    if after.embedding_model != before.embedding_model {
        stored.embedding_model = after.embedding_model.clone();
    }
    if after.alpha != before.alpha {
        stored.alpha = after.alpha;
    }
    if after.top_k != before.top_k {
        stored.top_k = after.top_k;
    }
    if after.reflection_interval != before.reflection_interval {
        stored.reflection_interval = after.reflection_interval;
    }
}

/// Save the config to disk, creating `~/.mnemo/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner-only directory (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Owner-only file (rw-------) on Unix; it may hold an API key.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
