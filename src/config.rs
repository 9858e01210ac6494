use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Scanline";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default Ollama endpoint for the optional AI extractor.
pub const DEFAULT_AI_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_AI_MODEL: &str = "llama3.1";

/// Get the application data directory: ~/Scanline/
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

pub fn default_database_path() -> PathBuf {
    app_data_dir().join("scanline.db")
}

/// Root that document and scan `file_path`s are relative to.
pub fn default_storage_root() -> PathBuf {
    app_data_dir().join("files")
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "scanline=info,warn"
}

/// Runtime settings, resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeConfig {
    pub database_path: PathBuf,
    pub storage_root: PathBuf,
    /// Jobs run concurrently by the background worker.
    pub workers: usize,
    /// `None` disables the AI extractor.
    pub ai_endpoint: Option<String>,
    pub ai_model: String,
    pub ai_timeout_secs: u64,
    /// AI output must be strictly above this to replace rule-based output.
    pub ai_min_confidence: f32,
    /// Age after which a `processing` result may be reclaimed.
    pub stale_after: Option<Duration>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            storage_root: default_storage_root(),
            workers: 2,
            ai_endpoint: None,
            ai_model: DEFAULT_AI_MODEL.to_string(),
            ai_timeout_secs: 120,
            ai_min_confidence: 0.0,
            stale_after: None,
        }
    }
}

impl IntakeConfig {
    /// Defaults overridden by `SCANLINE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(path) = get("SCANLINE_DB") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(path) = get("SCANLINE_STORAGE_ROOT") {
            config.storage_root = PathBuf::from(path);
        }
        if let Some(workers) = parse_or_warn::<usize>("SCANLINE_WORKERS", get("SCANLINE_WORKERS")) {
            config.workers = workers.max(1);
        }
        config.ai_endpoint = get("SCANLINE_AI_ENDPOINT");
        if let Some(model) = get("SCANLINE_AI_MODEL") {
            config.ai_model = model;
        }
        let timeout = get("SCANLINE_AI_TIMEOUT_SECS");
        if let Some(secs) = parse_or_warn("SCANLINE_AI_TIMEOUT_SECS", timeout) {
            config.ai_timeout_secs = secs;
        }
        let min_confidence = get("SCANLINE_AI_MIN_CONFIDENCE");
        if let Some(min) = parse_or_warn::<f32>("SCANLINE_AI_MIN_CONFIDENCE", min_confidence) {
            config.ai_min_confidence = min.clamp(0.0, 1.0);
        }
        let stale_after = get("SCANLINE_STALE_AFTER_SECS");
        config.stale_after = parse_or_warn::<u64>("SCANLINE_STALE_AFTER_SECS", stale_after)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        config
    }
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %value, "Ignoring unparsable setting");
            None
        }
    }
}
