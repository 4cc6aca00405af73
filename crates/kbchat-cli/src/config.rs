//! Configuration Vault – reads/writes `~/.kbchat/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use kbchat_runtime::service::{MAX_RESPONSE_TIME, MIN_CONFIDENCE_THRESHOLD};
use kbchat_runtime::{LogSettings, ResponderConfig};

/// Log line rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

/// Persisted user configuration stored in `~/.kbchat/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database holding the knowledge base and conversation log.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Boosted score an entry needs before its answer is used.
    #[serde(default = "default_min_confidence")]
    pub min_confidence_threshold: f64,

    /// Seconds under which a response counts as successful.
    #[serde(default = "default_max_response_time")]
    pub max_response_time: f64,

    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_database_path() -> String {
    home_dir()
        .join(".kbchat")
        .join("knowledge.db")
        .to_string_lossy()
        .into_owned()
}
fn default_min_confidence() -> f64 {
    MIN_CONFIDENCE_THRESHOLD
}
fn default_max_response_time() -> f64 {
    MAX_RESPONSE_TIME
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            min_confidence_threshold: default_min_confidence(),
            max_response_time: default_max_response_time(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Responder tunables derived from this config; everything not exposed
    /// here keeps its built-in default.
    pub fn responder_config(&self) -> ResponderConfig {
        ResponderConfig {
            min_confidence_threshold: self.min_confidence_threshold,
            max_response_time: self.max_response_time,
            ..ResponderConfig::default()
        }
    }

    pub fn log_settings(&self) -> LogSettings {
        LogSettings::new(self.log_level.clone(), self.log_format == LogFormat::Json)
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(
        std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Return the path to `~/.kbchat/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir().to_string_lossy())
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".kbchat").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    let mut cfg = read_file(path)?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Parse the file as written, without environment overrides.
fn read_file(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse config: {}", e))
}

/// The config as stored on disk, or defaults when the file is absent.
///
/// Use this, not [`load`], as the starting point for anything that is saved
/// back: `KBCHAT_*` overrides are per-process and must not be persisted.
pub fn load_for_edit() -> Result<Config, String> {
    load_for_edit_from(&config_path())
}

pub(crate) fn load_for_edit_from(path: &Path) -> Result<Config, String> {
    Ok(read_file(path)?.unwrap_or_default())
}

/// Config from disk, or defaults (with env overrides) when absent or broken.
pub fn load_or_default() -> Config {
    match load() {
        Ok(Some(cfg)) => cfg,
        Ok(None) | Err(_) => {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

/// Apply `KBCHAT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `KBCHAT_DB_PATH` | `database_path` |
/// | `KBCHAT_MIN_CONFIDENCE` | `min_confidence_threshold` |
/// | `KBCHAT_MAX_RESPONSE_TIME` | `max_response_time` |
/// | `KBCHAT_LOG_FORMAT` | `log_format` |
///
/// Unparseable numeric or format values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("KBCHAT_DB_PATH") {
        if !v.trim().is_empty() {
            cfg.database_path = v;
        }
    }
    if let Some(v) = env_f64("KBCHAT_MIN_CONFIDENCE") {
        cfg.min_confidence_threshold = v;
    }
    if let Some(v) = env_f64("KBCHAT_MAX_RESPONSE_TIME") {
        cfg.max_response_time = v;
    }
    if let Ok(v) = std::env::var("KBCHAT_LOG_FORMAT") {
        if let Ok(format) = v.parse() {
            cfg.log_format = format;
        }
    }
}

fn env_f64(name: &str) -> Option<f64> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Save the config to disk, creating `~/.kbchat/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent)?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
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

/// Create `dir` (and parents), owner-only on Unix.
pub(crate) fn ensure_private_dir(dir: &Path) -> Result<(), String> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create directory {}: {}", dir.display(), e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| format!("Failed to set permissions on {}: {}", dir.display(), e))?;
    }
    Ok(())
}
