use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8675;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_RUNNER_URL: &str = "http://localhost:8675";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000; // queue worker cadence
pub const DEFAULT_RUNNER_TIMEOUT_SECS: u64 = 30;

/// Top-level config (kiln.toml + KILN_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KilnConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl DatabaseConfig {
    /// Create the directory the database file lives in.
    pub fn ensure_parent_dir(&self) -> crate::error::Result<()> {
        if let Some(parent) = std::path::Path::new(&self.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// Where the job runner's start endpoint lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Base URL without trailing slash, e.g. `http://localhost:8675`.
    #[serde(default = "default_runner_url")]
    pub base_url: String,
    /// Upper bound on a single start request. A hung runner would otherwise
    /// hold the worker's in-flight guard forever.
    #[serde(default = "default_runner_timeout")]
    pub timeout_secs: u64,
}

impl RunnerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RUNNER_URL.to_string(),
            timeout_secs: DEFAULT_RUNNER_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_interval")]
    pub interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WorkerConfig {
    /// Tick period. Zero is clamped to 1 ms; a zero-period interval panics.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Filesystem defaults used when the matching settings row is absent.
///
/// Unset folders resolve relative to `toolkit_root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_toolkit_root")]
    pub toolkit_root: String,
    pub training_folder: Option<String>,
    pub datasets_folder: Option<String>,
    pub data_root: Option<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            toolkit_root: default_toolkit_root(),
            training_folder: None,
            datasets_folder: None,
            data_root: None,
        }
    }
}

impl PathsConfig {
    pub fn training_folder(&self) -> String {
        self.resolve(self.training_folder.as_deref(), "output")
    }

    pub fn datasets_folder(&self) -> String {
        self.resolve(self.datasets_folder.as_deref(), "datasets")
    }

    pub fn data_root(&self) -> String {
        self.resolve(self.data_root.as_deref(), "data")
    }

    fn resolve(&self, explicit: Option<&str>, child: &str) -> String {
        match explicit {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => PathBuf::from(&self.toolkit_root)
                .join(child)
                .to_string_lossy()
                .into_owned(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_runner_url() -> String {
    DEFAULT_RUNNER_URL.to_string()
}
fn default_runner_timeout() -> u64 {
    DEFAULT_RUNNER_TIMEOUT_SECS
}
fn default_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_toolkit_root() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.kiln", home)
}
fn default_db_path() -> String {
    format!("{}/kiln.db", default_toolkit_root())
}

impl KilnConfig {
    /// Load config from a TOML file with KILN_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g. `KILN_RUNNER__BASE_URL`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("KILN_").split("__"))
            .extract()
            .map_err(|e| crate::error::KilnError::Config(e.to_string()))
    }
}

fn default_config_path() -> String {
    format!("{}/kiln.toml", default_toolkit_root())
}
