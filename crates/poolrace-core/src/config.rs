use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::retry::DEFAULT_MATCH_PATTERNS;

/// Invalid configuration, reported before any task is dispatched.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("concurrency limit must be at least 1")]
    ZeroConcurrency,
    #[error("retry.max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("retry.backoff_exponent must be a finite number >= 1 (got {0})")]
    InvalidExponent(f64),
    #[error("store needs at least one read target")]
    NoReadTargets,
    #[error("invalid retry match pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Retry policy parameters (`[retry]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Regular expressions matched against `"{signature}: {message}"`.
    pub match_patterns: Vec<String>,
    /// Delay before the first retry, in milliseconds.
    pub backoff_base_ms: u64,
    /// Growth factor applied per retry.
    pub backoff_exponent: f64,
    /// Ceiling on a single backoff delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Give up once this long has passed since a task's first attempt.
    pub timeout_ms: u64,
    /// Maximum store invocations per task (including the first).
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            match_patterns: DEFAULT_MATCH_PATTERNS.iter().map(|s| s.to_string()).collect(),
            backoff_base_ms: 100,
            backoff_exponent: 1.1,
            max_delay_ms: 30_000,
            timeout_ms: 30_000,
            max_attempts: 10,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if !self.backoff_exponent.is_finite() || self.backoff_exponent < 1.0 {
            return Err(ConfigError::InvalidExponent(self.backoff_exponent));
        }
        Ok(())
    }
}

/// SQL dialect of the store under load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    Sqlite,
}

/// One connection target (the write primary or a read replica).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetConfig {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl TargetConfig {
    pub fn host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            username: None,
            password: None,
        }
    }

    /// Replace whichever connection settings are given, keep the rest.
    fn overlay(&mut self, port: Option<u16>, username: Option<&str>, password: Option<&str>) {
        if let Some(port) = port {
            self.port = Some(port);
        }
        if let Some(username) = username {
            self.username = Some(username.to_string());
        }
        if let Some(password) = password {
            self.password = Some(password.to_string());
        }
    }
}

/// Replicated store topology (`[store]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    pub dialect: Dialect,
    /// Database name (Postgres) or file path / `:memory:` (SQLite).
    pub database: String,
    /// Connections each pool keeps open while idle.
    #[serde(default)]
    pub min_connections: u32,
    /// Log the elapsed time of every query.
    #[serde(default)]
    pub benchmark: bool,
    pub write: TargetConfig,
    pub read: Vec<TargetConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Postgres,
            database: "postgres".to_string(),
            min_connections: 0,
            benchmark: false,
            write: TargetConfig::host("localhost"),
            read: vec![TargetConfig::host("localhost")],
        }
    }
}

/// What to send and how many times (`[workload]` in config.toml).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadConfig {
    /// Query text; defaults per dialect when unset.
    #[serde(default)]
    pub query: Option<String>,
    /// Number of tasks; defaults to `concurrency * 10000` when unset.
    #[serde(default)]
    pub tasks: Option<u64>,
    /// Ignore `tasks` and run until cancelled.
    #[serde(default)]
    pub forever: bool,
    /// Route the query to the write target instead of the read replicas.
    #[serde(default)]
    pub write: bool,
}

/// Global configuration loaded from `~/.config/poolrace/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolraceConfig {
    /// Maximum in-flight store invocations; also the size of each pool.
    pub concurrency: usize,
    pub store: StoreConfig,
    #[serde(default)]
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for PoolraceConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            store: StoreConfig::default(),
            workload: WorkloadConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl PoolraceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.store.read.is_empty() {
            return Err(ConfigError::NoReadTargets);
        }
        self.retry.validate()
    }

    /// Query text to race, falling back to a per-dialect default.
    pub fn query(&self) -> &str {
        match (&self.workload.query, self.store.dialect) {
            (Some(q), _) => q,
            (None, Dialect::Postgres) => "SELECT pg_sleep(1);",
            (None, Dialect::Sqlite) => "SELECT 1;",
        }
    }

    /// Task count for a finite run, or `None` when running until cancelled.
    pub fn task_count(&self) -> Option<u64> {
        if self.workload.forever {
            return None;
        }
        Some(
            self.workload
                .tasks
                .unwrap_or((self.concurrency as u64).saturating_mul(10_000)),
        )
    }

    /// Overlay `POOLRACE_*` environment variables read through `lookup`.
    ///
    /// `POOLRACE_HOST` sets the write target and, unless `POOLRACE_READ_HOSTS`
    /// is also given, replaces the read targets with the same host. Without
    /// either, port and credentials are applied to every existing target.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("POOLRACE_DIALECT") {
            self.store.dialect = match v.to_ascii_lowercase().as_str() {
                "postgres" | "postgresql" => Dialect::Postgres,
                "sqlite" => Dialect::Sqlite,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "POOLRACE_DIALECT",
                        value: v,
                    })
                }
            };
        }
        if let Some(v) = lookup("POOLRACE_DATABASE") {
            self.store.database = v;
        }
        let port = match lookup("POOLRACE_PORT") {
            Some(v) => Some(v.parse::<u16>().map_err(|_| ConfigError::InvalidEnv {
                var: "POOLRACE_PORT",
                value: v,
            })?),
            None => None,
        };
        let username = lookup("POOLRACE_USERNAME");
        let password = lookup("POOLRACE_PASSWORD");
        self.store.write.overlay(port, username.as_deref(), password.as_deref());
        let host = lookup("POOLRACE_HOST");
        if let Some(v) = &host {
            self.store.write.host = v.clone();
        }
        let read_hosts = lookup("POOLRACE_READ_HOSTS").map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });
        if let Some(hosts) = read_hosts.or_else(|| host.map(|h| vec![h])) {
            // Replicas inherit the primary's port and credentials.
            self.store.read = hosts
                .into_iter()
                .map(|h| TargetConfig {
                    host: h,
                    ..self.store.write.clone()
                })
                .collect();
        } else {
            for target in &mut self.store.read {
                target.overlay(port, username.as_deref(), password.as_deref());
            }
        }
        if let Some(v) = lookup("POOLRACE_BENCHMARK") {
            self.store.benchmark = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = lookup("POOLRACE_CONCURRENCY") {
            self.concurrency = v.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "POOLRACE_CONCURRENCY",
                value: v,
            })?;
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("poolrace")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from `path`, creating a default file if none exists.
pub fn load_or_init_at(path: &Path) -> Result<PoolraceConfig> {
    if !path.exists() {
        let default_cfg = PoolraceConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: PoolraceConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

/// Load the XDG config file, overlay the process environment, and validate.
pub fn load_or_init() -> Result<PoolraceConfig> {
    let path = config_path()?;
    let mut cfg = load_or_init_at(&path)?;
    cfg.apply_env(|k| std::env::var(k).ok())?;
    cfg.validate()?;
    Ok(cfg)
}
