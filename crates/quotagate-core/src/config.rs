//! Gateway configuration: YAML file, `QUOTAGATE_*` environment overrides,
//! and a startup-only validation pass.

use crate::fallback::FallbackKeySet;
use crate::store::{AdmissionBackend, CredentialAdmin, MemoryStore, SqliteStore, StoreError};
use crate::window::WindowClock;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_DB_PATH: &str = "quotagate.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Fatal at startup; never raised while serving.
    #[error("Misconfigured: {0}")]
    Misconfigured(String),

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to open credential store: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Every request must present a credential.
    #[default]
    Required,
    /// No credential checks; sessions bind to the anonymous fingerprint.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    Sqlite {
        #[serde(default = "default_db_path")]
        path: PathBuf,
    },
    Memory,
    /// Skip the durable store and go straight to the fallback keys.
    None,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: default_db_path(),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub enabled: bool,
    pub keys: Vec<String>,
}

impl FallbackConfig {
    pub fn key_set(&self) -> FallbackKeySet {
        FallbackKeySet::new(&self.keys)
    }
}

impl fmt::Debug for FallbackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackConfig")
            .field("enabled", &self.enabled)
            .field("keys", &format_args!("[REDACTED; {}]", self.keys.len()))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub mode: AuthMode,
    pub store: StoreConfig,
    pub fallback: FallbackConfig,
    pub backend_timeout_ms: u64,
    /// Fixed offset from UTC used to cut day windows.
    pub reference_utc_offset_minutes: i32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            store: StoreConfig::default(),
            fallback: FallbackConfig::default(),
            backend_timeout_ms: DEFAULT_BACKEND_TIMEOUT_MS,
            reference_utc_offset_minutes: 0,
        }
    }
}

impl GatewayConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults overlaid with `QUOTAGATE_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env(|name| env::var(name).ok())?;
        Ok(cfg)
    }

    /// Overlay variables from `lookup`. Unset variables leave fields alone.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("QUOTAGATE_AUTH_MODE") {
            self.mode = match v.trim().to_lowercase().as_str() {
                "required" => AuthMode::Required,
                "disabled" => AuthMode::Disabled,
                other => {
                    return Err(ConfigError::Misconfigured(format!(
                        "QUOTAGATE_AUTH_MODE must be 'required' or 'disabled', got '{other}'"
                    )))
                }
            };
        }

        if let Some(v) = lookup("QUOTAGATE_STORE") {
            self.store = match v.trim().to_lowercase().as_str() {
                "sqlite" => StoreConfig::Sqlite {
                    path: self.sqlite_path().unwrap_or_else(default_db_path),
                },
                "memory" => StoreConfig::Memory,
                "none" => StoreConfig::None,
                other => {
                    return Err(ConfigError::Misconfigured(format!(
                        "QUOTAGATE_STORE must be sqlite, memory or none, got '{other}'"
                    )))
                }
            };
        }

        if let Some(v) = lookup("QUOTAGATE_DB_PATH") {
            if let StoreConfig::Sqlite { path } = &mut self.store {
                *path = PathBuf::from(v);
            }
        }

        if let Some(v) = lookup("QUOTAGATE_FALLBACK_ENABLED") {
            self.fallback.enabled = parse_bool("QUOTAGATE_FALLBACK_ENABLED", &v)?;
        }

        if let Some(v) = lookup("QUOTAGATE_FALLBACK_KEYS") {
            self.fallback.keys = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(v) = lookup("QUOTAGATE_BACKEND_TIMEOUT_MS") {
            self.backend_timeout_ms = v.trim().parse().map_err(|_| {
                ConfigError::Misconfigured(format!("invalid QUOTAGATE_BACKEND_TIMEOUT_MS '{v}'"))
            })?;
        }

        if let Some(v) = lookup("QUOTAGATE_DAY_UTC_OFFSET_MINUTES") {
            self.reference_utc_offset_minutes = v.trim().parse().map_err(|_| {
                ConfigError::Misconfigured(format!(
                    "invalid QUOTAGATE_DAY_UTC_OFFSET_MINUTES '{v}'"
                ))
            })?;
        }

        Ok(())
    }

    fn sqlite_path(&self) -> Option<PathBuf> {
        match &self.store {
            StoreConfig::Sqlite { path } => Some(path.clone()),
            _ => None,
        }
    }

    /// Startup checks. Only this pass may refuse to start the gateway.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_timeout_ms == 0 {
            return Err(ConfigError::Misconfigured(
                "backend_timeout_ms must be greater than zero".into(),
            ));
        }

        self.clock()?;

        let usable_keys = !self.fallback.key_set().is_empty();
        if self.fallback.enabled && !usable_keys {
            return Err(ConfigError::Misconfigured(
                "fallback is enabled but no fallback keys are configured".into(),
            ));
        }

        if self.mode == AuthMode::Required
            && self.store == StoreConfig::None
            && !(self.fallback.enabled && usable_keys)
        {
            return Err(ConfigError::Misconfigured(
                "authentication is required but no credential source is configured \
                 (store is 'none' and fallback keys are not enabled)"
                    .into(),
            ));
        }

        Ok(())
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    pub fn clock(&self) -> Result<WindowClock, ConfigError> {
        WindowClock::with_offset_minutes(self.reference_utc_offset_minutes).ok_or_else(|| {
            ConfigError::Misconfigured(format!(
                "reference_utc_offset_minutes {} is outside +/-1439",
                self.reference_utc_offset_minutes
            ))
        })
    }

    /// Fallback keys, only when fallback is switched on.
    pub fn fallback_keys(&self) -> Option<FallbackKeySet> {
        self.fallback.enabled.then(|| self.fallback.key_set())
    }

    /// Open the configured store. SQLite files are opened, never provisioned.
    pub fn open_store(&self) -> Result<StoreHandle, ConfigError> {
        let clock = self.clock()?;
        Ok(match &self.store {
            StoreConfig::Sqlite { path } => {
                StoreHandle::Sqlite(SqliteStore::open(path)?.with_clock(clock))
            }
            StoreConfig::Memory => StoreHandle::Memory(MemoryStore::new().with_clock(clock)),
            StoreConfig::None => StoreHandle::None,
        })
    }
}

/// A store opened from [`StoreConfig`].
#[derive(Clone)]
pub enum StoreHandle {
    Sqlite(SqliteStore),
    Memory(MemoryStore),
    None,
}

impl StoreHandle {
    pub fn backend(&self) -> Option<Arc<dyn AdmissionBackend>> {
        match self {
            Self::Sqlite(s) => Some(Arc::new(s.clone())),
            Self::Memory(m) => Some(Arc::new(m.clone())),
            Self::None => None,
        }
    }

    pub fn admin(&self) -> Option<&dyn CredentialAdmin> {
        match self {
            Self::Sqlite(s) => Some(s),
            Self::Memory(m) => Some(m),
            Self::None => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Memory(_) => "memory",
            Self::None => "none",
        }
    }
}

fn parse_bool(name: &str, v: &str) -> Result<bool, ConfigError> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::Misconfigured(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}
