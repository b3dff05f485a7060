//! `facility-scout.toml` loading.
//!
//! Only `[facilities]` is required; every other section falls back to the
//! defaults below.

use crate::error::ConfigError;
use crate::models::Source;
use crate::scrapers::fetcher::{FetchSettings, BROWSER_USER_AGENT};
use crate::scrapers::inha::INHA_BASE_URL;
use crate::scrapers::types::{Backoff, RetryPolicy};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "facility-scout.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detail_base_url: String,
    /// Reservations older than `today - retention_days` are swept
    pub retention_days: u32,
    pub fetch: FetchConfig,
    pub store: StoreConfig,
    pub schedule: ScheduleConfig,
    /// Facility name -> listing URL
    pub facilities: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detail_base_url: INHA_BASE_URL.to_string(),
            retention_days: 1,
            fetch: FetchConfig::default(),
            store: StoreConfig::default(),
            schedule: ScheduleConfig::default(),
            facilities: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub delay_secs: u64,
    pub backoff: BackoffKind,
    pub max_delay_secs: u64,
    pub user_agent: String,
    /// Print pages fetched in parallel per facility
    pub detail_concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            max_attempts: 3,
            delay_secs: 2,
            backoff: BackoffKind::Fixed,
            max_delay_secs: 30,
            user_agent: BROWSER_USER_AGENT.to_string(),
            detail_concurrency: 4,
        }
    }
}

impl FetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed,
            BackoffKind::Exponential => Backoff::Exponential {
                max_delay: Duration::from_secs(self.max_delay_secs),
            },
        };
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            delay: Duration::from_secs(self.delay_secs),
            backoff,
        }
    }

    pub fn settings(&self) -> FetchSettings {
        FetchSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
            retry: self.retry_policy(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/reservations.sqlite"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_minutes: u64,
    /// `[start, end)` local hours; `None` means always active
    pub active_hours: Option<(u32, u32)>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            active_hours: None,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Configured facilities in name order
    pub fn sources(&self) -> Vec<Source> {
        self.facilities
            .iter()
            .map(|(name, url)| Source {
                name: name.clone(),
                url: url.clone(),
            })
            .collect()
    }
}
