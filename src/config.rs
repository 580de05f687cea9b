// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::errors::{MetricsError, Result};
use crate::store::{TableSchema, DEFAULT_METRICS_TABLE};

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_PENDING_KEY: &str = "metrics:pending";
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_AUTO_COMMIT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MetricsConfig {
    pub driver: PendingDriver,
    /// `None` writes synchronously; `Some` hands writes to the queue.
    pub queue: Option<QueueConfig>,
    /// Start the service's manager in capture mode. Off means every record writes through.
    pub capture: bool,
    pub auto_commit: bool,
    #[serde(with = "serde_duration")]
    pub auto_commit_interval: Duration,
    pub redis: RedisConfig,
    pub database: DatabaseConfig,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            driver: PendingDriver::default(),
            queue: None,
            capture: false,
            auto_commit: true,
            auto_commit_interval: DEFAULT_AUTO_COMMIT_INTERVAL,
            redis: RedisConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl MetricsConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MetricsError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            MetricsError::configuration(format!("invalid config {}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self).map_err(MetricsError::configuration)?;
        std::fs::write(path, content).map_err(|e| {
            MetricsError::configuration(format!("cannot write {}: {}", path.display(), e))
        })
    }
}

/// Which pending store backs capture mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PendingDriver {
    /// Process-local, lost on restart.
    #[default]
    InProcess,
    /// Shared Redis hash, safe for several writers.
    Redis,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct QueueConfig {
    pub name: Option<String>,
    pub connection: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RedisConfig {
    pub url: String,
    /// Name of the hash holding the pending metrics.
    pub key: String,
    /// Idle time after which an untouched pending hash expires.
    #[serde(with = "serde_duration")]
    pub ttl: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            key: DEFAULT_PENDING_KEY.to_string(),
            ttl: DEFAULT_PENDING_TTL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Table used by metrics without a store override.
    pub table: String,
    pub hourly: bool,
    pub extra_columns: Vec<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("metrics.db"),
            table: DEFAULT_METRICS_TABLE.to_string(),
            hourly: false,
            extra_columns: vec![],
        }
    }
}

impl DatabaseConfig {
    pub fn schema(&self) -> TableSchema {
        TableSchema::new(&self.table)
            .with_hourly(self.hourly)
            .with_extra_columns(self.extra_columns.iter().cloned())
    }
}

mod serde_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
