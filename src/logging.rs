// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::{commit_logging_enabled, COMMIT_LOGGING_TARGET_NAME};

pub const DEFAULT_LOG_FILTER: &str = "off,metrics_rollup=info";

/// Install the global fmt subscriber. `RUST_LOG` overrides the default filter; commit logs are
/// enabled on top of it when requested.
pub fn init_logging() {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if commit_logging_enabled() {
        if let Ok(directive) = format!("{}=trace", COMMIT_LOGGING_TARGET_NAME).parse() {
            filter = filter.add_directive(directive);
        }
    }
    // Ignore a subscriber installed earlier in the process.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CommitLogMessage<D: Serialize + Clone> {
    pub timestamp: i64,
    pub level: String,
    pub host: String,
    pub message: String,
    pub details: D,
}

impl<D> CommitLogMessage<D>
where
    D: Serialize + Clone,
{
    pub fn new(details: D) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            level: "trace".to_string(),
            host,
            message: "commit data".to_string(),
            details,
        }
    }
}

impl<D> Display for CommitLogMessage<D>
where
    D: Serialize + Clone,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let serialized = serde_json::to_string(&self).map_err(|_| fmt::Error)?;
        write!(f, "{}", serialized)
    }
}
