// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

pub mod auto_commit;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod encoder;
pub mod errors;
pub mod fake;
pub mod initializer;
pub mod jobs;
pub mod logging;
pub mod manager;
pub mod metrics;
pub mod pending_metric;
pub mod repository;
pub mod store;

#[cfg(test)]
pub mod test_env;
pub mod types;

pub use errors::{MetricsError, Result};
pub use manager::{CommitOutcome, MetricManager};
pub use pending_metric::{metric, PendingMetric};
pub use types::{Attributes, Measurable, MeasurableRef, MetricData};

pub const COMMIT_LOGGING_ENV_NAME: &str = "COMMITS_LOGGING";
pub const COMMIT_LOGGING_TARGET_NAME: &str = "commits";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn commit_logging_enabled() -> bool {
    use std::sync::OnceLock;
    static ENABLED: OnceLock<bool> = OnceLock::new();

    *ENABLED.get_or_init(|| {
        std::env::var(COMMIT_LOGGING_ENV_NAME).is_ok_and(|value| value == "true")
    })
}
