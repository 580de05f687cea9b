// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Context;
use clap::*;
use tracing::{debug, info, warn};

use crate::config::MetricsConfig;
use crate::initializer::MetricsContainer;
use crate::logging::init_logging;
use crate::metrics::{encode_text, AggregatorMetrics};
use crate::VERSION;

#[derive(Parser)]
#[command(
    name = "metrics-rollup",
    about = "Metric roll-up aggregator",
    version = VERSION,
    rename_all = "kebab-case"
)]
pub struct Command {
    #[arg(env, long, help = "Path to config file")]
    config_path: PathBuf,
}

impl Command {
    pub async fn execute(self) -> anyhow::Result<()> {
        let config = MetricsConfig::load(&self.config_path)
            .with_context(|| format!("loading {}", self.config_path.display()))?;
        init_logging();
        info!("Starting metrics-rollup {}", VERSION);

        // Process-wide registry, so an embedding exporter picks the counters up.
        let registry = prometheus::default_registry();
        let metrics = AggregatorMetrics::new(registry);
        let container = MetricsContainer::new(&config, metrics.clone()).await?;
        info!(
            "Aggregator ready (driver: {:?}, queue: {}, auto-commit: {})",
            config.driver,
            config.queue.is_some(),
            config.auto_commit
        );

        tokio::signal::ctrl_c()
            .await
            .context("waiting for shutdown signal")?;
        info!("Shutting down");
        container.shutdown().await;
        info!(
            "Recorded {} metric(s), committed {} entit(ies), {} durable write(s) failed",
            metrics.num_recorded_metrics.get(),
            metrics.num_committed_entities.get(),
            metrics.num_failed_durable_writes.get()
        );
        match encode_text(registry) {
            Ok(text) => debug!("Final metrics:\n{}", text),
            Err(err) => warn!("Cannot encode metrics: {}", err),
        }
        Ok(())
    }
}
