// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::*;
use metrics_rollup::config::{MetricsConfig, PendingDriver};
use metrics_rollup::encoder::JsonMeasurableEncoder;
use metrics_rollup::initializer::{connect_repository, connect_store, create_table};
use metrics_rollup::logging::init_logging;
use metrics_rollup::manager::{DatabaseMetricManager, MetricManager};
use metrics_rollup::metrics::AggregatorMetrics;

#[derive(Parser)]
#[command(
    name = "metrics-rollup-tool",
    about = "Metric roll-up command line tools",
    rename_all = "kebab-case"
)]
pub enum ToolCommand {
    /// Generate a sample config file and put it in the specified path.
    #[clap(name = "generate-sample-config")]
    GenerateSampleConfig {
        #[arg(long, help = "Path to config file")]
        config_path: PathBuf,
        #[arg(long, help = "Keep pending metrics in redis instead of in process")]
        with_redis: bool,
        #[arg(long, short, help = "Overwrite the existing config file")]
        force: bool,
    },
    /// Create a metrics table and its indexes. Defaults to the configured table.
    #[clap(name = "create-table")]
    CreateTable {
        #[arg(env, long, help = "Path to config file")]
        config_path: PathBuf,
        #[arg(long, help = "Table to create instead of the configured one")]
        name: Option<String>,
        #[arg(long, help = "Add the hour column")]
        hourly: bool,
    },
    /// Commit every pending metric once. Only useful with a shared pending store.
    #[clap(name = "commit")]
    Commit {
        #[arg(env, long, help = "Path to config file")]
        config_path: PathBuf,
    },
}

impl ToolCommand {
    pub async fn execute(self) -> anyhow::Result<()> {
        match self {
            ToolCommand::GenerateSampleConfig {
                config_path,
                with_redis,
                force,
            } => {
                if config_path.exists() && !force {
                    bail!("Config file already exists. Use --force (-f) to overwrite.");
                }
                let driver = if with_redis {
                    PendingDriver::Redis
                } else {
                    PendingDriver::InProcess
                };
                let config = MetricsConfig {
                    driver,
                    ..Default::default()
                };
                config.save(&config_path)?;
                println!("Sample config written to {}", config_path.display());
            }
            ToolCommand::CreateTable {
                config_path,
                name,
                hourly,
            } => {
                let config = MetricsConfig::load(config_path)?;
                let schema = create_table(&config, name.as_deref(), hourly)?;
                println!(
                    "Table {} ready in {}",
                    schema.name,
                    config.database.path.display()
                );
            }
            ToolCommand::Commit { config_path } => {
                let config = MetricsConfig::load(config_path)?;
                if config.driver == PendingDriver::InProcess {
                    eprintln!("The in-process driver keeps nothing between runs.");
                }
                let metrics = AggregatorMetrics::new(prometheus::default_registry());
                let encoder = Arc::new(JsonMeasurableEncoder);
                let repository =
                    connect_repository(&config, encoder.clone(), metrics.clone()).await?;
                let store = connect_store(&config)?;
                // Writes inline even when a queue is configured: no worker runs here.
                let manager = DatabaseMetricManager::new(repository, Arc::new(store), metrics)
                    .with_encoder(encoder);
                let outcome = manager.commit().await?;
                println!("{}", outcome);
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    ToolCommand::parse().execute().await
}
