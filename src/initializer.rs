// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tracing::info;

use crate::auto_commit::AutoCommitter;
use crate::config::{MetricsConfig, PendingDriver};
use crate::dispatch::{ChannelDispatcher, MetricWorker, WorkerHandle};
use crate::encoder::{JsonMeasurableEncoder, MeasurableEncoder};
use crate::errors::Result;
use crate::manager::{DatabaseMetricManager, MetricManager};
use crate::metrics::AggregatorMetrics;
use crate::repository::{MemoryMetricRepository, MetricRepository, RedisMetricRepository};
use crate::store::{SqliteMetricStore, TableSchema};

/// Pending store selected by `config.driver`.
pub async fn connect_repository(
    config: &MetricsConfig,
    encoder: Arc<dyn MeasurableEncoder>,
    metrics: Arc<AggregatorMetrics>,
) -> Result<Arc<dyn MetricRepository>> {
    let repository: Arc<dyn MetricRepository> = match config.driver {
        PendingDriver::InProcess => Arc::new(MemoryMetricRepository::new(encoder)),
        PendingDriver::Redis => {
            let repository =
                RedisMetricRepository::from_config(&config.redis, encoder, metrics).await?;
            info!(
                "Pending metrics kept in redis hash {} at {}",
                repository.key(),
                config.redis.url
            );
            Arc::new(repository)
        }
    };
    Ok(repository)
}

/// Open the database and make sure the configured table exists.
pub fn connect_store(config: &MetricsConfig) -> Result<SqliteMetricStore> {
    let database = &config.database;
    let store = SqliteMetricStore::open(&database.path, &database.table)?;
    store.create_table(&database.schema())?;
    info!(
        "Metrics database {} opened, default table {}",
        database.path.display(),
        store.default_table()
    );
    Ok(store)
}

/// Create `name`, or the configured table when `None`, in the configured database. Named
/// tables share the configured extra columns; `hourly` adds the `hour` column to either.
pub fn create_table(
    config: &MetricsConfig,
    name: Option<&str>,
    hourly: bool,
) -> Result<TableSchema> {
    let database = &config.database;
    let mut schema = match name {
        Some(name) => TableSchema::new(name)
            .with_extra_columns(database.extra_columns.iter().cloned()),
        None => database.schema(),
    };
    schema.hourly |= hourly;
    let store = SqliteMetricStore::open(&database.path, &database.table)?;
    store.create_table(&schema)?;
    Ok(schema)
}

/// Everything a running aggregator owns. Dropping it without [`MetricsContainer::shutdown`]
/// loses whatever is still pending in process.
pub struct MetricsContainer {
    manager: Arc<DatabaseMetricManager>,
    store: SqliteMetricStore,
    worker: Option<WorkerHandle>,
    auto_committer: Option<AutoCommitter>,
}

impl MetricsContainer {
    /// Wire up stores, dispatcher and auto-commit from `config`. The manager writes through
    /// unless `config.capture` is set.
    pub async fn new(config: &MetricsConfig, metrics: Arc<AggregatorMetrics>) -> Result<Self> {
        let encoder: Arc<dyn MeasurableEncoder> = Arc::new(JsonMeasurableEncoder);
        let repository = connect_repository(config, encoder.clone(), metrics.clone()).await?;
        let store = connect_store(config)?;

        let mut manager =
            DatabaseMetricManager::new(repository, Arc::new(store.clone()), metrics.clone())
                .with_encoder(encoder);
        let worker = match &config.queue {
            Some(queue) => {
                let (dispatcher, receiver) = ChannelDispatcher::new();
                manager = manager.with_dispatcher(Arc::new(dispatcher), queue.clone());
                let worker = MetricWorker::new(Arc::new(store.clone()), metrics).start(receiver);
                Some(worker)
            }
            None => None,
        };
        let manager = Arc::new(manager);

        if config.capture {
            manager.capture();
        }
        let auto_committer = if config.auto_commit {
            Some(AutoCommitter::start(
                manager.clone(),
                config.auto_commit_interval,
            ))
        } else {
            None
        };

        Ok(Self {
            manager,
            store,
            worker,
            auto_committer,
        })
    }

    pub fn manager(&self) -> Arc<DatabaseMetricManager> {
        self.manager.clone()
    }

    pub fn store(&self) -> &SqliteMetricStore {
        &self.store
    }

    /// Stop auto-commit (which commits one last time), then wait for queued writes to drain.
    pub async fn shutdown(mut self) {
        if let Some(auto_committer) = self.auto_committer.take() {
            auto_committer.stop().await;
        }
        // Manager clones handed out earlier may still hold the dispatcher.
        if let Some(worker) = self.worker.take() {
            worker.stop().await;
        }
        info!("Metrics container stopped");
    }
}
