// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::config::QueueConfig;
use crate::dispatch::Dispatcher;
use crate::encoder::{JsonMeasurableEncoder, MeasurableEncoder};
use crate::errors::Result;
use crate::jobs::{group_by_key, RecordMetric};
use crate::logging::CommitLogMessage;
use crate::metrics::AggregatorMetrics;
use crate::repository::MetricRepository;
use crate::store::MetricStore;
use crate::types::{validate_metric_name, MetricData};
use crate::{commit_logging_enabled, COMMIT_LOGGING_TARGET_NAME};

/// Result of a commit. An empty pending set is reported explicitly rather than as a zero count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CommitOutcome {
    NothingToCommit,
    /// Number of distinct keys written or dispatched.
    Committed(usize),
}

impl CommitOutcome {
    pub fn count(&self) -> usize {
        match self {
            CommitOutcome::NothingToCommit => 0,
            CommitOutcome::Committed(count) => *count,
        }
    }
}

impl Display for CommitOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CommitOutcome::NothingToCommit => write!(f, "No metrics to commit."),
            CommitOutcome::Committed(count) => write!(f, "Committed {} metric(s).", count),
        }
    }
}

/// Entry point for emitting metrics.
///
/// While capturing, recorded metrics are buffered and summed per key until [`commit`] writes
/// them out. Otherwise every record goes straight to the durable store, inline or through the
/// dispatcher.
///
/// `commit` is not exclusive: two concurrent commits may both read the same pending set before
/// either flushes it. Drive commits from a single task (see [`crate::auto_commit`]).
///
/// [`commit`]: MetricManager::commit
#[async_trait]
pub trait MetricManager: Sync + Send {
    async fn record(&self, metric: MetricData) -> Result<()>;

    async fn commit(&self) -> Result<CommitOutcome>;

    fn capture(&self);

    fn is_capturing(&self) -> bool;

    fn stop_capturing(&self);
}

#[derive(Debug, Clone, Serialize)]
struct CommitDetails {
    outcome: CommitOutcome,
    dispatched: bool,
    latency_ms: u64,
}

pub struct DatabaseMetricManager {
    repository: Arc<dyn MetricRepository>,
    store: Arc<dyn MetricStore>,
    encoder: Arc<dyn MeasurableEncoder>,
    dispatch: Option<(Arc<dyn Dispatcher>, QueueConfig)>,
    capturing: AtomicBool,
    metrics: Arc<AggregatorMetrics>,
}

impl DatabaseMetricManager {
    pub fn new(
        repository: Arc<dyn MetricRepository>,
        store: Arc<dyn MetricStore>,
        metrics: Arc<AggregatorMetrics>,
    ) -> Self {
        Self {
            repository,
            store,
            encoder: Arc::new(JsonMeasurableEncoder),
            dispatch: None,
            capturing: AtomicBool::new(false),
            metrics,
        }
    }

    /// Must match the encoder used by the repository, or commits will not group correctly.
    pub fn with_encoder(mut self, encoder: Arc<dyn MeasurableEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Hand durable writes to `dispatcher` instead of performing them inline.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>, queue: QueueConfig) -> Self {
        self.dispatch = Some((dispatcher, queue));
        self
    }

    pub fn is_dispatching(&self) -> bool {
        self.dispatch.is_some()
    }

    async fn write(&self, task: RecordMetric) -> Result<()> {
        match &self.dispatch {
            Some((dispatcher, queue)) => {
                dispatcher.enqueue(task, queue.name.as_deref(), queue.connection.as_deref());
                self.metrics.num_dispatched_tasks.inc();
                Ok(())
            }
            None => {
                let result = task.handle(self.store.as_ref()).await;
                match &result {
                    Ok(()) => self.metrics.num_durable_writes.inc(),
                    Err(_) => self.metrics.num_failed_durable_writes.inc(),
                }
                result
            }
        }
    }
}

#[async_trait]
impl MetricManager for DatabaseMetricManager {
    async fn record(&self, metric: MetricData) -> Result<()> {
        validate_metric_name(&metric.name)?;
        self.metrics.num_recorded_metrics.inc();
        debug!(
            "Recording metric {} (value {}, capturing: {})",
            metric.name,
            metric.value,
            self.is_capturing()
        );
        if self.is_capturing() {
            self.metrics.num_captured_metrics.inc();
            return self.repository.add(metric).await;
        }
        self.write(RecordMetric::single(metric)).await
    }

    async fn commit(&self) -> Result<CommitOutcome> {
        let timer = Instant::now();
        let pending = self.repository.all().await?;
        if pending.is_empty() {
            trace!("No pending metrics to commit");
            return Ok(CommitOutcome::NothingToCommit);
        }

        let groups = group_by_key(self.encoder.as_ref(), pending)?;
        let count = groups.len();
        for group in groups {
            self.write(RecordMetric::new(group)).await?;
        }
        self.repository.flush().await?;

        let outcome = CommitOutcome::Committed(count);
        let latency = timer.elapsed();
        self.metrics.num_committed_entities.inc_by(count as u64);
        self.metrics
            .commit_latency_ms
            .observe(latency.as_secs_f64() * 1000.0);
        info!("{} ({:?})", outcome, latency);

        if commit_logging_enabled() {
            let message = CommitLogMessage::new(CommitDetails {
                outcome,
                dispatched: self.is_dispatching(),
                latency_ms: latency.as_millis() as u64,
            });
            trace!(target: COMMIT_LOGGING_TARGET_NAME, "{}", message);
        }
        Ok(outcome)
    }

    fn capture(&self) {
        self.capturing.store(true, Ordering::SeqCst);
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn stop_capturing(&self) {
        self.capturing.store(false, Ordering::SeqCst);
    }
}
