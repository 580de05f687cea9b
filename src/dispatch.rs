// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Out-of-band durable writes. The manager only sees [`Dispatcher::enqueue`]; what runs the
//! task, and how often it is retried, is decided here.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, error, info, warn};

use crate::jobs::RecordMetric;
use crate::metrics::AggregatorMetrics;
use crate::store::MetricStore;

const DEFAULT_RETRIES: usize = 3;

pub trait Dispatcher: Sync + Send {
    /// Hand a task over for later execution. Fire-and-forget.
    fn enqueue(&self, task: RecordMetric, queue: Option<&str>, connection: Option<&str>);
}

#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub task: RecordMetric,
    pub queue: Option<String>,
    pub connection: Option<String>,
}

/// In-process queue backed by a tokio channel, drained by a [`MetricWorker`].
#[derive(Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::UnboundedSender<QueuedTask>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QueuedTask>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Dispatcher for ChannelDispatcher {
    fn enqueue(&self, task: RecordMetric, queue: Option<&str>, connection: Option<&str>) {
        let queued = QueuedTask {
            task,
            queue: queue.map(str::to_string),
            connection: connection.map(str::to_string),
        };
        if let Err(err) = self.sender.send(queued) {
            error!(
                "Metric worker has stopped, dropping write of {} metric(s)",
                err.0.task.metrics.len()
            );
        }
    }
}

pub struct WorkerHandle {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Close the queue, even while dispatchers are still alive, and wait for the backlog.
    pub async fn stop(self) {
        let WorkerHandle { shutdown, handle } = self;
        let _ = shutdown.send(());
        Self::join_handle(handle).await;
    }

    /// Wait for the worker to exit on its own.
    pub async fn join(self) {
        Self::join_handle(self.handle).await;
    }

    async fn join_handle(handle: JoinHandle<()>) {
        if let Err(err) = handle.await {
            error!("Metric worker failed: {}", err);
        }
    }
}

/// Runs queued writes one at a time, in submission order.
pub struct MetricWorker {
    store: Arc<dyn MetricStore>,
    metrics: Arc<AggregatorMetrics>,
    retries: usize,
}

impl MetricWorker {
    pub fn new(store: Arc<dyn MetricStore>, metrics: Arc<AggregatorMetrics>) -> Self {
        Self {
            store,
            metrics,
            retries: DEFAULT_RETRIES,
        }
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    /// Spawn the worker. It stops once every dispatcher feeding `receiver` is dropped, or when
    /// [`WorkerHandle::stop`] is called, after draining what is already queued.
    pub fn start(self, mut receiver: mpsc::UnboundedReceiver<QueuedTask>) -> WorkerHandle {
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            info!("Metric worker started");
            let mut stop_pending = true;
            loop {
                tokio::select! {
                    queued = receiver.recv() => match queued {
                        Some(queued) => self.process(queued).await,
                        None => break,
                    },
                    stop = &mut shutdown_rx, if stop_pending => {
                        stop_pending = false;
                        // A dropped handle detaches; only an explicit stop closes the queue.
                        if stop.is_ok() {
                            receiver.close();
                        }
                    }
                }
            }
            info!("Metric worker stopped");
        });
        WorkerHandle { shutdown, handle }
    }

    async fn process(&self, queued: QueuedTask) {
        let strategy = ExponentialBackoff::from_millis(10)
            .map(jitter)
            .take(self.retries);
        let task = &queued.task;
        let store = self.store.as_ref();
        let result = Retry::start(strategy, || async move {
            let result = task.handle(store).await;
            if let Err(err) = &result {
                warn!("Metric write failed, may retry: {}", err);
            }
            result
        })
        .await;

        match result {
            Ok(()) => {
                self.metrics.num_durable_writes.inc();
                debug!(
                    "Wrote {} metric(s) from queue {:?} on connection {:?}",
                    queued.task.metrics.len(),
                    queued.queue,
                    queued.connection
                );
            }
            Err(err) => {
                self.metrics.num_failed_durable_writes.inc();
                error!(
                    "Giving up on metric write after {} retries: {}",
                    self.retries, err
                );
            }
        }
    }
}
