// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::manager::MetricManager;

/// Periodically commits pending metrics from a single task, so commits never overlap.
pub struct AutoCommitter {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl AutoCommitter {
    pub fn start(manager: Arc<dyn MetricManager>, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            info!("Auto-commit started, every {:?}", interval);
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => commit(manager.as_ref()).await,
                    _ = &mut shutdown_rx => break,
                }
            }
            commit(manager.as_ref()).await;
            info!("Auto-commit stopped");
        });
        Self { shutdown, handle }
    }

    /// Stop the loop after one final commit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.handle.await {
            error!("Auto-commit task failed: {}", err);
        }
    }
}

async fn commit(manager: &dyn MetricManager) {
    if let Err(err) = manager.commit().await {
        error!("Auto-commit failed, pending metrics kept: {}", err);
    }
}
