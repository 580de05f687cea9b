// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use script_manager::ScriptManager;
use tracing::{debug, warn};

use super::MetricRepository;
use crate::config::RedisConfig;
use crate::encoder::MeasurableEncoder;
use crate::errors::Result;
use crate::metrics::AggregatorMetrics;
use crate::types::MetricData;

mod script_manager;

/// Pending store shared by every process pointing at the same Redis hash.
///
/// Each canonical key is a hash field holding an integer, incremented atomically on the server.
/// Only the value lives in Redis; every other field is rebuilt from the key on read.
#[derive(Clone)]
pub struct RedisMetricRepository {
    conn_manager: ConnectionManager,
    key: String,
    ttl: Duration,
    encoder: Arc<dyn MeasurableEncoder>,
    metrics: Arc<AggregatorMetrics>,
}

impl RedisMetricRepository {
    pub async fn new(
        redis_url: impl AsRef<str>,
        key: impl Into<String>,
        ttl: Duration,
        encoder: Arc<dyn MeasurableEncoder>,
        metrics: Arc<AggregatorMetrics>,
    ) -> Result<Self> {
        let client = redis::Client::open(redis_url.as_ref())?;
        let conn_manager = ConnectionManager::new(client).await?;
        Ok(Self {
            conn_manager,
            key: key.into(),
            ttl,
            encoder,
            metrics,
        })
    }

    pub async fn from_config(
        config: &RedisConfig,
        encoder: Arc<dyn MeasurableEncoder>,
        metrics: Arc<AggregatorMetrics>,
    ) -> Result<Self> {
        Self::new(&config.url, &config.key, config.ttl, encoder, metrics).await
    }

    #[cfg(test)]
    pub async fn new_localhost() -> RedisMetricRepository {
        use crate::encoder::JsonMeasurableEncoder;
        let key = format!("metrics:pending:test:{}", rand::random::<u64>());
        Self::new(
            "redis://127.0.0.1:6379",
            key,
            Duration::from_secs(60),
            Arc::new(JsonMeasurableEncoder),
            AggregatorMetrics::new_for_testing(),
        )
        .await
        .unwrap()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    // EXPIRE with 0 would drop the hash right away.
    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }
}

#[async_trait]
impl MetricRepository for RedisMetricRepository {
    async fn add(&self, metric: MetricData) -> Result<()> {
        let field = self.encoder.encode(&metric)?;
        let script = ScriptManager::pending_add_script();
        let mut conn = self.conn_manager.clone();
        let total: i64 = script
            .key(&self.key)
            .arg(&field)
            .arg(metric.value)
            .arg(self.ttl_secs())
            .invoke_async(&mut conn)
            .await?;
        debug!("Pending metric {} now at {}", metric.name, total);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<MetricData>> {
        let mut conn = self.conn_manager.clone();
        let entries: HashMap<String, i64> = conn.hgetall(&self.key).await?;

        let mut metrics = Vec::with_capacity(entries.len());
        for (field, value) in entries {
            match self.encoder.decode(&field, value) {
                Ok(metric) => metrics.push(metric),
                Err(err) => {
                    self.metrics.num_pending_decode_failures.inc();
                    warn!("Skipping undecodable pending metric {:?}: {}", field, err);
                }
            }
        }
        Ok(metrics)
    }

    async fn flush(&self) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn.del(&self.key).await?;
        Ok(())
    }
}
