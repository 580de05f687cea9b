// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::MetricRepository;
use crate::encoder::{JsonMeasurableEncoder, MeasurableEncoder};
use crate::errors::Result;
use crate::types::MetricData;

#[derive(Default)]
struct Pending {
    order: Vec<String>,
    entries: HashMap<String, MetricData>,
}

/// Process-local pending store. Keeps insertion order and is lost when the process exits, so it
/// must only back a single aggregator.
pub struct MemoryMetricRepository {
    encoder: Arc<dyn MeasurableEncoder>,
    pending: Mutex<Pending>,
}

impl MemoryMetricRepository {
    pub fn new(encoder: Arc<dyn MeasurableEncoder>) -> Self {
        Self {
            encoder,
            pending: Mutex::new(Pending::default()),
        }
    }
}

impl Default for MemoryMetricRepository {
    fn default() -> Self {
        Self::new(Arc::new(JsonMeasurableEncoder))
    }
}

#[async_trait]
impl MetricRepository for MemoryMetricRepository {
    async fn add(&self, metric: MetricData) -> Result<()> {
        let key = self.encoder.encode(&metric)?;

        let mut guard = self.pending.lock();
        let pending = &mut *guard;
        if let Some(existing) = pending.entries.get_mut(&key) {
            existing.value += metric.value;
            return Ok(());
        }
        pending.order.push(key.clone());
        pending.entries.insert(key, metric);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<MetricData>> {
        let pending = self.pending.lock();
        Ok(pending
            .order
            .iter()
            .filter_map(|key| pending.entries.get(key).cloned())
            .collect())
    }

    async fn flush(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        pending.order.clear();
        pending.entries.clear();
        Ok(())
    }
}
