// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use crate::encoder::MeasurableEncoder;
use crate::errors::Result;
use crate::store::MetricStore;
use crate::types::MetricData;

/// A durable write: one or more metrics sharing a canonical key, summed into a single row.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMetric {
    pub metrics: Vec<MetricData>,
}

impl RecordMetric {
    pub fn new(metrics: Vec<MetricData>) -> Self {
        Self { metrics }
    }

    pub fn single(metric: MetricData) -> Self {
        Self {
            metrics: vec![metric],
        }
    }

    pub fn total(&self) -> i64 {
        self.metrics.iter().map(|m| m.value).sum()
    }

    pub async fn handle(&self, store: &dyn MetricStore) -> Result<()> {
        if self.metrics.is_empty() {
            return Ok(());
        }
        store.upsert(&self.metrics).await
    }
}

/// Group metrics by canonical key, keeping the order in which keys first appear.
pub fn group_by_key(
    encoder: &dyn MeasurableEncoder,
    metrics: Vec<MetricData>,
) -> Result<Vec<Vec<MetricData>>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<MetricData>> = vec![];
    for metric in metrics {
        let key = encoder.encode(&metric)?;
        match index.get(&key) {
            Some(&i) => groups[i].push(metric),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![metric]);
            }
        }
    }
    Ok(groups)
}
