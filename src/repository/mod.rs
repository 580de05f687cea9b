// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::MetricData;

pub mod memory;
pub mod redis;

pub use memory::MemoryMetricRepository;
pub use self::redis::RedisMetricRepository;

/// Buffer of metrics waiting to be committed, keyed by their canonical key.
///
/// Adding a metric whose key is already pending sums the values; the descriptive fields of the
/// first metric seen under that key are kept.
#[async_trait]
pub trait MetricRepository: Sync + Send {
    async fn add(&self, metric: MetricData) -> Result<()>;

    /// All pending metrics, one per key.
    async fn all(&self) -> Result<Vec<MetricData>>;

    /// Drop every pending metric.
    async fn flush(&self) -> Result<()>;
}
