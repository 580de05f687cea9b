// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

pub type Result<T, E = MetricsError> = std::result::Result<T, E>;

/// Errors surfaced by the aggregation pipeline. None of them are swallowed by the core;
/// retry decisions belong to whoever drives the pipeline (the worker, the auto-committer).
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A pending key could not be turned back into a metric.
    #[error("failed to decode metric key: {0}")]
    Decode(String),

    /// A metric could not be turned into a pending key.
    #[error("failed to encode metric key: {0}")]
    Encode(String),

    /// The metric itself is unusable, e.g. it has no name.
    #[error("invalid metric: {0}")]
    InvalidMetric(String),

    /// The durable store rejected or failed a write.
    #[error("durable write failed: {0}")]
    DurableWrite(String),

    /// The destination store or one of its columns cannot be resolved.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The shared pending store is unreachable or returned an unexpected reply.
    #[error("pending store error: {0}")]
    Pending(String),
}

impl MetricsError {
    pub fn decode(message: impl std::fmt::Display) -> Self {
        Self::Decode(message.to_string())
    }

    pub fn configuration(message: impl std::fmt::Display) -> Self {
        Self::Configuration(message.to_string())
    }

    pub fn durable_write(message: impl std::fmt::Display) -> Self {
        Self::DurableWrite(message.to_string())
    }
}

impl From<rusqlite::Error> for MetricsError {
    fn from(err: rusqlite::Error) -> Self {
        Self::DurableWrite(err.to_string())
    }
}

impl From<redis::RedisError> for MetricsError {
    fn from(err: redis::RedisError) -> Self {
        Self::Pending(err.to_string())
    }
}

impl From<tokio::task::JoinError> for MetricsError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::DurableWrite(format!("write task aborted: {}", err))
    }
}
