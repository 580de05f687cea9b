// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry, Histogram, IntCounter,
    Registry, TextEncoder,
};

const LATENCY_MS_BUCKETS: &[f64] = &[
    1., 5., 10., 25., 50., 100., 250., 500., 1000., 2500., 5000., 10000.,
];

pub struct AggregatorMetrics {
    pub num_recorded_metrics: IntCounter,
    pub num_captured_metrics: IntCounter,
    pub num_dispatched_tasks: IntCounter,
    pub num_committed_entities: IntCounter,
    pub num_durable_writes: IntCounter,
    pub num_failed_durable_writes: IntCounter,
    pub num_pending_decode_failures: IntCounter,
    pub commit_latency_ms: Histogram,
}

impl AggregatorMetrics {
    pub fn new(registry: &Registry) -> Arc<Self> {
        Arc::new(Self {
            num_recorded_metrics: register_int_counter_with_registry!(
                "num_recorded_metrics",
                "Total number of metrics passed to record",
                registry,
            )
            .unwrap(),
            num_captured_metrics: register_int_counter_with_registry!(
                "num_captured_metrics",
                "Total number of metrics buffered in the pending store while capturing",
                registry,
            )
            .unwrap(),
            num_dispatched_tasks: register_int_counter_with_registry!(
                "num_dispatched_tasks",
                "Total number of durable write tasks handed to the dispatcher",
                registry,
            )
            .unwrap(),
            num_committed_entities: register_int_counter_with_registry!(
                "num_committed_entities",
                "Total number of distinct metric keys committed",
                registry,
            )
            .unwrap(),
            num_durable_writes: register_int_counter_with_registry!(
                "num_durable_writes",
                "Total number of successful durable upserts",
                registry,
            )
            .unwrap(),
            num_failed_durable_writes: register_int_counter_with_registry!(
                "num_failed_durable_writes",
                "Total number of failed durable upserts",
                registry,
            )
            .unwrap(),
            num_pending_decode_failures: register_int_counter_with_registry!(
                "num_pending_decode_failures",
                "Total number of pending keys that could not be decoded",
                registry,
            )
            .unwrap(),
            commit_latency_ms: register_histogram_with_registry!(
                "commit_latency_ms",
                "Latency of a commit, in milliseconds",
                LATENCY_MS_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
        })
    }

    pub fn new_for_testing() -> Arc<Self> {
        Self::new(&Registry::new())
    }
}

/// Prometheus text exposition of everything registered in `registry`.
pub fn encode_text(registry: &Registry) -> prometheus::Result<String> {
    TextEncoder::new().encode_to_string(&registry.gather())
}
