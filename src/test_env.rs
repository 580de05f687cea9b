// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;

use crate::dispatch::{Dispatcher, QueuedTask};
use crate::jobs::RecordMetric;
use crate::manager::DatabaseMetricManager;
use crate::metrics::AggregatorMetrics;
use crate::repository::MemoryMetricRepository;
use crate::store::{SqliteMetricStore, TableSchema, DEFAULT_METRICS_TABLE};

pub fn date_time(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

/// In-memory store with a daily `metrics` table.
pub fn memory_store() -> SqliteMetricStore {
    memory_store_with(TableSchema::new(DEFAULT_METRICS_TABLE))
}

pub fn memory_store_with(schema: TableSchema) -> SqliteMetricStore {
    let store = SqliteMetricStore::open_in_memory(&schema.name).unwrap();
    store.create_table(&schema).unwrap();
    store
}

/// Manager over an in-process repository and an in-memory hourly `metrics` table.
pub fn memory_manager() -> (DatabaseMetricManager, SqliteMetricStore) {
    let store = memory_store_with(TableSchema::new(DEFAULT_METRICS_TABLE).with_hourly(true));
    let manager = DatabaseMetricManager::new(
        Arc::new(MemoryMetricRepository::default()),
        Arc::new(store.clone()),
        AggregatorMetrics::new_for_testing(),
    );
    (manager, store)
}

/// Keeps every enqueued task instead of running it.
#[derive(Default)]
pub struct RecordingDispatcher {
    enqueued: Mutex<Vec<QueuedTask>>,
}

impl RecordingDispatcher {
    pub fn enqueued(&self) -> Vec<QueuedTask> {
        self.enqueued.lock().clone()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn enqueue(&self, task: RecordMetric, queue: Option<&str>, connection: Option<&str>) {
        self.enqueued.lock().push(QueuedTask {
            task,
            queue: queue.map(str::to_string),
            connection: connection.map(str::to_string),
        });
    }
}
