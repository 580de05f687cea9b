// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Recording stand-in for a [`MetricManager`], for asserting what code emits without a
//! database.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::Result;
use crate::manager::{CommitOutcome, MetricManager};
use crate::types::MetricData;

/// Logs every recorded metric, capturing or not, and never touches storage.
#[derive(Default)]
pub struct MetricFake {
    recorded: Mutex<Vec<MetricData>>,
    capturing: AtomicBool,
}

impl MetricFake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded metric, in recording order.
    pub fn recorded(&self) -> Vec<MetricData> {
        self.recorded.lock().clone()
    }

    pub fn recorded_named(&self, name: &str) -> Vec<MetricData> {
        self.recorded_where(|m| m.name == name)
    }

    pub fn recorded_where(&self, predicate: impl Fn(&MetricData) -> bool) -> Vec<MetricData> {
        self.recorded
            .lock()
            .iter()
            .filter(|m| predicate(*m))
            .cloned()
            .collect()
    }

    #[track_caller]
    pub fn assert_recorded(&self, name: &str) {
        assert!(
            !self.recorded_named(name).is_empty(),
            "assert_recorded failed: no metric named {:?} was recorded",
            name
        );
    }

    #[track_caller]
    pub fn assert_recorded_where(&self, predicate: impl Fn(&MetricData) -> bool) {
        assert!(
            !self.recorded_where(predicate).is_empty(),
            "assert_recorded_where failed: no recorded metric matches the predicate"
        );
    }

    #[track_caller]
    pub fn assert_recorded_times(&self, name: &str, times: usize) {
        let count = self.recorded_named(name).len();
        assert_eq!(
            count, times,
            "assert_recorded_times failed: metric {:?} was recorded {} time(s), expected {}",
            name, count, times
        );
    }

    #[track_caller]
    pub fn assert_recorded_times_where(
        &self,
        predicate: impl Fn(&MetricData) -> bool,
        times: usize,
    ) {
        let count = self.recorded_where(predicate).len();
        assert_eq!(
            count, times,
            "assert_recorded_times_where failed: {} recorded metric(s) match, expected {}",
            count, times
        );
    }

    #[track_caller]
    pub fn assert_not_recorded(&self, name: &str) {
        let count = self.recorded_named(name).len();
        assert!(
            count == 0,
            "assert_not_recorded failed: metric {:?} was recorded {} time(s)",
            name,
            count
        );
    }

    #[track_caller]
    pub fn assert_not_recorded_where(&self, predicate: impl Fn(&MetricData) -> bool) {
        let count = self.recorded_where(predicate).len();
        assert!(
            count == 0,
            "assert_not_recorded_where failed: {} recorded metric(s) match the predicate",
            count
        );
    }

    #[track_caller]
    pub fn assert_nothing_recorded(&self) {
        let count = self.recorded.lock().len();
        assert!(
            count == 0,
            "assert_nothing_recorded failed: {} metric(s) were recorded",
            count
        );
    }
}

#[async_trait]
impl MetricManager for MetricFake {
    async fn record(&self, metric: MetricData) -> Result<()> {
        self.recorded.lock().push(metric);
        Ok(())
    }

    /// Reports the size of the log; the log itself is kept.
    async fn commit(&self) -> Result<CommitOutcome> {
        let count = self.recorded.lock().len();
        Ok(if count == 0 {
            CommitOutcome::NothingToCommit
        } else {
            CommitOutcome::Committed(count)
        })
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
