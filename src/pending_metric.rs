// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use chrono::{NaiveDateTime, Utc};

use crate::errors::Result;
use crate::manager::MetricManager;
use crate::types::{Attributes, MeasurableRef, MetricData};

/// Start describing a metric: `metric("page_views").category("marketing").record(&manager, 1)`.
///
/// Enumerated names work through `From<MyEnum> for String`.
pub fn metric(name: impl Into<String>) -> PendingMetric {
    PendingMetric::new(name)
}

/// Fluent description of a metric that has not been recorded yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMetric {
    name: String,
    category: Option<String>,
    date: Option<NaiveDateTime>,
    hourly: bool,
    measurable: Option<MeasurableRef>,
    store: Option<String>,
    additional: Attributes,
}

impl PendingMetric {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: None,
            date: None,
            hourly: false,
            measurable: None,
            store: None,
            additional: Attributes::new(),
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Defaults to the moment the metric is built.
    pub fn date(mut self, date: NaiveDateTime) -> Self {
        self.date = Some(date);
        self
    }

    pub fn hourly(mut self) -> Self {
        self.hourly = true;
        self
    }

    pub fn measurable(mut self, measurable: MeasurableRef) -> Self {
        self.measurable = Some(measurable);
        self
    }

    /// Write to `table` instead of the default one.
    pub fn store(mut self, table: impl Into<String>) -> Self {
        self.store = Some(table.into());
        self
    }

    /// Merge extra dimensional attributes; later values win per key.
    pub fn with(mut self, attributes: Attributes) -> Self {
        self.additional.extend(attributes);
        self
    }

    pub fn to_metric_data(&self, value: i64) -> MetricData {
        MetricData {
            name: self.name.clone(),
            category: self.category.clone(),
            value,
            date: self.date.unwrap_or_else(|| Utc::now().naive_utc()),
            hourly: self.hourly,
            measurable: self.measurable.clone(),
            store: self.store.clone(),
            additional: self.additional.clone(),
        }
    }

    pub async fn record(&self, manager: &dyn MetricManager, value: i64) -> Result<()> {
        manager.record(self.to_metric_data(value)).await
    }
}
