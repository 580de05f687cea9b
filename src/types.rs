// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{MetricsError, Result};

/// Extra dimensional attributes of a metric. Keys are kept sorted so the same logical content
/// always produces the same pending key.
pub type Attributes = BTreeMap<String, Value>;

/// Attribute names owned by the metric itself. Extra attributes using one of them never reach
/// the durable store.
pub const RESERVED_ATTRIBUTES: [&str; 13] = [
    "name",
    "category",
    "year",
    "month",
    "day",
    "hour",
    "associated_type",
    "associated_id",
    "value",
    "id",
    "date_at",
    "created_at",
    "updated_at",
];

pub fn is_reserved_attribute(name: &str) -> bool {
    RESERVED_ATTRIBUTES.contains(&name)
}

/// A metric must carry a non-blank name.
pub fn validate_metric_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(MetricsError::InvalidMetric(
            "metric name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// A reference to the domain entity a metric is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasurableRef {
    pub kind: String,
    pub id: String,
}

impl MeasurableRef {
    pub fn new(kind: impl Into<String>, id: impl ToString) -> Self {
        Self {
            kind: kind.into(),
            id: id.to_string(),
        }
    }
}

/// Read access to everything that identifies a metric.
pub trait Measurable: Send + Sync {
    fn name(&self) -> &str;
    fn category(&self) -> Option<&str>;
    fn value(&self) -> i64;
    fn year(&self) -> i32;
    fn month(&self) -> u32;
    fn day(&self) -> u32;
    /// `None` unless the metric is tracked hourly.
    fn hour(&self) -> Option<u32>;
    /// Alternate destination table, if any.
    fn store(&self) -> Option<&str>;
    fn measurable(&self) -> Option<&MeasurableRef>;
    fn additional(&self) -> &Attributes;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricData {
    pub name: String,
    pub category: Option<String>,
    pub value: i64,
    pub date: NaiveDateTime,
    pub hourly: bool,
    pub measurable: Option<MeasurableRef>,
    pub store: Option<String>,
    pub additional: Attributes,
}

impl MetricData {
    /// A daily metric with value 1, dated now.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: None,
            value: 1,
            date: Utc::now().naive_utc(),
            hourly: false,
            measurable: None,
            store: None,
            additional: Attributes::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_value(mut self, value: i64) -> Self {
        self.value = value;
        self
    }

    pub fn with_date(mut self, date: NaiveDateTime) -> Self {
        self.date = date;
        self
    }

    pub fn with_hourly(mut self, hourly: bool) -> Self {
        self.hourly = hourly;
        self
    }

    pub fn with_measurable(mut self, measurable: MeasurableRef) -> Self {
        self.measurable = Some(measurable);
        self
    }

    pub fn with_store(mut self, store: impl Into<String>) -> Self {
        self.store = Some(store.into());
        self
    }

    pub fn with_additional(mut self, additional: Attributes) -> Self {
        self.additional = additional;
        self
    }
}

impl Measurable for MetricData {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    fn value(&self) -> i64 {
        self.value
    }

    fn year(&self) -> i32 {
        self.date.year()
    }

    fn month(&self) -> u32 {
        self.date.month()
    }

    fn day(&self) -> u32 {
        self.date.day()
    }

    fn hour(&self) -> Option<u32> {
        self.hourly.then(|| self.date.hour())
    }

    fn store(&self) -> Option<&str> {
        self.store.as_deref()
    }

    fn measurable(&self) -> Option<&MeasurableRef> {
        self.measurable.as_ref()
    }

    fn additional(&self) -> &Attributes {
        &self.additional
    }
}
