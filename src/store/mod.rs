// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{MetricsError, Result};
use crate::types::{Attributes, MeasurableRef, MetricData};

pub mod sqlite;

pub use sqlite::SqliteMetricStore;

pub const DEFAULT_METRICS_TABLE: &str = "metrics";

/// Durable home of the aggregated totals.
#[async_trait]
pub trait MetricStore: Sync + Send {
    /// Add the summed value of `metrics` to the row identified by the first metric, creating the
    /// row first if it does not exist. All metrics are expected to share one canonical key.
    /// An empty slice is a no-op.
    async fn upsert(&self, metrics: &[MetricData]) -> Result<()>;
}

/// Shape of a metrics table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    /// Adds the nullable `hour` column.
    pub hourly: bool,
    /// Extra dimensional columns, filled from metric attributes.
    pub extra_columns: Vec<String>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hourly: false,
            extra_columns: vec![],
        }
    }

    pub fn with_hourly(mut self, hourly: bool) -> Self {
        self.hourly = hourly;
        self
    }

    pub fn with_extra_columns(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// Calendar ranges relative to a given day. Weeks start on Monday; "last" ranges step back
/// from the start of the current one, so they never overflow into the current period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Period {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    ThisQuarter,
    LastQuarter,
    ThisYear,
    LastYear,
}

impl Period {
    /// First and last day of the period, both inclusive.
    pub fn bounds(self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let day = Duration::days(1);
        let week = today - Duration::days(today.weekday().num_days_from_monday().into());
        let month = today - Duration::days(today.day0().into());
        let quarter = month - Months::new(month.month0() % 3);
        let year = month - Months::new(month.month0());
        match self {
            Period::Today => (today, today),
            Period::Yesterday => (today - day, today - day),
            Period::ThisWeek => (week, week + Duration::days(6)),
            Period::LastWeek => (week - Duration::days(7), week - day),
            Period::ThisMonth => (month, month + Months::new(1) - day),
            Period::LastMonth => (month - Months::new(1), month - day),
            Period::ThisQuarter => (quarter, quarter + Months::new(3) - day),
            Period::LastQuarter => (quarter - Months::new(3), quarter - day),
            Period::ThisYear => (year, year + Months::new(12) - day),
            Period::LastYear => (year - Months::new(12), year - day),
        }
    }
}

/// Filter over stored rows. Date bounds compare the `(year, month, day)` triple
/// lexicographically and are inclusive.
#[derive(Debug, Clone, Default)]
pub struct MetricFilter {
    pub table: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub hour: Option<u32>,
    pub associated_type: Option<String>,
    pub associated_id: Option<String>,
}

impl MetricFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.from = Some(date);
        self.to = Some(date);
        self
    }

    pub fn between_dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.from = Some(start);
        self.to = Some(end);
        self
    }

    pub fn on_hour(self, date: NaiveDate, hour: u32) -> Self {
        let mut filter = self.on_date(date);
        filter.hour = Some(hour);
        filter
    }

    /// Rows in `period`, counted from today in UTC.
    pub fn in_period(self, period: Period) -> Self {
        self.in_period_at(period, Utc::now().date_naive())
    }

    pub fn in_period_at(self, period: Period, today: NaiveDate) -> Self {
        let (start, end) = period.bounds(today);
        self.between_dates(start, end)
    }

    pub fn today(self) -> Self {
        self.in_period(Period::Today)
    }

    pub fn yesterday(self) -> Self {
        self.in_period(Period::Yesterday)
    }

    pub fn this_week(self) -> Self {
        self.in_period(Period::ThisWeek)
    }

    pub fn last_week(self) -> Self {
        self.in_period(Period::LastWeek)
    }

    pub fn this_month(self) -> Self {
        self.in_period(Period::ThisMonth)
    }

    pub fn last_month(self) -> Self {
        self.in_period(Period::LastMonth)
    }

    pub fn this_quarter(self) -> Self {
        self.in_period(Period::ThisQuarter)
    }

    pub fn last_quarter(self) -> Self {
        self.in_period(Period::LastQuarter)
    }

    pub fn this_year(self) -> Self {
        self.in_period(Period::ThisYear)
    }

    pub fn last_year(self) -> Self {
        self.in_period(Period::LastYear)
    }

    /// The hour containing `at`.
    pub fn at_hour(self, at: NaiveDateTime) -> Self {
        self.on_hour(at.date(), at.hour())
    }

    pub fn this_hour(self) -> Self {
        self.at_hour(Utc::now().naive_utc())
    }

    /// The hour before the current one, which is on the previous day right after midnight.
    pub fn last_hour(self) -> Self {
        self.at_hour(Utc::now().naive_utc() - Duration::hours(1))
    }

    /// Rows attached to `measurable`.
    pub fn for_measurable(mut self, measurable: &MeasurableRef) -> Self {
        self.associated_type = Some(measurable.kind.clone());
        self.associated_id = Some(measurable.id.clone());
        self
    }
}

/// A stored aggregate as read back from the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub name: String,
    pub category: Option<String>,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: Option<u32>,
    pub associated_type: Option<String>,
    pub associated_id: Option<String>,
    pub value: i64,
    pub date_at: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    /// Every other column, keyed by column name.
    pub attributes: Attributes,
}

impl MetricRow {
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }
}

/// Table and column names are spliced into SQL, so only plain identifiers are accepted.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    let mut chars = identifier.chars();
    let valid = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(MetricsError::configuration(format!(
            "{:?} is not a valid table or column name",
            identifier
        )))
    }
}
