// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde_json::Value;
use tracing::{debug, info};

use super::{validate_identifier, MetricFilter, MetricRow, MetricStore, TableSchema};
use crate::errors::{MetricsError, Result};
use crate::types::{
    is_reserved_attribute, validate_metric_name, Attributes, Measurable, MetricData,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed metric rows.
///
/// Every upsert runs in a `BEGIN IMMEDIATE` transaction, so concurrent writers (in this process
/// or in another one sharing the database file) serialize on the find-or-create and increment.
#[derive(Clone)]
pub struct SqliteMetricStore {
    conn: Arc<Mutex<Connection>>,
    default_table: String,
}

impl SqliteMetricStore {
    /// Open or create the database at `path`. Metrics without a store override go to
    /// `default_table`.
    pub fn open(path: impl AsRef<Path>, default_table: impl Into<String>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::with_connection(conn, default_table)
    }

    pub fn open_in_memory(default_table: impl Into<String>) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, default_table)
    }

    fn with_connection(conn: Connection, default_table: impl Into<String>) -> Result<Self> {
        let default_table = default_table.into();
        validate_identifier(&default_table)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            default_table,
        })
    }

    pub fn default_table(&self) -> &str {
        &self.default_table
    }

    /// Create a metrics table and its indexes if they do not exist yet.
    pub fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let ddl = table_ddl(schema)?;
        self.conn.lock().execute_batch(&ddl)?;
        info!("Metrics table {} is ready", schema.name);
        Ok(())
    }

    /// Stored rows matching `filter`, from the filter's table or the default one.
    pub fn rows(&self, filter: &MetricFilter) -> Result<Vec<MetricRow>> {
        let table = filter.table.as_deref().unwrap_or(&self.default_table);
        validate_identifier(table)?;

        let mut criteria = vec![];
        let mut params: Vec<SqlValue> = vec![];
        if let Some(name) = &filter.name {
            criteria.push("\"name\" = ?".to_string());
            params.push(SqlValue::Text(name.clone()));
        }
        if let Some(category) = &filter.category {
            criteria.push("\"category\" = ?".to_string());
            params.push(SqlValue::Text(category.clone()));
        }
        if let Some(from) = filter.from {
            criteria.push("(\"year\", \"month\", \"day\") >= (?, ?, ?)".to_string());
            params.extend(date_params(from));
        }
        if let Some(to) = filter.to {
            criteria.push("(\"year\", \"month\", \"day\") <= (?, ?, ?)".to_string());
            params.extend(date_params(to));
        }
        if let Some(hour) = filter.hour {
            criteria.push("\"hour\" = ?".to_string());
            params.push(SqlValue::Integer(hour.into()));
        }
        if let Some(associated_type) = &filter.associated_type {
            criteria.push("\"associated_type\" = ?".to_string());
            params.push(SqlValue::Text(associated_type.clone()));
        }
        if let Some(associated_id) = &filter.associated_id {
            criteria.push("\"associated_id\" = ?".to_string());
            params.push(SqlValue::Text(associated_id.clone()));
        }

        let mut sql = format!("SELECT * FROM \"{}\"", table);
        if !criteria.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&criteria.join(" AND "));
        }
        sql.push_str(" ORDER BY rowid");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let columns = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            let mut values = BTreeMap::new();
            for (i, column) in columns.iter().enumerate() {
                values.insert(column.clone(), json_value(row.get_ref(i)?));
            }
            Ok(values)
        })?;

        let mut result = vec![];
        for row in rows {
            result.push(metric_row(row?));
        }
        Ok(result)
    }
}

#[async_trait]
impl MetricStore for SqliteMetricStore {
    async fn upsert(&self, metrics: &[MetricData]) -> Result<()> {
        let Some(first) = metrics.first() else {
            return Ok(());
        };
        let total: i64 = metrics.iter().map(|m| m.value).sum();
        let table = first
            .store
            .clone()
            .unwrap_or_else(|| self.default_table.clone());
        let identity = identity_attributes(first)?;
        let date_at = first.date.date();

        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            increment(&mut conn, &table, &identity, total, date_at)
        })
        .await?
    }
}

/// Column/value pairs identifying the row of `metric`. Attributes come first and are overridden
/// by the metric's own fields: a reserved attribute name never reaches the store.
fn identity_attributes(metric: &MetricData) -> Result<Vec<(String, SqlValue)>> {
    validate_metric_name(&metric.name)?;
    let mut identity = vec![];
    for (column, value) in metric.additional() {
        if is_reserved_attribute(column) {
            debug!("Dropping reserved attribute {} of metric {}", column, metric.name);
            continue;
        }
        validate_identifier(column)?;
        identity.push((column.clone(), sql_value(value)));
    }

    let measurable = metric.measurable();
    identity.push(("name".to_string(), SqlValue::Text(metric.name.clone())));
    identity.push(("category".to_string(), optional_text(metric.category())));
    identity.push(("year".to_string(), SqlValue::Integer(metric.year().into())));
    identity.push(("month".to_string(), SqlValue::Integer(metric.month().into())));
    identity.push(("day".to_string(), SqlValue::Integer(metric.day().into())));
    if let Some(hour) = metric.hour() {
        identity.push(("hour".to_string(), SqlValue::Integer(hour.into())));
    }
    identity.push((
        "associated_type".to_string(),
        optional_text(measurable.map(|m| m.kind.as_str())),
    ));
    identity.push((
        "associated_id".to_string(),
        optional_text(measurable.map(|m| m.id.as_str())),
    ));
    Ok(identity)
}

fn increment(
    conn: &mut Connection,
    table: &str,
    identity: &[(String, SqlValue)],
    total: i64,
    date_at: NaiveDate,
) -> Result<()> {
    validate_identifier(table)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let columns = table_columns(&tx, table)?;
    if columns.is_empty() {
        return Err(MetricsError::configuration(format!(
            "metrics table {} does not exist",
            table
        )));
    }
    if let Some((missing, _)) = identity.iter().find(|(c, _)| !columns.contains(c)) {
        return Err(MetricsError::configuration(format!(
            "metrics table {} has no column {}",
            table, missing
        )));
    }

    let mut criteria = identity
        .iter()
        .map(|(column, _)| format!("\"{}\" IS ?", column))
        .collect::<Vec<_>>();
    // A daily metric never matches an hourly row of the same day.
    if columns.contains("hour") && !identity.iter().any(|(c, _)| c == "hour") {
        criteria.push("\"hour\" IS NULL".to_string());
    }
    let select = format!(
        "SELECT rowid FROM \"{}\" WHERE {} LIMIT 1",
        table,
        criteria.join(" AND ")
    );
    let existing: Option<i64> = tx
        .query_row(
            &select,
            params_from_iter(identity.iter().map(|(_, v)| v)),
            |row| row.get(0),
        )
        .optional()?;

    let now = SqlValue::Text(timestamp());
    let row_id = match existing {
        Some(row_id) => row_id,
        None => {
            let mut insert_columns = identity.iter().map(|(c, _)| c.as_str()).collect::<Vec<_>>();
            let mut values = identity.iter().map(|(_, v)| v.clone()).collect::<Vec<_>>();
            insert_columns.push("value");
            values.push(SqlValue::Integer(0));
            for (column, value) in [
                ("date_at", SqlValue::Text(date_at.format("%Y-%m-%d").to_string())),
                ("created_at", now.clone()),
                ("updated_at", now.clone()),
            ] {
                if columns.contains(column) {
                    insert_columns.push(column);
                    values.push(value);
                }
            }
            let insert = format!(
                "INSERT INTO \"{}\" ({}) VALUES ({})",
                table,
                insert_columns
                    .iter()
                    .map(|c| format!("\"{}\"", c))
                    .collect::<Vec<_>>()
                    .join(", "),
                vec!["?"; insert_columns.len()].join(", ")
            );
            tx.execute(&insert, params_from_iter(values.iter()))?;
            tx.last_insert_rowid()
        }
    };

    if columns.contains("updated_at") {
        tx.execute(
            &format!(
                "UPDATE \"{}\" SET \"value\" = \"value\" + ?1, \"updated_at\" = ?2 WHERE rowid = ?3",
                table
            ),
            rusqlite::params![total, now, row_id],
        )?;
    } else {
        tx.execute(
            &format!(
                "UPDATE \"{}\" SET \"value\" = \"value\" + ?1 WHERE rowid = ?2",
                table
            ),
            rusqlite::params![total, row_id],
        )?;
    }

    tx.commit()?;
    debug!("Added {} to row {} of {}", total, row_id, table);
    Ok(())
}

fn table_columns(tx: &Transaction<'_>, table: &str) -> Result<HashSet<String>> {
    let mut stmt = tx.prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(columns)
}

fn table_ddl(schema: &TableSchema) -> Result<String> {
    let table = &schema.name;
    validate_identifier(table)?;
    for column in &schema.extra_columns {
        validate_identifier(column)?;
        if is_reserved_attribute(column) {
            return Err(MetricsError::configuration(format!(
                "{} is a reserved metric column",
                column
            )));
        }
    }

    let mut columns = vec![
        "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
        "\"name\" TEXT NOT NULL".to_string(),
        "\"category\" TEXT NULL".to_string(),
        "\"associated_type\" TEXT NULL".to_string(),
        "\"associated_id\" TEXT NULL".to_string(),
        "\"year\" INTEGER NOT NULL".to_string(),
        "\"month\" INTEGER NOT NULL".to_string(),
        "\"day\" INTEGER NOT NULL".to_string(),
    ];
    if schema.hourly {
        columns.push("\"hour\" INTEGER NULL".to_string());
    }
    columns.push("\"value\" INTEGER NOT NULL DEFAULT 0".to_string());
    columns.extend(schema.extra_columns.iter().map(|c| format!("\"{}\" NULL", c)));
    columns.push("\"date_at\" TEXT NULL".to_string());
    columns.push("\"created_at\" TEXT NULL".to_string());
    columns.push("\"updated_at\" TEXT NULL".to_string());

    let date_index = if schema.hourly {
        "\"year\", \"month\", \"day\", \"hour\""
    } else {
        "\"year\", \"month\", \"day\""
    };

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (\n    {columns}\n);\n\
         CREATE INDEX IF NOT EXISTS \"{table}_name_index\" ON \"{table}\" (\"name\");\n\
         CREATE INDEX IF NOT EXISTS \"{table}_category_index\" ON \"{table}\" (\"category\");\n\
         CREATE INDEX IF NOT EXISTS \"{table}_associated_index\" ON \"{table}\" (\"associated_type\", \"associated_id\");\n\
         CREATE INDEX IF NOT EXISTS \"{table}_date_index\" ON \"{table}\" ({date_index});\n",
        table = table,
        columns = columns.join(",\n    "),
        date_index = date_index,
    ))
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

fn date_params(date: NaiveDate) -> [SqlValue; 3] {
    use chrono::Datelike;
    [
        SqlValue::Integer(date.year().into()),
        SqlValue::Integer(date.month().into()),
        SqlValue::Integer(date.day().into()),
    ]
}

fn optional_text(value: Option<&str>) -> SqlValue {
    value.map_or(SqlValue::Null, |v| SqlValue::Text(v.to_string()))
}

fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        // Nested values are stored as their JSON text.
        other => SqlValue::Text(other.to_string()),
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn metric_row(mut values: BTreeMap<String, Value>) -> MetricRow {
    let mut text = |column: &str| match values.remove(column) {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    let name = text("name").unwrap_or_default();
    let category = text("category");
    let associated_type = text("associated_type");
    let associated_id = text("associated_id");
    let date_at = text("date_at");
    let created_at = text("created_at");
    let updated_at = text("updated_at");

    let mut integer = |column: &str| values.remove(column).and_then(|v| v.as_i64());
    let year = integer("year").unwrap_or_default() as i32;
    let month = integer("month").unwrap_or_default() as u32;
    let day = integer("day").unwrap_or_default() as u32;
    let hour = integer("hour").map(|h| h as u32);
    let value = integer("value").unwrap_or_default();
    values.remove("id");

    MetricRow {
        name,
        category,
        year,
        month,
        day,
        hour,
        associated_type,
        associated_id,
        value,
        date_at,
        created_at,
        updated_at,
        attributes: values.into_iter().collect::<Attributes>(),
    }
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::store::Period;
    use crate::test_env::{date_time, memory_store, memory_store_with};
    use crate::types::MeasurableRef;

    #[tokio::test]
    async fn creates_then_increments() {
        let store = memory_store();
        let metric = MetricData::new("page_views").with_date(date_time(2025, 1, 15, 10));

        store.upsert(&[metric.clone().with_value(5)]).await.unwrap();
        let rows = store.rows(&MetricFilter::new()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 5);
        assert_eq!(rows[0].date_at.as_deref(), Some("2025-01-15"));
        assert!(rows[0].created_at.is_some());

        store.upsert(&[metric.with_value(3)]).await.unwrap();
        let rows = store.rows(&MetricFilter::new()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 8);
    }

    #[tokio::test]
    async fn sums_a_group() {
        let store = memory_store();
        let metric = MetricData::new("api_calls").with_category("external");
        let group = vec![
            metric.clone().with_value(2),
            metric.clone().with_value(3),
            metric.with_value(10),
        ];

        store.upsert(&group).await.unwrap();

        let rows = store.rows(&MetricFilter::new().named("api_calls")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category.as_deref(), Some("external"));
        assert_eq!(rows[0].value, 15);
    }

    #[tokio::test]
    async fn empty_group_is_a_no_op() {
        let store = memory_store();
        store.upsert(&[]).await.unwrap();
        assert!(store.rows(&MetricFilter::new()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn separates_identities() {
        let store = memory_store();
        let day = date_time(2025, 1, 15, 0);
        let base = MetricData::new("page_views").with_date(day);

        store.upsert(&[base.clone()]).await.unwrap();
        store
            .upsert(&[base.clone().with_category("marketing")])
            .await
            .unwrap();
        store
            .upsert(&[base.clone().with_measurable(MeasurableRef::new("user", 1))])
            .await
            .unwrap();
        store
            .upsert(&[base.clone().with_measurable(MeasurableRef::new("user", 2))])
            .await
            .unwrap();
        store
            .upsert(&[base.with_date(date_time(2025, 1, 16, 0))])
            .await
            .unwrap();

        assert_eq!(store.rows(&MetricFilter::new()).unwrap().len(), 5);
        let user_rows = store
            .rows(&MetricFilter::new())
            .unwrap()
            .into_iter()
            .filter(|r| r.associated_type.as_deref() == Some("user"))
            .map(|r| r.associated_id.unwrap())
            .collect::<Vec<_>>();
        assert_eq!(user_rows, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn filters_by_measurable_and_period() {
        let store = memory_store();
        let user = MeasurableRef::new("user", 7);
        let in_july = MetricData::new("logins").with_date(date_time(2025, 7, 14, 9));
        let in_august = in_july.clone().with_date(date_time(2025, 8, 2, 9));

        store
            .upsert(&[in_july.clone().with_measurable(user.clone())])
            .await
            .unwrap();
        store
            .upsert(&[in_august.clone().with_measurable(user.clone())])
            .await
            .unwrap();
        store
            .upsert(&[in_july.with_measurable(MeasurableRef::new("user", 8))])
            .await
            .unwrap();
        store.upsert(&[in_august]).await.unwrap();

        let rows = store
            .rows(&MetricFilter::new().for_measurable(&user))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.associated_id.as_deref() == Some("7")));

        let today = NaiveDate::from_ymd_opt(2025, 8, 20).unwrap();
        let rows = store
            .rows(
                &MetricFilter::new()
                    .for_measurable(&user)
                    .in_period_at(Period::LastMonth, today),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].month, 7);

        let rows = store
            .rows(&MetricFilter::new().in_period_at(Period::ThisMonth, today))
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn daily_and_hourly_rows_stay_apart() {
        let store = memory_store_with(TableSchema::new("metrics").with_hourly(true));
        let date = date_time(2025, 10, 19, 14);
        let daily = MetricData::new("api:requests").with_date(date);
        let hourly = daily.clone().with_hourly(true);

        store.upsert(&[hourly.clone()]).await.unwrap();
        store.upsert(&[daily.clone()]).await.unwrap();
        store.upsert(&[daily]).await.unwrap();
        store.upsert(&[hourly]).await.unwrap();

        let rows = store.rows(&MetricFilter::new()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].hour, rows[0].value), (Some(14), 2));
        assert_eq!((rows[1].hour, rows[1].value), (None, 2));
    }

    #[tokio::test]
    async fn reserved_attributes_do_not_override_identity() {
        let store = memory_store_with(TableSchema::new("metrics").with_extra_columns(["source"]));
        let mut additional = Attributes::new();
        additional.insert("name".to_string(), json!("forged"));
        additional.insert("value".to_string(), json!(1000));
        additional.insert("year".to_string(), json!(1999));
        additional.insert("source".to_string(), json!("web"));
        let metric = MetricData::new("signups")
            .with_date(date_time(2025, 2, 1, 0))
            .with_additional(additional);

        store.upsert(&[metric]).await.unwrap();

        let rows = store.rows(&MetricFilter::new()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "signups");
        assert_eq!(rows[0].year, 2025);
        assert_eq!(rows[0].value, 1);
        assert_eq!(rows[0].attributes.get("source"), Some(&json!("web")));
    }

    #[tokio::test]
    async fn extra_attributes_are_part_of_the_identity() {
        let store = memory_store_with(TableSchema::new("metrics").with_extra_columns(["source"]));
        let with_source = |source: &str| {
            let mut additional = Attributes::new();
            additional.insert("source".to_string(), json!(source));
            MetricData::new("signups").with_additional(additional)
        };

        store.upsert(&[with_source("web")]).await.unwrap();
        store.upsert(&[with_source("mobile")]).await.unwrap();
        store.upsert(&[with_source("web")]).await.unwrap();

        let rows = store.rows(&MetricFilter::new()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, 2);
        assert_eq!(rows[1].value, 1);
    }

    #[tokio::test]
    async fn store_override_selects_the_table() {
        let store = memory_store();
        store
            .create_table(&TableSchema::new("api_metrics"))
            .unwrap();

        store
            .upsert(&[MetricData::new("api_calls").with_store("api_metrics")])
            .await
            .unwrap();

        assert!(store.rows(&MetricFilter::new()).unwrap().is_empty());
        let rows = store
            .rows(&MetricFilter::new().in_table("api_metrics"))
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn unknown_table_is_a_configuration_error() {
        let store = memory_store();
        let result = store
            .upsert(&[MetricData::new("api_calls").with_store("missing_table")])
            .await;
        assert!(matches!(result, Err(MetricsError::Configuration(_))));

        let result = store
            .upsert(&[MetricData::new("api_calls").with_store("bad name")])
            .await;
        assert!(matches!(result, Err(MetricsError::Configuration(_))));
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let store = memory_store();
        let result = store.upsert(&[MetricData::new("")]).await;
        assert!(matches!(result, Err(MetricsError::InvalidMetric(_))));
        assert!(store.rows(&MetricFilter::new()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn hourly_metric_needs_an_hour_column() {
        let store = memory_store();
        let result = store
            .upsert(&[MetricData::new("api:requests").with_hourly(true)])
            .await;
        assert!(matches!(result, Err(MetricsError::Configuration(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_do_not_lose_increments() {
        let store = Arc::new(memory_store());
        let metric = MetricData::new("page_views").with_date(date_time(2025, 5, 5, 0));

        let handles = (0..2)
            .map(|_| {
                let store = store.clone();
                let metric = metric.clone();
                tokio::spawn(async move { store.upsert(&[metric]).await })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let rows = store.rows(&MetricFilter::new()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_on_one_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.db");
        let first = SqliteMetricStore::open(&path, "metrics").unwrap();
        first.create_table(&TableSchema::new("metrics")).unwrap();
        let second = SqliteMetricStore::open(&path, "metrics").unwrap();
        let metric = MetricData::new("page_views").with_date(date_time(2025, 5, 5, 0));

        let handles = [first.clone(), second]
            .into_iter()
            .flat_map(|store| {
                let metric = metric.clone();
                (0..10).map(move |_| {
                    let store = store.clone();
                    let metric = metric.clone();
                    tokio::spawn(async move { store.upsert(&[metric]).await })
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let rows = first.rows(&MetricFilter::new()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 20);
    }

    #[tokio::test]
    async fn date_range_filters() {
        let store = memory_store();
        for (day, value) in [(1, 1), (15, 2), (31, 4)] {
            store
                .upsert(&[MetricData::new("orders")
                    .with_date(date_time(2025, 1, day, 0))
                    .with_value(value)])
                .await
                .unwrap();
        }
        store
            .upsert(&[MetricData::new("orders")
                .with_date(date_time(2025, 2, 1, 0))
                .with_value(8)])
            .await
            .unwrap();

        let january = store
            .rows(&MetricFilter::new().between_dates(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            ))
            .unwrap();
        assert_eq!(january.iter().map(|r| r.value).sum::<i64>(), 7);

        let on_date = store
            .rows(&MetricFilter::new().on_date(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()))
            .unwrap();
        assert_eq!(on_date.len(), 1);
        assert_eq!(on_date[0].value, 2);
    }

    #[tokio::test]
    async fn hour_filter() {
        let store = memory_store_with(TableSchema::new("metrics").with_hourly(true));
        for (hour, value) in [(13, 3), (14, 5)] {
            store
                .upsert(&[MetricData::new("api:requests")
                    .with_date(date_time(2025, 10, 19, hour))
                    .with_hourly(true)
                    .with_value(value)])
                .await
                .unwrap();
        }

        let rows = store
            .rows(
                &MetricFilter::new()
                    .on_hour(NaiveDate::from_ymd_opt(2025, 10, 19).unwrap(), 14),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 5);
    }

    #[test]
    fn ddl_rejects_reserved_extra_columns() {
        let schema = TableSchema::new("metrics").with_extra_columns(["value"]);
        assert!(matches!(
            table_ddl(&schema),
            Err(MetricsError::Configuration(_))
        ));
    }
}
