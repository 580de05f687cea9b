// Copyright (c) 2024 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Canonical pending keys. A key carries every identifying field of a metric except its value,
//! so two metrics that must be summed always map to the same key.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::{MetricsError, Result};
use crate::types::{validate_metric_name, Attributes, Measurable, MeasurableRef, MetricData};

pub trait MeasurableEncoder: Send + Sync {
    /// Encode the identity of a metric into a string key.
    fn encode(&self, metric: &dyn Measurable) -> Result<String>;

    /// Rebuild a metric from its key, carrying the given value.
    fn decode(&self, key: &str, value: i64) -> Result<MetricData>;
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyPayload {
    name: String,
    #[serde(default)]
    category: Option<String>,
    year: i32,
    month: u32,
    day: u32,
    #[serde(default)]
    hour: Option<u32>,
    #[serde(default)]
    store: Option<String>,
    #[serde(default)]
    measurable: Option<String>,
    #[serde(default, deserialize_with = "lenient::scalar_id")]
    measurable_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::attributes")]
    additional: Attributes,
}

/// Encodes keys as RFC 8785 canonical JSON, so field boundaries are unambiguous and
/// the output does not depend on attribute insertion order.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMeasurableEncoder;

impl MeasurableEncoder for JsonMeasurableEncoder {
    fn encode(&self, metric: &dyn Measurable) -> Result<String> {
        validate_metric_name(metric.name())?;
        let measurable = metric.measurable();
        let payload = KeyPayload {
            name: metric.name().to_string(),
            category: metric.category().map(str::to_string),
            year: metric.year(),
            month: metric.month(),
            day: metric.day(),
            hour: metric.hour(),
            store: metric.store().map(str::to_string),
            measurable: measurable.map(|m| m.kind.clone()),
            measurable_id: measurable.map(|m| m.id.clone()),
            additional: metric.additional().clone(),
        };
        let value =
            serde_json::to_value(&payload).map_err(|e| MetricsError::Encode(e.to_string()))?;
        let bytes = serde_json_canonicalizer::to_vec(&value)
            .map_err(|e| MetricsError::Encode(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| MetricsError::Encode(e.to_string()))
    }

    fn decode(&self, key: &str, value: i64) -> Result<MetricData> {
        let payload: KeyPayload = serde_json::from_str(key).map_err(MetricsError::decode)?;

        let date = NaiveDate::from_ymd_opt(payload.year, payload.month, payload.day)
            .ok_or_else(|| {
                MetricsError::decode(format!(
                    "invalid date {}-{}-{}",
                    payload.year, payload.month, payload.day
                ))
            })?
            .and_hms_opt(payload.hour.unwrap_or(0), 0, 0)
            .ok_or_else(|| MetricsError::decode(format!("invalid hour {:?}", payload.hour)))?;

        // Entities are never hydrated here, only referenced.
        let measurable = match (payload.measurable, payload.measurable_id) {
            (Some(kind), Some(id)) => Some(MeasurableRef { kind, id }),
            _ => None,
        };

        Ok(MetricData {
            name: payload.name,
            category: payload.category,
            value,
            date,
            hourly: payload.hour.is_some(),
            measurable,
            store: payload.store,
            additional: payload.additional,
        })
    }
}

/// Keys written by other producers may carry numeric entity ids or an empty `additional`
/// encoded as `null` or `[]`.
mod lenient {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use crate::types::Attributes;

    pub fn scalar_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            Value::Number(n) => Ok(Some(n.to_string())),
            Value::Bool(b) => Ok(Some(b.to_string())),
            other => Err(D::Error::custom(format!(
                "expected a scalar entity id, got {}",
                other
            ))),
        }
    }

    pub fn attributes<'de, D>(deserializer: D) -> Result<Attributes, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(Attributes::new()),
            Value::Array(items) if items.is_empty() => Ok(Attributes::new()),
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(D::Error::custom(format!(
                "expected an attribute object, got {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn encodes_name_category_and_date() {
        let metric = MetricData::new("page_views")
            .with_category("marketing")
            .with_date(date(2025, 10, 12));

        let encoded = JsonMeasurableEncoder.encode(&metric).unwrap();
        let decoded: Value = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded["name"], "page_views");
        assert_eq!(decoded["category"], "marketing");
        assert_eq!(decoded["year"], 2025);
        assert_eq!(decoded["month"], 10);
        assert_eq!(decoded["day"], 12);
        assert_eq!(decoded["hour"], Value::Null);
        assert_eq!(decoded["measurable"], Value::Null);
        assert_eq!(decoded["measurable_id"], Value::Null);
    }

    #[test]
    fn encoding_ignores_value() {
        let day = date(2025, 1, 15);
        let first = MetricData::new("page_views").with_date(day).with_value(1);
        let second = MetricData::new("page_views").with_date(day).with_value(42);

        assert_eq!(
            JsonMeasurableEncoder.encode(&first).unwrap(),
            JsonMeasurableEncoder.encode(&second).unwrap()
        );
    }

    #[test]
    fn encoding_does_not_depend_on_attribute_order() {
        let day = date(2025, 1, 15);
        let mut forward = Attributes::new();
        forward.insert("alpha".to_string(), json!("a"));
        forward.insert("bravo".to_string(), json!(2));
        let mut reversed = Attributes::new();
        reversed.insert("bravo".to_string(), json!(2));
        reversed.insert("alpha".to_string(), json!("a"));

        let a = MetricData::new("clicks")
            .with_date(day)
            .with_additional(forward);
        let b = MetricData::new("clicks")
            .with_date(day)
            .with_additional(reversed);

        assert_eq!(
            JsonMeasurableEncoder.encode(&a).unwrap(),
            JsonMeasurableEncoder.encode(&b).unwrap()
        );
    }

    #[test]
    fn daily_and_hourly_keys_differ() {
        let daily = MetricData::new("api:requests").with_date(date(2025, 10, 19));
        let hourly = daily.clone().with_hourly(true);

        assert_ne!(
            JsonMeasurableEncoder.encode(&daily).unwrap(),
            JsonMeasurableEncoder.encode(&hourly).unwrap()
        );
    }

    #[test]
    fn special_characters_survive() {
        let metric = MetricData::new("page:views/home-page").with_category("category|with|pipes");

        let encoded = JsonMeasurableEncoder.encode(&metric).unwrap();
        let decoded = JsonMeasurableEncoder.decode(&encoded, 1).unwrap();

        assert_eq!(decoded.name, "page:views/home-page");
        assert_eq!(decoded.category.as_deref(), Some("category|with|pipes"));
    }

    #[test]
    fn round_trip_preserves_identity() {
        let original = MetricData::new("api_calls")
            .with_category("external")
            .with_value(5)
            .with_date(date(2025, 6, 20))
            .with_hourly(true)
            .with_store("api_metrics")
            .with_measurable(MeasurableRef::new("user", 999));

        let encoded = JsonMeasurableEncoder.encode(&original).unwrap();
        let decoded = JsonMeasurableEncoder.decode(&encoded, 7).unwrap();

        assert_eq!(decoded.name, original.name);
        assert_eq!(decoded.category, original.category);
        assert_eq!(decoded.value, 7);
        assert_eq!(decoded.year(), 2025);
        assert_eq!(decoded.month(), 6);
        assert_eq!(decoded.day(), 20);
        assert_eq!(decoded.hour(), Some(12));
        assert_eq!(decoded.store.as_deref(), Some("api_metrics"));
        assert_eq!(decoded.measurable, Some(MeasurableRef::new("user", "999")));

        // Re-encoding the decoded metric yields the same key.
        assert_eq!(JsonMeasurableEncoder.encode(&decoded).unwrap(), encoded);
    }

    #[test]
    fn decode_ignores_unknown_fields() {
        let key = json!({
            "name": "page_views",
            "category": "marketing",
            "year": 2025,
            "month": 1,
            "day": 15,
            "measurable": null,
            "measurable_id": null,
            "unknown_field": "should be ignored",
            "another_unknown": 123,
        })
        .to_string();

        let metric = JsonMeasurableEncoder.decode(&key, 1).unwrap();
        assert_eq!(metric.name, "page_views");
        assert_eq!(metric.category.as_deref(), Some("marketing"));
        assert!(!metric.hourly);
        assert!(metric.additional.is_empty());
    }

    #[test]
    fn decode_keeps_unknown_entity_as_reference() {
        let key = json!({
            "name": "logins",
            "year": 2025,
            "month": 1,
            "day": 15,
            "measurable": "no_such_entity",
            "measurable_id": "123",
        })
        .to_string();

        let metric = JsonMeasurableEncoder.decode(&key, 1).unwrap();
        assert_eq!(
            metric.measurable,
            Some(MeasurableRef::new("no_such_entity", "123"))
        );
    }

    #[test]
    fn decode_rejects_malformed_payloads() {
        assert!(matches!(
            JsonMeasurableEncoder.decode("not json", 1),
            Err(MetricsError::Decode(_))
        ));
        assert!(matches!(
            JsonMeasurableEncoder.decode("[1, 2, 3]", 1),
            Err(MetricsError::Decode(_))
        ));
        let bad_date = json!({"name": "x", "year": 2025, "month": 2, "day": 30}).to_string();
        assert!(matches!(
            JsonMeasurableEncoder.decode(&bad_date, 1),
            Err(MetricsError::Decode(_))
        ));
    }

    #[test]
    fn decode_accepts_numeric_ids_and_empty_attributes() {
        let key = json!({
            "name": "logins",
            "year": 2025,
            "month": 1,
            "day": 15,
            "measurable": "user",
            "measurable_id": 42,
            "additional": [],
        })
        .to_string();
        let metric = JsonMeasurableEncoder.decode(&key, 1).unwrap();
        assert_eq!(metric.measurable, Some(MeasurableRef::new("user", "42")));
        assert!(metric.additional.is_empty());

        let key = json!({
            "name": "logins",
            "year": 2025,
            "month": 1,
            "day": 15,
            "additional": null,
        })
        .to_string();
        assert!(JsonMeasurableEncoder.decode(&key, 1).unwrap().additional.is_empty());

        let key = json!({
            "name": "logins",
            "year": 2025,
            "month": 1,
            "day": 15,
            "additional": [1, 2],
        })
        .to_string();
        assert!(matches!(
            JsonMeasurableEncoder.decode(&key, 1),
            Err(MetricsError::Decode(_))
        ));
    }

    #[test]
    fn encode_rejects_empty_names() {
        for name in ["", "   "] {
            assert!(matches!(
                JsonMeasurableEncoder.encode(&MetricData::new(name)),
                Err(MetricsError::InvalidMetric(_))
            ));
        }
    }
}
