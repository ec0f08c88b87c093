//! Time-series sinks for run metrics.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use stampede_core::InfluxSettings;
use tracing::debug;

use crate::error::SinkError;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Bool(bool),
    Text(String),
}

/// One measurement sample: tags identify the series, fields carry the values.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
}

impl DataPoint {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn field_value(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Render as one InfluxDB line-protocol line with a nanosecond timestamp.
    ///
    /// Empty tag values and non-finite floats are left out, since the protocol
    /// rejects both. Line breaks are written as `\n` / `\r` escapes so a point
    /// always stays on one line. `None` when no field is left to write.
    pub fn to_line_protocol(&self) -> Option<String> {
        let mut line = escape(&self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            if value.is_empty() {
                continue;
            }
            let _ = write!(
                line,
                ",{}={}",
                escape(key, &[',', '=', ' ']),
                escape(value, &[',', '=', ' '])
            );
        }

        let fields: Vec<String> = self
            .fields
            .iter()
            .filter_map(|(key, value)| {
                let rendered = match value {
                    FieldValue::Float(v) if v.is_finite() => v.to_string(),
                    FieldValue::Float(_) => return None,
                    FieldValue::Integer(v) => format!("{v}i"),
                    FieldValue::Bool(v) => v.to_string(),
                    FieldValue::Text(v) => format!("\"{}\"", escape(v, &['"', '\\'])),
                };
                Some(format!("{}={}", escape(key, &[',', '=', ' ']), rendered))
            })
            .collect();
        if fields.is_empty() {
            return None;
        }

        let _ = write!(
            line,
            " {} {}",
            fields.join(","),
            self.timestamp.timestamp_nanos_opt().unwrap_or_default()
        );
        Some(line)
    }
}

fn escape(text: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => {
                if special.contains(&ch) {
                    out.push('\\');
                }
                out.push(ch);
            }
        }
    }
    out
}

/// Destination for metric points.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn write(&self, points: &[DataPoint]) -> Result<(), SinkError>;
}

/// InfluxDB 1.x HTTP writer.
#[derive(Debug, Clone)]
pub struct InfluxSink {
    client: reqwest::Client,
    write_url: String,
    database: String,
    username: String,
    password: String,
}

impl InfluxSink {
    pub fn new(settings: &InfluxSettings) -> Self {
        Self::with_client(reqwest::Client::new(), settings)
    }

    pub fn with_client(client: reqwest::Client, settings: &InfluxSettings) -> Self {
        Self {
            client,
            write_url: format!("{}/write", settings.base_url()),
            database: settings.database.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
        }
    }

    pub fn write_url(&self) -> &str {
        &self.write_url
    }
}

#[async_trait]
impl MetricsSink for InfluxSink {
    async fn write(&self, points: &[DataPoint]) -> Result<(), SinkError> {
        let lines: Vec<String> = points.iter().filter_map(DataPoint::to_line_protocol).collect();
        if lines.is_empty() {
            return Ok(());
        }
        let body = lines.join("\n");

        let response = self
            .client
            .post(&self.write_url)
            .query(&[("db", self.database.as_str()), ("precision", "ns")])
            .basic_auth(&self.username, Some(&self.password))
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(points = points.len(), "Wrote metric points");
        Ok(())
    }
}

/// Collects points in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    points: Mutex<Vec<DataPoint>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(&self) -> Vec<DataPoint> {
        self.points.lock().clone()
    }

    pub fn measurement(&self, name: &str) -> Vec<DataPoint> {
        self.points
            .lock()
            .iter()
            .filter(|p| p.measurement == name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetricsSink for MemorySink {
    async fn write(&self, points: &[DataPoint]) -> Result<(), SinkError> {
        self.points.lock().extend_from_slice(points);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 5).unwrap()
    }

    #[test]
    fn test_line_protocol_shape() {
        let point = DataPoint::new("stampede_requests")
            .tag("host", "runner-1")
            .tag("method", "GET")
            .field("response_time", FieldValue::Float(12.5))
            .field("response_length", FieldValue::Integer(512))
            .at(fixed_time());

        assert_eq!(
            point.to_line_protocol().unwrap(),
            "stampede_requests,host=runner-1,method=GET response_length=512i,response_time=12.5 1700000000000000005"
        );
    }

    #[test]
    fn test_escaping() {
        let point = DataPoint::new("my measurement")
            .tag("name", "/api/items?a=1, b")
            .field("note", FieldValue::Text("say \"hi\"".to_string()))
            .at(fixed_time());

        assert_eq!(
            point.to_line_protocol().unwrap(),
            "my\\ measurement,name=/api/items?a\\=1\\,\\ b note=\"say \\\"hi\\\"\" 1700000000000000005"
        );
    }

    #[test]
    fn test_empty_tags_and_nan_are_dropped() {
        let point = DataPoint::new("m")
            .tag("exception", "")
            .field("a", FieldValue::Float(f64::NAN))
            .field("b", FieldValue::Bool(true))
            .at(fixed_time());
        assert_eq!(point.to_line_protocol().as_deref(), Some("m b=true 1700000000000000005"));
    }

    #[test]
    fn test_line_breaks_stay_on_one_line() {
        let point = DataPoint::new("stampede_requests")
            .tag("exception", "HTTPError: 500\nbody: oops\r\n")
            .field("fail", FieldValue::Integer(1))
            .field("detail", FieldValue::Text("first\nsecond".to_string()))
            .at(fixed_time());

        let line = point.to_line_protocol().unwrap();
        assert!(!line.contains('\n'));
        assert!(!line.contains('\r'));
        assert_eq!(
            line,
            "stampede_requests,exception=HTTPError:\\ 500\\nbody:\\ oops\\r\\n \
             detail=\"first\\nsecond\",fail=1i 1700000000000000005"
        );
    }

    #[test]
    fn test_point_without_fields_is_skipped() {
        let point = DataPoint::new("m")
            .tag("host", "runner-1")
            .field("a", FieldValue::Float(f64::INFINITY));
        assert!(point.to_line_protocol().is_none());
    }

    #[tokio::test]
    async fn test_memory_sink_collects() {
        let sink = MemorySink::new();
        sink.write(&[DataPoint::new("a"), DataPoint::new("b")]).await.unwrap();
        assert_eq!(sink.points().len(), 2);
        assert_eq!(sink.measurement("b").len(), 1);
    }

    #[test]
    fn test_write_url_from_settings() {
        let sink = InfluxSink::new(&InfluxSettings::default());
        assert_eq!(sink.write_url(), "http://localhost:8086/write");
    }
}
