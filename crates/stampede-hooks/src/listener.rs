//! Forwards run lifecycle events to a metrics sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use stampede_core::{RequestEvent, RunContext, RunObserver};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::sink::{DataPoint, FieldValue, MetricsSink};

pub const USERS_MEASUREMENT: &str = "stampede_users";
pub const REQUESTS_MEASUREMENT: &str = "stampede_requests";

/// Default period of the concurrent-user sampler.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

struct Sampler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Writes one point per request and samples the user count while a run is active.
pub struct MetricsListener {
    sink: Arc<dyn MetricsSink>,
    host: String,
    interval: Duration,
    sampler: Mutex<Option<Sampler>>,
}

impl MetricsListener {
    pub fn new(sink: Arc<dyn MetricsSink>, host: impl Into<String>) -> Self {
        Self {
            sink,
            host: host.into(),
            interval: SAMPLE_INTERVAL,
            sampler: Mutex::new(None),
        }
    }

    /// Use the machine hostname as the `host` tag.
    pub fn for_this_host(sink: Arc<dyn MetricsSink>) -> Self {
        Self::new(sink, local_hostname())
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn request_point(&self, event: &RequestEvent) -> DataPoint {
        let success = event.is_success();
        let mut point = DataPoint::new(REQUESTS_MEASUREMENT)
            .tag("host", self.host.as_str())
            .tag("method", event.method.as_str())
            .tag("name", event.name.as_str())
            .tag("success", if success { "1" } else { "0" })
            .field("response_time", FieldValue::Float(event.response_time_ms))
            .field(
                "response_length",
                FieldValue::Integer(i64::try_from(event.response_length).unwrap_or(i64::MAX)),
            )
            .field("success", FieldValue::Integer(i64::from(success)))
            .field("fail", FieldValue::Integer(i64::from(!success)));
        if let Some(exception) = event.error.as_deref().filter(|e| !e.is_empty()) {
            point = point.tag("exception", exception);
        }
        point
    }
}

/// Machine hostname, or `unknown` when it cannot be read.
pub fn local_hostname() -> String {
    use sysinfo::{System, SystemExt};
    System::new().host_name().unwrap_or_else(|| "unknown".to_string())
}

async fn sample_users(
    sink: Arc<dyn MetricsSink>,
    host: String,
    ctx: RunContext,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let users = i64::try_from(ctx.user_count()).unwrap_or(i64::MAX);
                let point = DataPoint::new(USERS_MEASUREMENT)
                    .tag("host", host.as_str())
                    .field("user_count", FieldValue::Integer(users));
                if let Err(e) = sink.write(&[point]).await {
                    error!(error = %e, "Failed to write user count");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!("User sampler stopped");
}

#[async_trait]
impl RunObserver for MetricsListener {
    async fn on_test_start(&self, ctx: &RunContext) {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(sample_users(
            Arc::clone(&self.sink),
            self.host.clone(),
            ctx.clone(),
            self.interval,
            rx,
        ));
        let previous = self.sampler.lock().replace(Sampler {
            shutdown: tx,
            handle,
        });
        if let Some(previous) = previous {
            let _ = previous.shutdown.send(true);
        }
    }

    async fn on_request(&self, event: &RequestEvent) {
        let point = self.request_point(event);
        if let Err(e) = self.sink.write(&[point]).await {
            error!(name = %event.name, error = %e, "Failed to write request metric");
        }
    }

    async fn on_test_stop(&self, _ctx: &RunContext) {
        let sampler = self.sampler.lock().take();
        if let Some(sampler) = sampler {
            let _ = sampler.shutdown.send(true);
            if let Err(e) = sampler.handle.await {
                error!(error = %e, "User sampler task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    #[test]
    fn test_request_point_success() {
        let listener = MetricsListener::new(Arc::new(MemorySink::new()), "runner-1");
        let point = listener.request_point(&RequestEvent::success("GET", "/home", 12.5, 2048));

        assert_eq!(point.measurement, REQUESTS_MEASUREMENT);
        assert_eq!(point.tag_value("host"), Some("runner-1"));
        assert_eq!(point.tag_value("success"), Some("1"));
        assert!(point.tag_value("exception").is_none());
        assert_eq!(point.field_value("response_time"), Some(&FieldValue::Float(12.5)));
        assert_eq!(point.field_value("response_length"), Some(&FieldValue::Integer(2048)));
        assert_eq!(point.field_value("fail"), Some(&FieldValue::Integer(0)));
    }

    #[test]
    fn test_request_point_failure() {
        let listener = MetricsListener::new(Arc::new(MemorySink::new()), "runner-1");
        let point =
            listener.request_point(&RequestEvent::failure("POST", "login", 80.0, "HTTP 500"));

        assert_eq!(point.tag_value("success"), Some("0"));
        assert_eq!(point.tag_value("exception"), Some("HTTP 500"));
        assert_eq!(point.field_value("success"), Some(&FieldValue::Integer(0)));
        assert_eq!(point.field_value("fail"), Some(&FieldValue::Integer(1)));
    }
}
