// Metrics listener driven through a run lifecycle.

use std::sync::Arc;
use std::time::Duration;

use stampede_core::{RequestEvent, RunLifecycle};
use stampede_hooks::{
    FieldValue, MemorySink, MetricsListener, MetricsSink, REQUESTS_MEASUREMENT, USERS_MEASUREMENT,
};

fn lifecycle_with(sink: Arc<MemorySink>) -> RunLifecycle {
    let mut lifecycle = RunLifecycle::new();
    let sink: Arc<dyn MetricsSink> = sink;
    lifecycle.register(Arc::new(MetricsListener::new(sink, "runner-1")));
    lifecycle
}

#[tokio::test(start_paused = true)]
async fn test_user_count_sampled_every_second() {
    let sink = Arc::new(MemorySink::new());
    let lifecycle = lifecycle_with(Arc::clone(&sink));

    lifecycle.context().set_user_count(3);
    lifecycle.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    lifecycle.stop().await.unwrap();

    let samples = sink.measurement(USERS_MEASUREMENT);
    assert!(samples.len() >= 2, "expected periodic samples, got {}", samples.len());
    for sample in &samples {
        assert_eq!(sample.tag_value("host"), Some("runner-1"));
        assert_eq!(sample.field_value("user_count"), Some(&FieldValue::Integer(3)));
    }
}

#[tokio::test(start_paused = true)]
async fn test_sampling_stops_with_the_run() {
    let sink = Arc::new(MemorySink::new());
    let lifecycle = lifecycle_with(Arc::clone(&sink));

    lifecycle.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    lifecycle.stop().await.unwrap();

    let after_stop = sink.measurement(USERS_MEASUREMENT).len();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(sink.measurement(USERS_MEASUREMENT).len(), after_stop);
}

#[tokio::test]
async fn test_one_point_per_request() {
    let sink = Arc::new(MemorySink::new());
    let lifecycle = lifecycle_with(Arc::clone(&sink));

    lifecycle.start().await.unwrap();
    lifecycle
        .request(RequestEvent::success("GET", "/admin/me", 18.0, 321))
        .await;
    lifecycle
        .request(RequestEvent::failure("POST", "API: Login", 250.0, "HTTP 401"))
        .await;
    lifecycle.stop().await.unwrap();

    let requests = sink.measurement(REQUESTS_MEASUREMENT);
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tag_value("name"), Some("/admin/me"));
    assert_eq!(requests[1].tag_value("exception"), Some("HTTP 401"));
    assert_eq!(requests[1].field_value("fail"), Some(&FieldValue::Integer(1)));
}

#[tokio::test]
async fn test_requests_before_start_are_not_recorded() {
    let sink = Arc::new(MemorySink::new());
    let lifecycle = lifecycle_with(Arc::clone(&sink));

    lifecycle
        .request(RequestEvent::success("GET", "/early", 1.0, 0))
        .await;
    assert!(sink.measurement(REQUESTS_MEASUREMENT).is_empty());
}
