// Notification fan-out against mock webhooks.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stampede_core::{NotificationSettings, RunStats};
use stampede_runner::{
    DingTalkChannel, NotificationChannel, Notifier, NotifyError, RunReport, WeComChannel,
};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn report_in(dir: &TempDir) -> RunReport {
    let html = dir.path().join("crm_dev_20240501_100000.html");
    std::fs::write(&html, "<html/>").unwrap();
    std::fs::write(dir.path().join("crm_dev_20240501_100000_stats.csv"), "Type,Name\n").unwrap();
    RunReport {
        project: "crm".to_string(),
        env: "dev".to_string(),
        host: "https://crm.example.com".to_string(),
        start_time: "2024-05-01 10:00:00".to_string(),
        duration_secs: 12.0,
        users: 5,
        html_report: html,
        stats: RunStats {
            requests: 100,
            ..Default::default()
        },
    }
}

fn enabled() -> NotificationSettings {
    NotificationSettings {
        enabled: true,
        tester: Some("qa-bot".to_string()),
        ..Default::default()
    }
}

/// Records what it was asked to send; fails when told to.
struct Recording {
    fail: bool,
    calls: Arc<AtomicUsize>,
    attachment: Arc<Mutex<Option<PathBuf>>>,
}

#[async_trait]
impl NotificationChannel for Recording {
    fn name(&self) -> &'static str {
        if self.fail {
            "broken"
        } else {
            "recording"
        }
    }

    async fn send(
        &self,
        _title: &str,
        _content: &str,
        attachment: Option<&Path>,
    ) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.attachment.lock().unwrap() = attachment.map(PathBuf::from);
        if self.fail {
            Err(NotifyError::Rejected {
                status: 500,
                body: "boom".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Webhook channels
// ============================================================================

#[tokio::test]
async fn test_dingtalk_signed_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/robot/send"))
        .and(query_param("access_token", "tok"))
        .and(body_partial_json(serde_json::json!({ "msgtype": "text" })))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"errcode":0}"#))
        .expect(1)
        .mount(&server)
        .await;

    let channel = DingTalkChannel::new(
        format!("{}/robot/send?access_token=tok", server.uri()),
        Some("SECret".to_string()),
    );
    channel.send("title", "hello", None).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let keys: Vec<String> = requests[0]
        .url
        .query_pairs()
        .map(|(k, _)| k.into_owned())
        .collect();
    assert_eq!(keys, vec!["access_token", "timestamp", "sign"]);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["text"]["content"], "hello");
}

#[tokio::test]
async fn test_dingtalk_without_secret_is_unsigned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let channel = DingTalkChannel::new(format!("{}/robot/send", server.uri()), Some(String::new()));
    channel.send("title", "hello", None).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].url.query().is_none());
}

#[tokio::test]
async fn test_wecom_rejection_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cgi-bin/webhook/send"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let channel = WeComChannel::new(format!("{}/cgi-bin/webhook/send?key=k", server.uri()));
    match channel.send("title", "hello", None).await {
        Err(NotifyError::Rejected { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "busy");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

// ============================================================================
// Notifier
// ============================================================================

#[tokio::test]
async fn test_disabled_notifier_sends_nothing() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let channel = Recording {
        fail: false,
        calls: Arc::clone(&calls),
        attachment: Arc::default(),
    };
    let notifier = Notifier::with_channels(NotificationSettings::default(), vec![Box::new(channel)]);

    assert_eq!(notifier.notify(&report_in(&dir)).await, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("crm_dev_20240501_100000.zip").exists());
}

#[tokio::test]
async fn test_failing_channel_does_not_block_others() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let attachment = Arc::new(Mutex::new(None));
    let channels: Vec<Box<dyn NotificationChannel>> = vec![
        Box::new(Recording {
            fail: true,
            calls: Arc::clone(&calls),
            attachment: Arc::clone(&attachment),
        }),
        Box::new(Recording {
            fail: false,
            calls: Arc::clone(&calls),
            attachment: Arc::clone(&attachment),
        }),
    ];
    let notifier = Notifier::with_channels(enabled(), channels);

    assert_eq!(notifier.notify(&report_in(&dir)).await, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let archive = dir.path().join("crm_dev_20240501_100000.zip");
    assert!(archive.exists());
    assert_eq!(*attachment.lock().unwrap(), Some(archive));
}

#[tokio::test]
async fn test_configured_webhooks_receive_summary() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wecom"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = enabled();
    settings.wechat.enabled = true;
    settings.wechat.webhook = Some(format!("{}/wecom", server.uri()));

    let dir = TempDir::new().unwrap();
    let notifier = Notifier::from_settings(settings);
    assert_eq!(notifier.notify(&report_in(&dir)).await, 1);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let content = body["text"]["content"].as_str().unwrap();
    assert!(content.contains("Tester: qa-bot"));
    assert!(content.contains("• Requests: 100"));
}
