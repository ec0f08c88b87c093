//! Fan-out of run summaries to chat webhooks and email.
//!
//! Each enabled channel is attempted independently; one failing channel never
//! prevents the others from being tried.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use ring::hmac;
use serde_json::json;
use stampede_core::{DingTalkSettings, EmailSettings, NotificationSettings, WeChatSettings};
use tracing::{error, info, warn};
use url::Url;

use crate::archive::archive_report;
use crate::error::NotifyError;
use crate::report::RunReport;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// One delivery target for run summaries.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(
        &self,
        title: &str,
        content: &str,
        attachment: Option<&Path>,
    ) -> Result<(), NotifyError>;
}

fn webhook_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(WEBHOOK_TIMEOUT)
        .build()
        .unwrap_or_default()
}

fn text_message(content: &str) -> serde_json::Value {
    json!({
        "msgtype": "text",
        "text": { "content": content },
    })
}

async fn post_text(
    client: &reqwest::Client,
    channel: &'static str,
    url: &str,
    content: &str,
) -> Result<(), NotifyError> {
    let response = client.post(url).json(&text_message(content)).send().await?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    info!(channel, response = %body, "Webhook notification sent");
    Ok(())
}

/// DingTalk-style robot webhook, optionally signed.
pub struct DingTalkChannel {
    webhook: String,
    secret: Option<String>,
    client: reqwest::Client,
}

impl DingTalkChannel {
    pub fn new(webhook: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            webhook: webhook.into(),
            secret: secret.filter(|s| !s.is_empty()),
            client: webhook_client(),
        }
    }

    /// Built from settings when the channel is enabled and has a webhook.
    pub fn from_settings(settings: &DingTalkSettings) -> Option<Self> {
        if !settings.enabled {
            return None;
        }
        match settings.webhook.as_deref().filter(|w| !w.is_empty()) {
            Some(webhook) => Some(Self::new(webhook, settings.secret.clone())),
            None => {
                warn!("DingTalk is enabled but has no webhook, skipping");
                None
            }
        }
    }

    fn target_url(&self) -> Result<String, NotifyError> {
        match &self.secret {
            Some(secret) => signed_url(
                &self.webhook,
                secret,
                chrono::Utc::now().timestamp_millis(),
            ),
            None => Ok(self.webhook.clone()),
        }
    }
}

/// Append `timestamp` and `sign` to a webhook URL.
///
/// `sign` is `base64(HMAC-SHA256(secret, "<timestamp>\n<secret>"))`, URL-encoded.
pub fn signed_url(webhook: &str, secret: &str, timestamp_ms: i64) -> Result<String, NotifyError> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let string_to_sign = format!("{timestamp_ms}\n{secret}");
    let sign = BASE64.encode(hmac::sign(&key, string_to_sign.as_bytes()).as_ref());

    let mut url = Url::parse(webhook)?;
    url.query_pairs_mut()
        .append_pair("timestamp", &timestamp_ms.to_string())
        .append_pair("sign", &sign);
    Ok(url.into())
}

#[async_trait]
impl NotificationChannel for DingTalkChannel {
    fn name(&self) -> &'static str {
        "dingtalk"
    }

    async fn send(
        &self,
        _title: &str,
        content: &str,
        _attachment: Option<&Path>,
    ) -> Result<(), NotifyError> {
        let url = self.target_url()?;
        post_text(&self.client, self.name(), &url, content).await
    }
}

/// WeCom-style robot webhook.
pub struct WeComChannel {
    webhook: String,
    client: reqwest::Client,
}

impl WeComChannel {
    pub fn new(webhook: impl Into<String>) -> Self {
        Self {
            webhook: webhook.into(),
            client: webhook_client(),
        }
    }

    pub fn from_settings(settings: &WeChatSettings) -> Option<Self> {
        if !settings.enabled {
            return None;
        }
        match settings.webhook.as_deref().filter(|w| !w.is_empty()) {
            Some(webhook) => Some(Self::new(webhook)),
            None => {
                warn!("WeCom is enabled but has no webhook, skipping");
                None
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for WeComChannel {
    fn name(&self) -> &'static str {
        "wecom"
    }

    async fn send(
        &self,
        _title: &str,
        content: &str,
        _attachment: Option<&Path>,
    ) -> Result<(), NotifyError> {
        post_text(&self.client, self.name(), &self.webhook, content).await
    }
}

/// SMTP delivery with the report archive attached.
pub struct EmailChannel {
    settings: EmailSettings,
}

impl EmailChannel {
    pub fn from_settings(settings: &EmailSettings) -> Option<Self> {
        if !settings.enabled {
            return None;
        }
        if !settings.is_complete() {
            warn!("Email is enabled but smtp_host, sender or receivers are missing, skipping");
            return None;
        }
        Some(Self {
            settings: settings.clone(),
        })
    }

    fn build_message(
        &self,
        title: &str,
        content: &str,
        attachment: Option<&Path>,
    ) -> Result<Message, NotifyError> {
        let sender = self.settings.sender.as_deref().unwrap_or_default();
        let mut builder = Message::builder()
            .from(sender.parse::<Mailbox>()?)
            .subject(title);
        for receiver in &self.settings.receivers {
            builder = builder.to(receiver.parse::<Mailbox>()?);
        }

        let mut body = MultiPart::mixed().singlepart(SinglePart::plain(content.to_string()));
        if let Some(path) = attachment {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "report.zip".to_string());
            let bytes = std::fs::read(path)?;
            let content_type = ContentType::parse("application/zip")?;
            body = body.singlepart(Attachment::new(file_name).body(bytes, content_type));
        }
        Ok(builder.multipart(body)?)
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
        let host = self.settings.smtp_host.as_deref().unwrap_or_default();
        let builder = if self.settings.use_ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
        };
        let credentials = Credentials::new(
            self.settings.sender.clone().unwrap_or_default(),
            self.settings.password.clone().unwrap_or_default(),
        );
        Ok(builder
            .port(self.settings.smtp_port)
            .credentials(credentials)
            .build())
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(
        &self,
        title: &str,
        content: &str,
        attachment: Option<&Path>,
    ) -> Result<(), NotifyError> {
        let message = self.build_message(title, content, attachment)?;
        self.transport()?.send(message).await?;
        info!(receivers = self.settings.receivers.len(), "Email notification sent");
        Ok(())
    }
}

/// Sends a [`RunReport`] to every configured channel.
pub struct Notifier {
    settings: NotificationSettings,
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl Notifier {
    /// Channels are built from the enabled, complete sections of `settings`.
    pub fn from_settings(settings: NotificationSettings) -> Self {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();
        if let Some(channel) = DingTalkChannel::from_settings(&settings.dingtalk) {
            channels.push(Box::new(channel));
        }
        if let Some(channel) = WeComChannel::from_settings(&settings.wechat) {
            channels.push(Box::new(channel));
        }
        if let Some(channel) = EmailChannel::from_settings(&settings.email) {
            channels.push(Box::new(channel));
        }
        Self { settings, channels }
    }

    /// Use an explicit channel list.
    pub fn with_channels(
        settings: NotificationSettings,
        channels: Vec<Box<dyn NotificationChannel>>,
    ) -> Self {
        Self { settings, channels }
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Deliver `report`; returns how many channels accepted it.
    pub async fn notify(&self, report: &RunReport) -> usize {
        if !self.settings.enabled {
            info!("Notifications are globally disabled");
            return 0;
        }

        let archive = match archive_report(&report.html_report) {
            Ok(path) => Some(path),
            Err(e) => {
                error!(report = %report.html_report.display(), error = %e, "Failed to archive report");
                None
            }
        };

        let title = report.title();
        let content = report.summary(
            self.settings.tester.as_deref(),
            self.settings.department.as_deref(),
        );

        let mut delivered = 0;
        for channel in &self.channels {
            match channel.send(&title, &content, archive.as_deref()).await {
                Ok(()) => delivered += 1,
                Err(e) => error!(channel = channel.name(), error = %e, "Notification failed"),
            }
        }
        delivered
    }
}
