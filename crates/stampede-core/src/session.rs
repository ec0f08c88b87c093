//! Actor login with bounded retries.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

fn default_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

/// How an actor obtains its session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginSpec {
    /// Absolute URL, or a path joined onto the actor host.
    pub url: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl LoginSpec {
    pub fn new(url: impl Into<String>, payload: Value) -> Self {
        Self {
            url: url.into(),
            payload,
            headers: BTreeMap::new(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }

    /// Target URL, joining a relative `url` onto `host`.
    pub fn resolve_url(&self, host: Option<&str>) -> String {
        if self.url.starts_with("http://") || self.url.starts_with("https://") {
            return self.url.clone();
        }
        match host {
            Some(host) => format!(
                "{}/{}",
                host.trim_end_matches('/'),
                self.url.trim_start_matches('/')
            ),
            None => self.url.clone(),
        }
    }
}

/// Result of a login attempt sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Token found in the response.
    Authenticated(String),
    /// The endpoint answered 200 but no token could be read. Not retried.
    NoToken,
    /// Every attempt failed; the actor should stop itself.
    Exhausted,
}

impl LoginOutcome {
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Authenticated(token) => Some(token),
            _ => None,
        }
    }

    pub fn should_stop(&self) -> bool {
        matches!(self, Self::Exhausted)
    }
}

/// Read the token from `data` (a string) or `data.token` / `data.access_token`.
pub fn extract_token(body: &Value) -> Option<String> {
    let token = match body.get("data")? {
        Value::String(token) => Some(token.clone()),
        Value::Object(data) => data
            .get("token")
            .or_else(|| data.get("access_token"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    token.filter(|token| !token.is_empty())
}

/// POST the login payload until a 200 arrives or the retries run out.
pub async fn login(client: &reqwest::Client, spec: &LoginSpec, host: Option<&str>) -> LoginOutcome {
    let url = spec.resolve_url(host);
    let attempts = spec.retries.max(1);

    for attempt in 1..=attempts {
        let mut request = client.post(&url).json(&spec.payload);
        for (name, value) in &spec.headers {
            request = request.header(name, value);
        }

        match request.send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                return match response.json::<Value>().await {
                    Ok(body) => match extract_token(&body) {
                        Some(token) => {
                            let preview: String = token.chars().take(10).collect();
                            info!(url = %url, token = %preview, "Login successful");
                            LoginOutcome::Authenticated(token)
                        }
                        None => {
                            warn!(url = %url, body = %body, "Login succeeded but no token in response");
                            LoginOutcome::NoToken
                        }
                    },
                    Err(e) => {
                        error!(url = %url, error = %e, "Failed to parse login response");
                        LoginOutcome::NoToken
                    }
                };
            }
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                warn!(url = %url, attempt, attempts, status = %status, body = %text, "Login failed");
            }
            Err(e) => {
                warn!(url = %url, attempt, attempts, error = %e, "Login request failed");
            }
        }

        if attempt < attempts {
            tokio::time::sleep(Duration::from_millis(spec.retry_delay_ms)).await;
        }
    }

    error!(url = %url, "All login attempts failed, stopping actor");
    LoginOutcome::Exhausted
}
