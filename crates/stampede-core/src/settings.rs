//! Typed views over sections of the merged configuration tree.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CoreError, CoreResult};

/// An explicit `null`, as left behind by an unset `${VAR:-}`, reads as the type's
/// empty value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `notification` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub tester: Option<String>,
    pub department: Option<String>,
    pub dingtalk: DingTalkSettings,
    pub wechat: WeChatSettings,
    pub email: EmailSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DingTalkSettings {
    pub enabled: bool,
    pub webhook: Option<String>,
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WeChatSettings {
    pub enabled: bool,
    pub webhook: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmailSettings {
    pub enabled: bool,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub sender: Option<String>,
    pub password: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub receivers: Vec<String>,
    pub use_ssl: bool,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: None,
            smtp_port: 465,
            sender: None,
            password: None,
            receivers: Vec::new(),
            use_ssl: true,
        }
    }
}

impl EmailSettings {
    /// Host, sender and at least one receiver are required to send anything.
    pub fn is_complete(&self) -> bool {
        self.smtp_host.as_deref().is_some_and(|h| !h.is_empty())
            && self.sender.as_deref().is_some_and(|s| !s.is_empty())
            && !self.receivers.is_empty()
    }
}

/// `influxdb` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InfluxSettings {
    pub host: String,
    pub port: u16,
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(deserialize_with = "null_as_default")]
    pub password: String,
    pub database: String,
}

impl Default for InfluxSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8086,
            username: "root".to_string(),
            password: "root".to_string(),
            database: "stampede".to_string(),
        }
    }
}

impl InfluxSettings {
    /// Base URL of the HTTP API. `host` may already carry a scheme.
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

/// Cadence of the scheduler.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    Interval,
    #[default]
    Daily,
}

/// `scheduler` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerSettings {
    pub mode: ScheduleMode,
    /// Daily run time, `HH:MM` local.
    #[serde(alias = "time")]
    pub at: String,
    /// Minutes between runs in interval mode.
    pub interval: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            mode: ScheduleMode::Daily,
            at: "00:00".to_string(),
            interval: 60,
        }
    }
}

impl SchedulerSettings {
    pub fn validate(&self) -> CoreResult<()> {
        if self.interval == 0 {
            return Err(CoreError::Validation(
                "scheduler.interval must be at least 1 minute".to_string(),
            ));
        }
        parse_clock(&self.at)?;
        Ok(())
    }
}

/// Parse `HH:MM` into hour and minute.
pub fn parse_clock(text: &str) -> CoreResult<(u32, u32)> {
    let invalid = || CoreError::Validation(format!("invalid time of day `{text}`, expected HH:MM"));
    let (hour, minute) = text.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

/// `engine` section: the load engine executable and its leading arguments.
///
/// The runner appends `--headless -u <users> -r <rate> -t <run time> --html <report>
/// --csv <prefix>` and launches the command from the workspace root with
/// `STAMPEDE_PROJECT`, `STAMPEDE_ENV` and `STAMPEDE_ROOT` set. The engine must write
/// the HTML report and `<prefix>_stats.csv`. The defaults expect a Locust install whose
/// `locustfile.py` builds its users from `stampede_hooks::EngineHost::from_env`, which
/// loads the configuration, scenarios and load shape and attaches the metrics listener.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub command: String,
    #[serde(deserialize_with = "null_as_default")]
    pub args: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            command: "locust".to_string(),
            args: vec!["-f".to_string(), "locustfile.py".to_string()],
        }
    }
}

/// `watchdog` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchdogSettings {
    pub enabled: bool,
    pub cpu_threshold: f32,
    pub memory_threshold: f32,
    pub interval_secs: u64,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cpu_threshold: 85.0,
            memory_threshold: 85.0,
            interval_secs: 5,
        }
    }
}

impl WatchdogSettings {
    pub fn validate(&self) -> CoreResult<()> {
        if self.interval_secs == 0 {
            return Err(CoreError::Validation(
                "watchdog.interval_secs must be greater than 0".to_string(),
            ));
        }
        for (name, value) in [
            ("cpu_threshold", self.cpu_threshold),
            ("memory_threshold", self.memory_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(CoreError::Validation(format!(
                    "watchdog.{name} must be between 0 and 100"
                )));
            }
        }
        Ok(())
    }
}
