//! Periodic re-invocation of the executor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use stampede_core::{parse_clock, ScheduleMode, SchedulerSettings};
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::runner::RunRequest;

/// Name of the executor binary the scheduler launches.
pub const EXECUTOR_BIN: &str = "stampede-exec";

/// Command-line values that take precedence over the `scheduler` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleOverrides {
    pub mode: Option<ScheduleMode>,
    pub at: Option<String>,
    pub interval: Option<u64>,
}

impl ScheduleOverrides {
    pub fn apply(&self, mut settings: SchedulerSettings) -> SchedulerSettings {
        if let Some(mode) = self.mode {
            settings.mode = mode;
        }
        if let Some(at) = &self.at {
            settings.at = at.clone();
        }
        if let Some(interval) = self.interval {
            settings.interval = interval;
        }
        settings
    }
}

/// When the next job should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Every(Duration),
    DailyAt(NaiveTime),
}

impl Cadence {
    pub fn from_settings(settings: &SchedulerSettings) -> RunnerResult<Self> {
        settings.validate()?;
        Ok(match settings.mode {
            ScheduleMode::Interval => Cadence::Every(Duration::from_secs(settings.interval * 60)),
            ScheduleMode::Daily => {
                let (hour, minute) = parse_clock(&settings.at)?;
                let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
                    RunnerError::InvalidParameter(format!("invalid time of day `{}`", settings.at))
                })?;
                Cadence::DailyAt(time)
            }
        })
    }

    /// First start strictly after `now`.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        match self {
            Cadence::Every(period) => {
                now.clone() + chrono::Duration::from_std(*period).unwrap_or(chrono::Duration::zero())
            }
            Cadence::DailyAt(time) => {
                let tz = now.timezone();
                let today = now.date_naive().and_time(*time);
                let mut candidate = tz.from_local_datetime(&today).earliest();
                if candidate.as_ref().map_or(true, |c| c <= now) {
                    candidate = today
                        .checked_add_days(Days::new(1))
                        .and_then(|tomorrow| tz.from_local_datetime(&tomorrow).earliest());
                }
                // A start swallowed by a DST gap slips by a day.
                candidate.unwrap_or_else(|| now.clone() + chrono::Duration::days(1))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Cadence::Every(period) => format!("every {} minutes", period.as_secs() / 60),
            Cadence::DailyAt(time) => format!("daily at {}", time.format("%H:%M")),
        }
    }
}

/// One scheduled invocation of the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorJob {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ExecutorJob {
    pub fn new(program: PathBuf, request: &RunRequest) -> Self {
        let args = vec![
            "-p".to_string(),
            request.project.clone(),
            "-e".to_string(),
            request.env.clone(),
            "-u".to_string(),
            request.users.to_string(),
            "-r".to_string(),
            request.spawn_rate.to_string(),
            "-t".to_string(),
            request.run_time.clone(),
            "-o".to_string(),
            request.output_dir.to_string_lossy().into_owned(),
        ];
        Self { program, args }
    }

    /// Pin the executor to an explicit workspace root.
    pub fn with_root(mut self, root: &Path) -> Self {
        self.args.push("--root".to_string());
        self.args.push(root.to_string_lossy().into_owned());
        self
    }

    /// Run the executor to completion and return its exit code.
    pub async fn run_once(&self) -> RunnerResult<Option<i32>> {
        info!(
            command = %format!("{} {}", self.program.display(), self.args.join(" ")),
            "Running scheduled job"
        );
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .await
            .map_err(|source| RunnerError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;
        if status.success() {
            info!("Job completed successfully");
        } else {
            error!(exit_code = ?status.code(), "Job failed");
        }
        Ok(status.code())
    }
}

/// The executor shipped next to the running binary.
pub fn locate_executor() -> RunnerResult<PathBuf> {
    let current = std::env::current_exe()?;
    let dir = current
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let candidate = dir.join(format!("{EXECUTOR_BIN}{}", std::env::consts::EXE_SUFFIX));
    if candidate.is_file() {
        Ok(candidate)
    } else {
        Err(RunnerError::ExecutorMissing(candidate))
    }
}

/// Run `job` on `cadence` until Ctrl-C. Jobs never overlap: each one finishes before
/// the next start is computed.
pub async fn run_schedule(cadence: Cadence, job: ExecutorJob) {
    info!(schedule = %cadence.describe(), "Scheduler started");
    loop {
        let now = Local::now();
        let next = cadence.next_after(&now);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!(next_run = %next.format("%Y-%m-%d %H:%M:%S"), "Waiting for next run");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("Scheduler interrupted");
                return;
            }
        }

        if let Err(e) = job.run_once().await {
            error!(error = %e, "Scheduled job could not be started");
        }
    }
}
