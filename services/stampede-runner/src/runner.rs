//! Launches the load engine for one run and reports on the result.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use stampede_core::{
    EngineSettings, ResolvedConfig, RunStats, ENV_ENV_VAR, PROJECT_ENV_VAR, ROOT_ENV_VAR,
};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::notifier::Notifier;
use crate::report::RunReport;

pub const DEFAULT_USERS: u32 = 1;
pub const DEFAULT_SPAWN_RATE: f64 = 1.0;
pub const DEFAULT_RUN_TIME: &str = "10s";
pub const DEFAULT_OUTPUT_DIR: &str = "reports";

const UNKNOWN_HOST: &str = "Unknown";

/// Parameters of one engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub project: String,
    pub env: String,
    pub users: u32,
    pub spawn_rate: f64,
    /// Engine time span, e.g. `30s`, `5m`, `1h30m`.
    pub run_time: String,
    pub output_dir: PathBuf,
}

impl RunRequest {
    pub fn new(project: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            env: env.into(),
            users: DEFAULT_USERS,
            spawn_rate: DEFAULT_SPAWN_RATE,
            run_time: DEFAULT_RUN_TIME.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }

    pub fn validate(&self) -> RunnerResult<()> {
        if self.project.trim().is_empty() {
            return Err(RunnerError::InvalidParameter(
                "project must not be empty".to_string(),
            ));
        }
        if !self.spawn_rate.is_finite() || self.spawn_rate <= 0.0 {
            return Err(RunnerError::InvalidParameter(format!(
                "spawn rate must be positive, got {}",
                self.spawn_rate
            )));
        }
        parse_run_time(&self.run_time)?;
        Ok(())
    }

    /// Output locations for a run starting at `started`.
    pub fn artifacts(&self, started: DateTime<Local>) -> RunArtifacts {
        let base_name = format!(
            "{}_{}_{}",
            self.project,
            self.env,
            started.format("%Y%m%d_%H%M%S")
        );
        RunArtifacts {
            html_report: self.output_dir.join(format!("{base_name}.html")),
            csv_prefix: self.output_dir.join(&base_name),
            base_name,
        }
    }
}

/// Parse an engine time span such as `90`, `45s`, `5m` or `1h30m`.
pub fn parse_run_time(text: &str) -> RunnerResult<Duration> {
    let invalid = || RunnerError::InvalidParameter(format!("invalid run time `{text}`"));
    let text = text.trim();
    if text.is_empty() {
        return Err(invalid());
    }
    if let Ok(seconds) = text.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    let mut total = 0u64;
    let mut digits = String::new();
    let mut last_unit = 0u8;
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let (rank, factor) = match ch {
            'h' => (1, 3600),
            'm' => (2, 60),
            's' => (3, 1),
            _ => return Err(invalid()),
        };
        if digits.is_empty() || rank <= last_unit {
            return Err(invalid());
        }
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        total = total.saturating_add(value.saturating_mul(factor));
        digits.clear();
        last_unit = rank;
    }
    if !digits.is_empty() {
        return Err(invalid());
    }
    Ok(Duration::from_secs(total))
}

/// Paths the engine writes for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunArtifacts {
    pub base_name: String,
    pub html_report: PathBuf,
    pub csv_prefix: PathBuf,
}

impl RunArtifacts {
    pub fn stats_csv(&self) -> PathBuf {
        let mut name = self.csv_prefix.clone().into_os_string();
        name.push("_stats.csv");
        PathBuf::from(name)
    }
}

/// The engine command line for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl EngineInvocation {
    pub fn build(engine: &EngineSettings, request: &RunRequest, artifacts: &RunArtifacts) -> Self {
        let mut args = engine.args.clone();
        args.extend([
            "--headless".to_string(),
            "-u".to_string(),
            request.users.to_string(),
            "-r".to_string(),
            request.spawn_rate.to_string(),
            "-t".to_string(),
            request.run_time.clone(),
            "--html".to_string(),
            artifacts.html_report.to_string_lossy().into_owned(),
            "--csv".to_string(),
            artifacts.csv_prefix.to_string_lossy().into_owned(),
        ]);
        Self {
            program: engine.command.clone(),
            args,
        }
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What happened during one run.
#[derive(Debug)]
pub struct RunOutcome {
    pub artifacts: RunArtifacts,
    /// Engine exit code; `None` when it was killed by a signal.
    pub exit_code: Option<i32>,
    pub duration: Duration,
    /// Present when the HTML report was produced.
    pub report: Option<RunReport>,
    pub notified: usize,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs the engine for a project and forwards the summary to the notifier.
pub struct TestRunner {
    config: Arc<ResolvedConfig>,
    notifier: Notifier,
}

impl TestRunner {
    pub fn new(config: Arc<ResolvedConfig>) -> Self {
        let notifier = Notifier::from_settings(config.notification());
        Self { config, notifier }
    }

    pub fn with_notifier(config: Arc<ResolvedConfig>, notifier: Notifier) -> Self {
        Self { config, notifier }
    }

    /// Relative output directories are placed under the workspace root, which is
    /// also the engine's working directory.
    fn resolve_output(&self, output_dir: &Path) -> PathBuf {
        if output_dir.is_absolute() {
            output_dir.to_path_buf()
        } else {
            self.config.layout().root().join(output_dir)
        }
    }

    pub async fn run(&self, request: &RunRequest) -> RunnerResult<RunOutcome> {
        request.validate()?;
        info!(project = %request.project, env = %request.env, "Starting test");

        let mut request = request.clone();
        request.output_dir = self.resolve_output(&request.output_dir);
        tokio::fs::create_dir_all(&request.output_dir).await?;

        let started = Local::now();
        let artifacts = request.artifacts(started);
        let invocation = EngineInvocation::build(&self.config.engine(), &request, &artifacts);
        info!(command = %invocation.display(), "Executing engine");

        let clock = Instant::now();
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(self.config.layout().root())
            .env(PROJECT_ENV_VAR, &request.project)
            .env(ENV_ENV_VAR, &request.env)
            .env(ROOT_ENV_VAR, self.config.layout().root())
            .output()
            .await
            .map_err(|source| RunnerError::Engine {
                program: invocation.program.clone(),
                source,
            })?;
        let duration = clock.elapsed();

        info!(duration = %format!("{:.2} s", duration.as_secs_f64()), "Test execution finished");
        let exit_code = output.status.code();
        if output.status.success() {
            info!("{}", String::from_utf8_lossy(&output.stdout));
        } else {
            warn!(exit_code = ?exit_code, "Engine exited with failure");
            error!("{}", String::from_utf8_lossy(&output.stderr));
        }

        let mut outcome = RunOutcome {
            artifacts,
            exit_code,
            duration,
            report: None,
            notified: 0,
        };

        if !outcome.artifacts.html_report.exists() {
            error!(report = %outcome.artifacts.html_report.display(), "Report file was not generated");
            return Ok(outcome);
        }
        info!(report = %outcome.artifacts.html_report.display(), "Report generated");

        let stats = RunStats::from_csv_path(&outcome.artifacts.stats_csv());
        debug!(?stats, "Parsed stats");

        let host = self
            .config
            .project_view(&request.project)
            .get_str("host")
            .unwrap_or(UNKNOWN_HOST)
            .to_string();
        let report = RunReport {
            project: request.project.clone(),
            env: request.env.clone(),
            host,
            start_time: started.format("%Y-%m-%d %H:%M:%S").to_string(),
            duration_secs: duration.as_secs_f64(),
            users: request.users,
            html_report: outcome.artifacts.html_report.clone(),
            stats,
        };

        outcome.notified = self.notifier.notify(&report).await;
        outcome.report = Some(report);
        Ok(outcome)
    }
}
