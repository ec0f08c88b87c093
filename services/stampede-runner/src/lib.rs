//! Run orchestration: launching the load engine, summarising its exports,
//! notifying channels and scheduling repeat runs.

pub mod archive;
pub mod error;
pub mod notifier;
pub mod report;
pub mod run_config;
pub mod runner;
pub mod scheduler;

pub use archive::{archive_report, collect_artifacts};
pub use error::{NotifyError, RunnerError, RunnerResult};
pub use notifier::{
    signed_url, DingTalkChannel, EmailChannel, NotificationChannel, Notifier, WeComChannel,
};
pub use report::{latest_html_report, RunReport};
pub use run_config::QuickRunParams;
pub use runner::{
    parse_run_time, EngineInvocation, RunArtifacts, RunOutcome, RunRequest, TestRunner,
};
pub use scheduler::{locate_executor, run_schedule, Cadence, ExecutorJob, ScheduleOverrides};
