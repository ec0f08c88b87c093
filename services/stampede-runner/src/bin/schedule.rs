use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use stampede_core::{ProjectLayout, ResolvedConfig, ScheduleMode};
use stampede_hooks::init_logging;
use stampede_runner::{
    locate_executor, run_schedule, Cadence, ExecutorJob, RunRequest, ScheduleOverrides,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "stampede-schedule")]
#[command(about = "Run load tests on a fixed cadence", long_about = None)]
#[command(version)]
struct Cli {
    /// Schedule mode; falls back to scheduler.mode in config
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Daily start time, HH:MM
    #[arg(long)]
    at: Option<String>,

    /// Minutes between runs in interval mode
    #[arg(long)]
    interval: Option<u64>,

    /// Project name
    #[arg(short, long)]
    project: String,

    /// Configuration environment
    #[arg(short, long, env = "STAMPEDE_ENV", default_value = "dev")]
    env: String,

    /// Number of concurrent users
    #[arg(short, long, default_value_t = 1)]
    users: u32,

    /// Users spawned per second
    #[arg(short, long, default_value_t = 1.0)]
    rate: f64,

    /// Run time per job
    #[arg(short, long, default_value = "10s")]
    time: String,

    /// Output directory for reports
    #[arg(short, long, default_value = "reports")]
    output: PathBuf,

    /// Workspace root holding config/ and projects/
    #[arg(long, env = "STAMPEDE_ROOT")]
    root: Option<PathBuf>,

    /// Also write a daily-rotated log file into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Interval,
    Daily,
}

impl From<ModeArg> for ScheduleMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Interval => ScheduleMode::Interval,
            ModeArg::Daily => ScheduleMode::Daily,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    let _guard = init_logging(args.log_dir.as_deref())?;

    let layout = ProjectLayout::discover(args.root.as_deref());
    let config = ResolvedConfig::load(layout, args.env.clone());

    let overrides = ScheduleOverrides {
        mode: args.mode.map(ScheduleMode::from),
        at: args.at,
        interval: args.interval,
    };
    let cadence = Cadence::from_settings(&overrides.apply(config.scheduler()))?;

    let request = RunRequest {
        project: args.project,
        env: args.env,
        users: args.users,
        spawn_rate: args.rate,
        run_time: args.time,
        output_dir: args.output,
    };
    request.validate()?;

    let mut job = ExecutorJob::new(locate_executor()?, &request);
    if let Some(root) = &args.root {
        job = job.with_root(root);
    }
    info!(project = %request.project, schedule = %cadence.describe(), "Scheduling runs");
    run_schedule(cadence, job).await;
    Ok(())
}
