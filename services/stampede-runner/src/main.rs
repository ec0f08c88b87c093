use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use stampede_core::{ProjectLayout, ResolvedConfig};
use stampede_hooks::init_logging;
use stampede_runner::{RunRequest, TestRunner};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "stampede-exec")]
#[command(about = "Run one load test with reporting and notifications", long_about = None)]
#[command(version)]
struct Cli {
    /// Project name (directory under projects/)
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

    /// Run time, e.g. 10s, 5m, 1h30m
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

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    let guard = init_logging(args.log_dir.as_deref())?;

    let layout = ProjectLayout::discover(args.root.as_deref());
    let config = Arc::new(ResolvedConfig::load(layout, args.env.clone()));

    let request = RunRequest {
        project: args.project,
        env: args.env,
        users: args.users,
        spawn_rate: args.rate,
        run_time: args.time,
        output_dir: args.output,
    };

    let outcome = TestRunner::new(config).run(&request).await?;
    info!(
        report = %outcome.artifacts.html_report.display(),
        notified = outcome.notified,
        "Run complete"
    );

    // Flush the file log before a non-zero exit skips destructors.
    drop(guard);
    match outcome.exit_code {
        Some(0) => Ok(()),
        Some(code) => std::process::exit(code),
        None => Err("engine was terminated by a signal".into()),
    }
}
