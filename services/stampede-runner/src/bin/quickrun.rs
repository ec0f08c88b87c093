use std::path::{Path, PathBuf};

use clap::Parser;
use stampede_core::ProjectLayout;
use stampede_hooks::init_logging;
use stampede_runner::{latest_html_report, locate_executor, QuickRunParams};
use tokio::process::Command;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "stampede")]
#[command(about = "Quick load-test runner driven by run_config.yaml", long_about = None)]
#[command(version)]
struct Cli {
    /// Project name; defaults to run_config.yaml, then `crm`
    project: Option<String>,

    /// Configuration environment
    env: Option<String>,

    /// Number of concurrent users
    users: Option<String>,

    /// Run time, e.g. 30s or 5m
    duration: Option<String>,

    /// Open the newest HTML report when the run succeeds
    #[arg(long)]
    open: bool,

    /// Workspace root holding run_config.yaml, config/ and projects/
    #[arg(long, env = "STAMPEDE_ROOT")]
    root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    let _guard = init_logging(None)?;

    let layout = ProjectLayout::discover(args.root.as_deref());
    let params = QuickRunParams::load(&layout.run_config_path(), args.project.as_deref())
        .override_with(args.env, args.users, args.duration);

    info!(project = %params.project, env = %params.env, "Starting performance test");

    let executor = locate_executor()?;
    let status = Command::new(&executor)
        .args([
            "-p",
            params.project.as_str(),
            "-e",
            params.env.as_str(),
            "-u",
            params.users.as_str(),
            "-r",
            params.spawn_rate.as_str(),
            "-t",
            params.duration.as_str(),
        ])
        .arg("--root")
        .arg(layout.root())
        .status()
        .await?;

    if !status.success() {
        error!(exit_code = ?status.code(), "Test failed");
        std::process::exit(status.code().unwrap_or(1));
    }
    info!("Test completed successfully");

    let reports = layout.root().join("reports");
    match latest_html_report(&reports) {
        Some(report) => {
            info!(report = %report.display(), "Latest test report");
            if args.open {
                open_report(&report);
            }
        }
        None => warn!(dir = %reports.display(), "No HTML report found"),
    }
    Ok(())
}

fn open_report(report: &Path) {
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "explorer"
    } else {
        "xdg-open"
    };
    if let Err(e) = std::process::Command::new(opener).arg(report).spawn() {
        warn!(opener, error = %e, "Could not open report");
    }
}
