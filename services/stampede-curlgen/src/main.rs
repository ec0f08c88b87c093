use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

mod curl;
mod error;
mod generate;

use curl::CurlRequest;
use error::GenerateResult;
use generate::{output_path, resolve_input, GeneratedScenario};
use stampede_core::ProjectLayout;

#[derive(Parser, Debug)]
#[command(name = "stampede-curlgen")]
#[command(about = "Generate stampede scenario units from curl commands", long_about = None)]
#[command(version)]
struct Cli {
    /// Curl commands, or files holding one (searched as given, then under the
    /// project's data/curl/ and data/)
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<String>,

    /// Project whose data and scenario directories are used
    #[arg(short, long)]
    project: String,

    /// Output file, or directory when several inputs are given
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Workspace root
    #[arg(long, env = "STAMPEDE_ROOT")]
    root: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let _guard = stampede_hooks::init_logging(None)?;

    let layout = ProjectLayout::discover(cli.root.as_deref());
    let mut failed = 0usize;

    for input in &cli.inputs {
        match generate_one(&layout, &cli, input) {
            Ok(path) => info!(output = %path.display(), "Done"),
            Err(e) => {
                error!(input = %abbreviate(input), error = %e, "Failed to generate scenario");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} of {} inputs failed", cli.inputs.len()).into());
    }
    Ok(())
}

fn generate_one(layout: &ProjectLayout, cli: &Cli, input: &str) -> GenerateResult<PathBuf> {
    let command = resolve_input(layout, &cli.project, input)?;
    let generated = GeneratedScenario::from_request(CurlRequest::parse(&command)?)?;
    let path = output_path(
        layout,
        &cli.project,
        cli.output.as_deref(),
        cli.inputs.len(),
        Some(&generated.file_name()),
    );
    generated.write_to(&path)?;
    Ok(path)
}

/// Raw commands can be long and carry credentials; log only the start.
fn abbreviate(input: &str) -> String {
    let head: String = input.chars().take(60).collect();
    if head.len() < input.len() {
        format!("{head}...")
    } else {
        head
    }
}
