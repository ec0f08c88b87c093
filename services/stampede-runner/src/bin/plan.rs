use std::path::PathBuf;

use clap::Parser;
use stampede_core::{discover, LoadShape, ProjectLayout, ResolvedConfig, WaitPolicy};
use stampede_hooks::init_logging;

#[derive(Parser, Debug)]
#[command(name = "stampede-plan")]
#[command(about = "Show the actors and load shape a run would use", long_about = None)]
#[command(version)]
struct Cli {
    /// Project name; every project when omitted
    #[arg(short, long, env = "STAMPEDE_PROJECT")]
    project: Option<String>,

    /// Configuration environment
    #[arg(short, long, env = "STAMPEDE_ENV", default_value = "dev")]
    env: String,

    /// Workspace root holding config/ and projects/
    #[arg(long, env = "STAMPEDE_ROOT")]
    root: Option<PathBuf>,
}

fn describe_wait(wait: Option<&WaitPolicy>) -> String {
    match wait {
        Some(WaitPolicy::Constant { seconds }) => format!("constant {seconds}s"),
        Some(WaitPolicy::Between { min, max }) => format!("between {min}s and {max}s"),
        Some(WaitPolicy::ConstantPacing { seconds }) => format!("pacing {seconds}s"),
        Some(WaitPolicy::ConstantThroughput {
            task_runs_per_second,
        }) => format!("{task_runs_per_second} runs/s"),
        None => "none".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    let _guard = init_logging(None)?;

    let layout = ProjectLayout::discover(args.root.as_deref());
    let config = ResolvedConfig::load(layout, args.env);
    let registry = discover(&config, args.project.as_deref());

    println!(
        "Project: {}  Env: {}",
        args.project.as_deref().unwrap_or("<all>"),
        config.env()
    );
    println!("\nActors ({}):", registry.len());
    for actor in registry.iter() {
        let descriptor = &actor.descriptor;
        println!(
            "  {:<24} project={} host={} weight={} wait={} tasks={}",
            actor.name(),
            actor.project,
            descriptor.host.as_deref().unwrap_or("<unset>"),
            descriptor.weight.unwrap_or(1),
            describe_wait(descriptor.wait.as_ref()),
            descriptor.tasks.len()
        );
        println!("  {:<24} source={}", "", actor.source.display());
    }

    let shape = args
        .project
        .as_deref()
        .and_then(|project| LoadShape::from_config(&config.project_view(project)));
    match shape {
        Some(shape) => {
            println!("\nLoad shape ({:.0}s total):", shape.total_duration());
            for stage in shape.stages() {
                println!(
                    "  until {:>6.0}s  users={:<6} spawn_rate={}",
                    stage.duration,
                    stage
                        .users
                        .map(|u| u.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                    stage
                        .spawn_rate
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "?".to_string())
                );
            }
        }
        None => println!("\nLoad shape: none, engine CLI parameters apply"),
    }
    Ok(())
}
