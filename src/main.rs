//! OMC CLI entry point.
//!
//! The `hook` subcommand is the host-facing boundary: one JSON object on
//! stdin, one JSON object on stdout, exit code 0 regardless of outcome.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;

use omc::domain::models::{RoutingContext, TaskSpec};
use omc::infrastructure::config::ConfigLoader;
use omc::infrastructure::logging::init_tracing;
use omc::infrastructure::worktree::Worktree;
use omc::services::hooks::HookDispatcher;
use omc::services::routing::TaskRouter;
use omc::services::swarm::{SwarmCoordinator, SwarmStartConfig};

#[derive(Parser)]
#[command(name = "omc", about = "Multi-agent orchestration substrate", version)]
struct Cli {
    /// Emit machine-readable JSON where applicable
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one hook event from stdin and reply on stdout
    Hook {
        /// Hook type, e.g. `pre-tool-use`
        hook_type: String,
    },
    /// Swarm control
    #[command(subcommand)]
    Swarm(SwarmCommands),
    /// Print the routing decision for a prompt
    Route {
        /// The task prompt to classify
        prompt: String,
    },
}

#[derive(Subcommand)]
enum SwarmCommands {
    /// Start a swarm over a task list
    Start {
        #[arg(long, default_value_t = 3)]
        agents: usize,
        /// Task descriptions; may be given multiple times
        #[arg(long = "task")]
        tasks: Vec<String>,
    },
    /// Show pool status
    Status,
    /// Append tasks to a running swarm
    Add {
        #[arg(long = "task", required = true)]
        tasks: Vec<String>,
    },
    /// Cancel the active swarm (the database is preserved)
    Cancel,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The hook path must never fail the host: any internal error still
    // prints `{"continue": true}` and exits 0.
    if let Commands::Hook { hook_type } = &cli.command {
        run_hook(hook_type);
        return Ok(());
    }

    let worktree = Worktree::discover().context("not inside a version-controlled worktree")?;
    let config = ConfigLoader::load(worktree.root()).context("failed to load configuration")?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Hook { .. } => unreachable!("hook handled above"),
        Commands::Swarm(swarm_command) => run_swarm(swarm_command, worktree, cli.json).await,
        Commands::Route { prompt } => {
            let router = TaskRouter::new(config.routing);
            let decision = router.route_task(&prompt, &RoutingContext::default());
            println!("{}", serde_json::to_string_pretty(&decision)?);
            Ok(())
        }
    }
}

fn run_hook(hook_type: &str) {
    let response = std::panic::catch_unwind(|| {
        let mut raw = String::new();
        let _ = std::io::stdin().read_to_string(&mut raw);
        let payload = serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null);

        match Worktree::discover() {
            Ok(worktree) => HookDispatcher::new(worktree).process_hook(hook_type, payload),
            Err(_) => omc::domain::models::HookResponse::proceed(),
        }
    })
    .unwrap_or_else(|_| omc::domain::models::HookResponse::proceed());

    match serde_json::to_string(&response) {
        Ok(json) => println!("{json}"),
        Err(_) => println!("{{\"continue\": true}}"),
    }
}

async fn run_swarm(command: SwarmCommands, worktree: Worktree, json: bool) -> Result<()> {
    match command {
        SwarmCommands::Start { agents, tasks } => {
            let specs: Vec<TaskSpec> = tasks.into_iter().map(TaskSpec::new).collect();
            let coordinator = SwarmCoordinator::start(
                worktree,
                SwarmStartConfig {
                    agent_count: agents,
                    tasks: specs,
                    lease_timeout: None,
                },
            )
            .await?;
            let stats = coordinator.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("swarm started: {} pending task(s), {agents} agent(s)", stats.pending);
            }
            Ok(())
        }
        SwarmCommands::Status => {
            let coordinator = SwarmCoordinator::connect(worktree).await?;
            let stats = coordinator.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "pending {} / claimed {} / done {} / failed {}",
                    stats.pending, stats.claimed, stats.done, stats.failed
                );
                if let Some(oldest) = &stats.oldest_pending {
                    println!("oldest pending: {oldest}");
                }
            }
            Ok(())
        }
        SwarmCommands::Add { tasks } => {
            let coordinator = SwarmCoordinator::connect(worktree).await?;
            let specs: Vec<TaskSpec> = tasks.into_iter().map(TaskSpec::new).collect();
            let ids = coordinator.add_tasks(&specs).await?;
            println!("added {}", ids.join(", "));
            Ok(())
        }
        SwarmCommands::Cancel => {
            let coordinator = SwarmCoordinator::connect(worktree).await?;
            coordinator.cancel().await?;
            println!("swarm cancelled; database preserved for postmortem");
            Ok(())
        }
    }
}
