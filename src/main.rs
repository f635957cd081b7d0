use std::path::PathBuf;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use api_gateway::shutdown_signal;
use hardware_profiler::SystemResources;
use llm_deploy::{memory_report, DeploymentService};
use service_config::ConfigManager;

/// LLM Deploy - serve one causal language model over HTTP
#[derive(Parser, Debug)]
#[command(name = "llm-deploy", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP service (default)
    Serve(ServeArgs),

    /// Report host resources and which models fit
    MemoryCheck {
        /// Model identifier to check, e.g. facebook/opt-1.3b
        model: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "LLM_DEPLOY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to bind
    #[arg(short, long)]
    port: Option<u16>,

    /// Base URL of the inference worker
    #[arg(long)]
    worker_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::MemoryCheck { model }) => run_memory_check(model).await,
        Some(Commands::Serve(args)) => run_serve(args).await,
        None => run_serve(ServeArgs::default()).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = ConfigManager::load(args.config.as_deref())?;
    config.apply_overrides(args.host, args.port, args.worker_url)?;

    let _guard = logging::init(&config.settings().logging)?;

    if let Some(path) = config.source_path() {
        info!(path = %path.display(), "Loaded configuration");
    }
    info!(
        address = %config.settings().server.bind_address(),
        "Starting LLM Deploy"
    );

    let service = DeploymentService::new(config)?;
    service.run(shutdown_signal()).await
}

async fn run_memory_check(model: Option<String>) -> Result<()> {
    let resources = tokio::task::spawn_blocking(SystemResources::probe).await?;
    print!("{}", memory_report(&resources, model.as_deref())?);

    if model.is_none() {
        println!("\nUsage: llm-deploy memory-check <MODEL>");
        println!("   Example: llm-deploy memory-check facebook/opt-1.3b");
    }

    Ok(())
}
