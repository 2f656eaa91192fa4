mod generate;
mod jobs;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "flowz-cli")]
#[command(about = "FLOWZ batch generation operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a batch generation job against a store, streaming progress to the log.
    Generate(generate::GenerateArgs),
    /// List recent generation jobs for a store.
    Jobs(jobs::JobsArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = flowz_core::load_app_config_from_env()?;

    match cli.command {
        Commands::Generate(args) => generate::run(&config, args).await,
        Commands::Jobs(args) => jobs::run(&config, args).await,
    }
}
