//! `es-admin`: administrative commands for an Elasticsearch-compatible cluster.
//!
//! Connection settings come from the environment (and a `.env` file when
//! present), see `es_admin::load_cluster_config`.

use std::env;
use std::process::ExitCode;

use clap::Parser;
use es_admin::commands::{run_command, Command};
use es_admin::{load_cluster_config, AdminError, Dependencies};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "es-admin", version, about)]
struct Args {
    /// Fail unless the cluster reports the configured cluster name
    #[arg(long)]
    verify: bool,

    #[command(subcommand)]
    command: Command,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(args: Args) -> Result<(), AdminError> {
    let config = load_cluster_config()?;
    let Dependencies { repository } = Dependencies::new(config, args.verify).await?;

    let result = run_command(&repository, args.command).await;

    // Always release the pipeline and the client, even when the command failed.
    if let Err(e) = repository.shutdown().await {
        warn!(error = %e, "Shutdown did not complete cleanly");
        if result.is_ok() {
            return Err(e.into());
        }
    }

    println!("{}", result?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "es-admin failed");
            ExitCode::FAILURE
        }
    }
}
