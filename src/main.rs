//! Lobster Room CLI
//!
//! Serves the agent activity snapshot and accepts lifecycle notifications over HTTP.

use anyhow::Result;
use clap::{Parser, Subcommand};
use lobster_room::{server, ActivityConfig, ServerConfig};
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "lobster-room")]
#[command(about = "Lobster Room - agent activity tracker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the snapshot endpoint and notification ingestion
    Serve {
        /// Bind address (default: DASHBOARD_BIND, or 0.0.0.0 when PORT is set)
        #[arg(long, short)]
        bind: Option<String>,
        /// Listen port (default: PORT or DASHBOARD_PORT, else 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },
    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=lobster_room=debug lobster-room serve
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lobster_room=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let config = ActivityConfig::from_env();

    match cli.command {
        Commands::Serve { bind, port } => {
            let mut server_config = ServerConfig::from_env();
            if let Some(bind) = bind {
                server_config.bind = bind;
            }
            if let Some(port) = port {
                server_config.port = port;
            }
            server::serve(config, server_config).await?;
        }
        Commands::Config => {
            let effective = json!({
                "activity": config,
                "allowedAgents": config.allowed_agents(),
                "server": ServerConfig::from_env(),
            });
            println!("{}", serde_json::to_string_pretty(&effective)?);
        }
    }

    Ok(())
}
