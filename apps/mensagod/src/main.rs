use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use mensagod::config::ServerConfig;
use mensagod::session::Session;
use mensagod::setup::provision_org;
use mensagod::state::ServerState;

#[derive(Parser, Debug)]
#[command(author, version, about = "Mensago server daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision a fresh server: org keys, root keycard entry, admin account
    Setup {
        #[arg(long)]
        config: PathBuf,
    },
    /// Run the server
    Run {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Setup { config } => setup_command(&config).await,
        Commands::Run { config } => run_command(&config).await,
    }
}

async fn setup_command(config_path: &PathBuf) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    std::fs::create_dir_all(&config.top_dir)?;
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let state = ServerState::init(config).await?;
    let result = provision_org(&state).await?;
    println!("Organization provisioned for {}", state.domain);
    println!("Admin workspace ID: {}", result.admin_wid);
    println!("Admin registration code: {}", result.admin_regcode);
    println!("The code is shown once; store it safely.");
    Ok(())
}

async fn run_command(config_path: &PathBuf) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let addr = config.listen_addr()?;
    let state = ServerState::init(config).await?;

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, domain = %state.domain, "server started");

    let accept_state = state.clone();
    let accept_task = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    info!(%peer, "connection accepted");
                    let session = Session::new(accept_state.clone(), stream);
                    tokio::spawn(async move {
                        if let Err(e) = session.run().await {
                            error!(%peer, error = %e, "session ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    });

    signal::ctrl_c().await?;
    info!("server stopping");
    accept_task.abort();
    Ok(())
}
