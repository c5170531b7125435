//! `coordinator-node`: the binary crate. Parses CLI args, loads
//! configuration, constructs every component, starts the jsonrpsee HTTP
//! server and the observability listener, spawns the background
//! sweepers, and blocks on a shutdown signal. No business logic lives
//! here.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

mod context;
mod keygen;
mod observability;
mod sweepers;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use coordinator_config::CoordinatorConfig;
use coordinator_tracing::LayerConfig;

#[derive(Debug, Parser)]
#[command(name = "coordinator-node", version, about = "Decentralized compute coordinator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs the coordinator, serving the RPC and observability listeners
    /// until a shutdown signal arrives.
    Serve {
        /// Path to the coordinator's TOML config file.
        #[arg(long, default_value = "coordinator.toml")]
        config: PathBuf,
    },
    /// Generates a new Ed25519 signing key seed file.
    Keygen {
        /// Path the new key seed is written to.
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Keygen { out } => {
            let _guard = coordinator_tracing::init(&LayerConfig::default());
            match keygen::generate(&out) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    tracing::error!(error = %err, "keygen failed");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Serve { config } => {
            let _guard = coordinator_tracing::init(&LayerConfig::default());
            let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    tracing::error!(error = %err, "failed to start the tokio runtime");
                    return ExitCode::FAILURE;
                }
            };
            match runtime.block_on(serve(config)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    tracing::error!(error = %err, "coordinator exited with an error");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

async fn serve(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = CoordinatorConfig::load(&config_path)?;
    let metrics_handle = coordinator_metrics::install_recorder()?;

    let ctx = context::build(config.clone())?;

    let listen_addr: std::net::SocketAddr = config.rpc.listen_addr.parse()?;
    let observability_addr: std::net::SocketAddr = config.rpc.observability_listen_addr.parse()?;

    let rpc_module = coordinator_rpc::build_rpc_module(ctx.rpc.clone())?;
    let rpc_server = jsonrpsee::server::ServerBuilder::default().build(listen_addr).await?;
    let rpc_handle = rpc_server.start(rpc_module);
    tracing::info!(%listen_addr, "rpc listener bound");

    let sweeper_handles = sweepers::spawn_all(&ctx);
    let observability_task = tokio::spawn(observability::serve(observability_addr, ctx, metrics_handle));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    let _ = rpc_handle.stop();
    observability_task.abort();
    for handle in sweeper_handles {
        handle.abort();
    }
    Ok(())
}
