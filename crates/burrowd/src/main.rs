//! burrowd — the burrow daemon.
//!
//! One binary, two modes:
//!
//! - **orchestrator** — public control API, wake pipeline, idle controller,
//!   drift reconciler, warm-pool manager
//! - **router** — ingress API: event receipt, address cache, wake-on-miss,
//!   reply forwarding
//!
//! # Usage
//!
//! ```text
//! burrowd orchestrator
//! burrowd router
//! ```
//!
//! All configuration comes from the environment (see burrow-core::config).

mod orchestrator;
mod router_mode;

use clap::{Parser, Subcommand};

use burrow_core::config::{OrchestratorConfig, RouterConfig};

#[derive(Parser)]
#[command(name = "burrowd", about = "burrow tenant lifecycle daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestrator: control API plus background controllers.
    Orchestrator,
    /// Run the ingress router.
    Router,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,burrowd=debug,burrow=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Orchestrator => orchestrator::run(OrchestratorConfig::from_env()).await,
        Command::Router => router_mode::run(RouterConfig::from_env()).await,
    }
}

/// Resolve on Ctrl-C or SIGTERM (the platform's stop signal).
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("install ctrl-c handler");
    };
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install sigterm handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
