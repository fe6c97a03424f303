//! Parley server entry point.
//!
//! Binary name: `parley`
//!
//! Loads configuration, initializes tracing, the database and the chat
//! service, then runs the requested command.

mod cli;
mod http;
mod state;

use clap::Parser;

use cli::{Cli, Commands};
use parley_infra::config::load_config;
use parley_infra::llm::build_model_registry;
use parley_observe::tracing_setup::{init_tracing, shutdown_tracing};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config).await;

    init_tracing(&config.logging, cli.verbose)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = match cli.command {
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            serve(&config).await
        }
        Commands::Models => list_models(&config),
    };

    shutdown_tracing();
    result
}

async fn serve(config: &parley_types::config::AppConfig) -> anyhow::Result<()> {
    let state = AppState::init(config).await?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, models = state.chat_service.models().len(), "Parley API listening");

    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn list_models(config: &parley_types::config::AppConfig) -> anyhow::Result<()> {
    let registry = build_model_registry(config)?;
    for info in registry.list() {
        let max_output = info
            .max_output_tokens
            .map_or_else(|| "-".to_string(), |m| m.to_string());
        println!(
            "{}\t{}\tcontext={}\tmax_output={}",
            info.id, info.provider, info.context_length, max_output
        );
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
