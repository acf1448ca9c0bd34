//! Service entrypoint: configuration, dependency handles, HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mentord::Config;
use mentord::behavior::{CesCalculator, DataFusionEngine};
use mentord::sandbox::SandboxExecutor;
use mentord::server::{self, AppState};
use mentord::session::SessionCodeStore;
use mentord::tutor::{LlmClient, PedagogicalFirewall};

#[derive(Debug, Parser)]
#[command(name = "mentord", about = "Pedagogical coding backend", version)]
struct Cli {
    /// Address to bind the API server to (overrides BIND_ADDR).
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let bind_addr = cli.bind.unwrap_or(config.server.bind_addr);

    // Dependency handles are explicit and optional: a missing container
    // runtime or API key degrades the matching endpoints, never the process.
    let executor = match SandboxExecutor::connect(config.sandbox.clone()).await {
        Ok(executor) => Some(Arc::new(executor)),
        Err(e) => {
            tracing::warn!(error = %e, "sandbox unavailable; execution endpoints degraded");
            None
        }
    };

    let code_store = Arc::new(SessionCodeStore::new());

    let llm = if config.llm.api_key.is_some() {
        match LlmClient::new(config.llm.clone()) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "LLM client unavailable; tutoring endpoints degraded");
                None
            }
        }
    } else {
        tracing::warn!("no LLM API key configured; tutoring endpoints degraded");
        None
    };

    let firewall = llm
        .as_ref()
        .map(|llm| PedagogicalFirewall::new(Arc::clone(llm), Arc::clone(&code_store)));

    let state = Arc::new(AppState {
        executor,
        firewall,
        llm,
        code_store,
        fusion: DataFusionEngine::new(),
        ces: CesCalculator::new(),
    });

    let app = server::router(state, &config.server.cors_origin);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "mentord listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("failed to install ctrl-c handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
