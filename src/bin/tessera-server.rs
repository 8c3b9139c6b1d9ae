// ABOUTME: Tessera server binary: config, tracing, resources, serve
// ABOUTME: Environment-driven startup with a clap CLI for overrides
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tessera AI

#![allow(clippy::expect_used)]

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tessera_chat_server::config::ServerConfig;
use tessera_chat_server::resources::ServerResources;
use tessera_chat_server::routes::build_router;

/// Tessera chat and RAG backend
#[derive(Debug, Parser)]
#[command(name = "tessera-server", version, about)]
struct Cli {
    /// Override the HTTP listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let mut config = ServerConfig::from_env()?;
    if let Some(port) = cli.port {
        config.http_port = port;
    }

    let port = config.http_port;
    let resources = ServerResources::open(config).await?;
    let router = build_router(resources);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("Tessera listening on port {port}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
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
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
