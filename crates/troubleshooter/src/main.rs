mod config;
mod diagnostics;
mod error;
mod issues;
mod rules;
mod server;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use rules::RuleBook;
use server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting troubleshooter API");

    // 1. Load config from environment
    let config = Config::from_env()?;
    info!(
        host = %config.host,
        port = config.port,
        database = config.database_url.is_some(),
        request_timeout_secs = config.request_timeout.as_secs(),
        "configuration loaded"
    );

    // 2. Build the rule book (immutable for the life of the process)
    let rules = Arc::new(RuleBook::builtin());
    info!(rules = rules.len(), "rule book loaded");

    // 3. Open the issue store (optional — issue endpoints answer 503 without it)
    let issues = issues::open_store(&config);
    match &issues {
        Some(store) => match store.ping().await {
            Ok(()) => info!(backend = store.backend(), "issue store connected"),
            Err(e) => warn!(
                error = %e,
                backend = store.backend(),
                "issue store unreachable, requests will fail until it recovers"
            ),
        },
        None => info!("running without issue storage"),
    }

    // 4. Serve HTTP
    let app = server::router(AppState::new(rules, issues), config.request_timeout);
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!(addr = %listener.local_addr()?, "HTTP server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .inspect_err(|e| tracing::error!(error = %e, "HTTP server error"))?;

    info!("HTTP server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
