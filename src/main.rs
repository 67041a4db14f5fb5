use std::sync::Arc;

use anyhow::Context;

use leadscore::api::{AppState, routes};
use leadscore::auth::StorageAuthorizer;
use leadscore::config::ServiceConfig;
use leadscore::llm::{HttpProvider, LlmProvider};
use leadscore::pipeline::{FlagClient, Orchestrator, ScoringClient};
use leadscore::ratelimit::{RateLimiter, RemoteRateLimiter, WindowRateLimiter};
use leadscore::store::{LibSqlStorage, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env().context("failed to load configuration")?;

    eprintln!("leadscore v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   API: http://0.0.0.0:{}/ev/score", config.port);
    eprintln!("   Database: {}", config.db_path);

    let storage: Arc<dyn Storage> = Arc::new(
        LibSqlStorage::new_local(std::path::Path::new(&config.db_path))
            .await
            .context("failed to open database")?,
    );

    let llm: Arc<dyn LlmProvider> = Arc::new(HttpProvider::new(
        &config.api_url,
        config.api_key.clone(),
        &config.model,
        config.llm_timeout,
    )?);

    let limiter: Arc<dyn RateLimiter> = match &config.rate_limit_url {
        Some(url) => {
            eprintln!("   Rate limiting: delegated ({url})");
            Arc::new(RemoteRateLimiter::new(reqwest::Client::new(), url))
        }
        None => Arc::new(WindowRateLimiter::new(Arc::clone(&storage))),
    };

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&storage),
        Arc::clone(&limiter),
        ScoringClient::new(Arc::clone(&llm)),
        FlagClient::new(Arc::clone(&llm)),
    ));

    let state = AppState {
        orchestrator,
        authorizer: Arc::new(StorageAuthorizer::new(Arc::clone(&storage))),
        limiter,
        bypass_token: config.bypass_token.clone(),
    };

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .context("failed to bind listen port")?;
    axum::serve(listener, routes(state))
        .await
        .context("server error")?;

    Ok(())
}
