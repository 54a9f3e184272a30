//! Crowdfund client entry point.
//!
//! Binds the crowdfunding contract through the wallet gateway, then exposes
//! a small Axum REST API for browsing campaigns, donating to open ones and
//! creating new ones.  Every listing is read fresh from the ledger.

mod amount;
mod api;
mod assets;
mod chain;
mod classifier;
mod config;
mod creation;
mod donation;
mod errors;
mod repository;
mod rpc;
mod types;

#[cfg(test)]
mod testutil;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use assets::{AssetStore, PinningStore};
use chain::{ChainClient, ConfirmationPolicy, CrowdfundContract};
use config::Config;
use creation::CreationController;
use donation::DonationController;
use repository::CampaignRepository;
use rpc::JsonRpcChain;

const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // HTTP client shared by the wallet gateway and the asset store.
    let client = Client::builder().timeout(config.request_timeout()).build()?;

    // ─── Ledger ───────────────────────────────────────────
    let chain: Arc<dyn ChainClient> = Arc::new(JsonRpcChain::new(client.clone(), &config.rpc_url));
    match chain.connect().await {
        Ok(identity) => info!("Wallet connected as {identity}"),
        Err(e) => warn!("Wallet not connected, donations and creation will fail: {e}"),
    }

    let contract = CrowdfundContract::bind(chain, &config.contract_address).await?;
    info!("Bound crowdfunding contract {}", contract.address());

    // ─── Controllers ──────────────────────────────────────
    let shutdown = CancellationToken::new();
    let policy = ConfirmationPolicy::from_config(&config);

    let repository = Arc::new(CampaignRepository::new(contract.clone()));
    let donations = Arc::new(DonationController::new(
        contract.clone(),
        repository.clone(),
        policy,
        shutdown.clone(),
    ));
    let assets: Arc<dyn AssetStore> = Arc::new(PinningStore::new(client, &config));
    let creation = CreationController::new(contract, assets, policy, shutdown.clone());

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState {
        repository,
        donations,
        creation: Mutex::new(creation),
        gateway_url: config.asset_gateway_url.clone(),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/campaigns", get(api::get_all_campaigns))
        .route("/campaigns/open", get(api::get_open_campaigns))
        .route("/campaigns/closed", get(api::get_closed_campaigns))
        .route(
            "/campaigns/:id/donations",
            get(api::get_donation_phase)
                .post(api::donate)
                .delete(api::cancel_donation),
        )
        .route("/draft", get(api::get_draft).patch(api::update_draft))
        .route(
            "/draft/image",
            post(api::upload_draft_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES)),
        )
        .route("/draft/submit", post(api::submit_draft))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

/// Resolve on Ctrl-C and abort every pending confirmation wait.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
    shutdown.cancel();
}
