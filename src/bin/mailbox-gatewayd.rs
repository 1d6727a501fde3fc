#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Mailbox gateway daemon: loads configuration, wires the account
//! store and HTTP control plane, and serves the route table from
//! `mailbox_gateway::http::router`.

use mailbox_gateway::http::{self, AppState};
use mailbox_gateway::store::RedisAccountStore;
use mailbox_gateway::AppConfig;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env()?;
    let store = RedisAccountStore::connect(&config.store_url, &config.store_token).await?;
    let state = AppState::new(Arc::new(store), config.master_key.clone());
    let router = http::router(state);

    let addr = format!("{}:{}", config.bind_addr, config.bind_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "mailbox gateway listening");
    axum::serve(listener, router).await?;

    Ok(())
}
