//! bankmail — Binary Entrypoint
//! Boots the poll loop and the Axum HTTP surface (oauth login/callback,
//! /status, /metrics), wiring shared state between them.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bankmail::api::{self, AppState};
use bankmail::config::Settings;
use bankmail::cursor::CursorStore;
use bankmail::extract::RuleSet;
use bankmail::gmail::{GmailAuth, GmailMailbox, OauthApp, TokenStore};
use bankmail::health::Health;
use bankmail::ledger::HttpLedgerClient;
use bankmail::metrics::Metrics;
use bankmail::poll;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::from_env();
    let metrics = Metrics::init(settings.poll_interval.as_secs());

    let rules = Arc::new(RuleSet::load_default().context("loading extraction rules")?);
    tracing::info!(rules = rules.len(), "extraction rules loaded");

    let app = OauthApp::from_file(&settings.credentials_path)?;
    let auth = Arc::new(GmailAuth::new(app, TokenStore::new(&settings.token_path)));
    let mailbox = Arc::new(GmailMailbox::new(auth.clone()));
    let ledger = Arc::new(HttpLedgerClient::new(settings.ledger_addr.clone()));
    let store = CursorStore::new(&settings.state_path);
    let health = Health::new();

    poll::spawn_poll_loop(
        mailbox,
        rules,
        ledger,
        store,
        health.clone(),
        settings.poll_interval,
        settings.page_size,
    );

    let state = AppState {
        auth,
        health,
    };
    let router = api::create_router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&settings.listen_addr)
        .await
        .with_context(|| format!("binding {}", settings.listen_addr))?;
    tracing::info!(addr = %settings.listen_addr, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}
