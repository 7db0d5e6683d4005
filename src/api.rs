// src/api.rs
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::gmail::GmailAuth;
use crate::health::Health;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<GmailAuth>,
    pub health: Health,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/login", get(login))
        .route("/oauth2callback", get(oauth_callback))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Boolean health signal for probes: 200 "ok" while cycles complete, 500
/// with the last error once the pipeline stalls (e.g. token refresh keeps
/// failing).
async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.health.snapshot();
    if snapshot.healthy {
        (StatusCode::OK, "ok".to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            snapshot
                .last_error
                .unwrap_or_else(|| "pipeline stalled".to_string()),
        )
    }
}

async fn login(State(state): State<AppState>) -> impl IntoResponse {
    match state.auth.auth_url() {
        Ok(url) => {
            info!(target: "api", "starting login flow");
            Redirect::permanent(&url).into_response()
        }
        Err(e) => {
            warn!(target: "api", error = ?e, "could not build auth url");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "could not build auth url".to_string(),
            )
                .into_response()
        }
    }
}

#[derive(serde::Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: String,
}

async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    if params.code.is_empty() {
        warn!(target: "api", "oauthcallback: got empty authorization code");
        return (
            StatusCode::BAD_REQUEST,
            "got empty authorization code".to_string(),
        )
            .into_response();
    }

    match state.auth.exchange_code(&params.code).await {
        Ok(()) => {
            info!(target: "api", "logged in successfully");
            Html("<html><h1>Success!</h1></html>").into_response()
        }
        Err(e) => {
            warn!(target: "api", error = ?e, "oauthcallback: failed to retrieve token");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to retrieve token: {e:#}"),
            )
                .into_response()
        }
    }
}
