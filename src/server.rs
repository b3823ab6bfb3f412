// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! HTTP surface: liveness probe and the mutating admission endpoint.

use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::webhook::{self, WebhookState};

pub async fn start_server(
    port: u16,
    state: Arc<WebhookState>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/mutate", post(webhook::mutate_handler))
        .with_state(state);

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

/// Healthy as long as the process serves requests
async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "OK"})))
}
