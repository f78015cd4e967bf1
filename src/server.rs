// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Callback server lifecycle.

use crate::controller::ShutdownSignal;
use crate::fetch_url::TEMPLATE_PATH;
use crate::handlers::{fetch_template, health, AppState};
use crate::templates::TemplateSource;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the callback router.
pub fn router<T: TemplateSource>(state: Arc<AppState<T>>) -> Router {
    Router::new()
        .route(TEMPLATE_PATH, get(fetch_template::<T>))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` on `listener` until the run is stopped. In-flight responses
/// are still delivered after the stop.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: ShutdownSignal,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Callback server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            // A dropped sender means the controller is gone; stop as well.
            let reason = shutdown.await.ok();
            info!(?reason, "Closing callback server");
        })
        .await
}
