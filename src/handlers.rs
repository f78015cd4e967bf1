// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the callback server.
//!
//! The endpoint under test fetches the sources it was pinged about from
//! `GET /template`. Each fetch renders the requested template and is counted
//! against the run's fetch quota.

use crate::controller::{FetchVerdict, RunController};
use crate::fetch_url::FetchUrls;
use crate::templates::{RenderOptions, TemplateSource};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state.
pub struct AppState<T> {
    pub controller: Arc<RunController>,
    pub templates: Arc<T>,
    pub urls: FetchUrls,
}

/// Query string of a template fetch.
#[derive(Debug, Deserialize)]
pub struct FetchQuery {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default, rename = "alternateTarget")]
    pub alternate_target: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "webmention-testpinger",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Rewrite the first `.` of a template name to `-`.
pub fn normalize_name(name: &str) -> String {
    name.replacen('.', "-", 1)
}

/// Serve a rendered template to the endpoint under test.
///
/// - `404`: name or target missing, or no such template
/// - `500`: the template was already fetched as often as expected
pub async fn fetch_template<T: TemplateSource>(
    State(state): State<Arc<AppState<T>>>,
    Query(query): Query<FetchQuery>,
) -> Response {
    let name = query.name.as_deref().map(normalize_name).unwrap_or_default();
    let target = query.target.unwrap_or_default();

    if name.is_empty() || target.is_empty() {
        warn!("Invalid mention request, missing mention name or target");
        return StatusCode::NOT_FOUND.into_response();
    }

    let options = RenderOptions {
        alternate_target: query.alternate_target.filter(|t| !t.is_empty()),
        comment_url: state.urls.comment(&name, &target),
    };

    let body = match state.templates.render(&name, &target, &options).await {
        Ok(body) => body,
        Err(err) => {
            warn!(template = %name, error = %err, "Invalid mention was requested");
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    match state.controller.record_fetch(&name).await {
        FetchVerdict::Serve => {
            info!(template = %name, target = %target, "was fetched");
            Html(body).into_response()
        }
        FetchVerdict::Reject(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
