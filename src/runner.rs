// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! One complete harness run: list templates, start the callback server,
//! ping the endpoint, wait for the run to stop and report.

use crate::config::Config;
use crate::controller::{RunController, RunReport};
use crate::dispatcher::PingDispatcher;
use crate::error::HarnessError;
use crate::fetch_url::FetchUrls;
use crate::handlers::AppState;
use crate::server;
use crate::templates::TemplateSource;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Run the harness against `config.endpoint` until it completes or
/// `interrupt` resolves.
pub async fn run<T, F>(config: Config, templates: T, interrupt: F) -> Result<RunReport, HarnessError>
where
    T: TemplateSource,
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;

    let template_ids = templates
        .list_template_ids()
        .await
        .map_err(HarnessError::ListUnavailable)?;
    let targets: Vec<String> = config.active_targets().into_iter().map(String::from).collect();

    let (controller, shutdown) = RunController::new(config.policy(), &template_ids, targets.len())?;
    let controller = Arc::new(controller);
    let dispatcher = PingDispatcher::new(&config.endpoint, &config.client)?;

    let bind_addr = config.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|source| HarnessError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;
    let port = listener.local_addr()?.port();
    let urls = FetchUrls::new(&config.host, port)
        .map_err(|e| HarnessError::Configuration(format!("invalid host {}: {e}", config.host)))?;

    info!(
        templates = template_ids.len(),
        targets = %targets.join(" + "),
        endpoint = %dispatcher.endpoint(),
        policy = ?controller.policy(),
        "Pinging {} pages",
        template_ids.len()
    );

    let state = Arc::new(AppState {
        controller: Arc::clone(&controller),
        templates: Arc::new(templates),
        urls: urls.clone(),
    });
    let server = tokio::spawn(server::serve(listener, server::router(state), shutdown));

    let watcher = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            interrupt.await;
            controller.interrupt().await;
        })
    };

    let mut pings = dispatcher.dispatch_all(Arc::clone(&controller), &urls, &template_ids, &targets);
    let mut dispatch_failure = None;
    while let Some(joined) = pings.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Ping task failed");
            dispatch_failure.get_or_insert_with(|| e.to_string());
        }
    }

    if let Some(reason) = dispatch_failure {
        controller.interrupt().await;
        watcher.abort();
        let _ = server.await;
        return Err(HarnessError::Dispatch(reason));
    }

    let served = server
        .await
        .map_err(|e| HarnessError::Dispatch(format!("callback server task failed: {e}")))?;
    watcher.abort();
    if let Err(e) = served {
        warn!(error = %e, "Callback server exited with an error");
        return Err(HarnessError::Io(e));
    }

    let report = controller.report().await;
    if report.failed_pings > 0 {
        warn!(
            failed = report.failed_pings,
            pings = report.pings_issued,
            "{} of them failed",
            report.failed_pings
        );
    }
    Ok(report)
}
