// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Webmention Test Pinger
//!
//! Pings a Webmention endpoint with every test template and serves the
//! templates back when the endpoint fetches them.
//!
//! ## Usage
//!
//! ```text
//! webmention-testpinger -e https://example.com/webmention -t https://example.com/post
//! ```
//!
//! The run stops once every template has been fetched `--fetches` times per
//! target, or with `--sync` once every ping has had a response. Every flag
//! can also be set through its `TESTPINGER_*` environment variable.
//!
//! Exit code `0` means the run finished; `1` means missing configuration or
//! a fatal template listing / dispatch failure.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use webmention_testpinger::{
    config::{ClientConfig, Config},
    runner,
    templates::{DirectoryTemplates, MemoryTemplates},
};

#[derive(Parser)]
#[command(
    name = "webmention-testpinger",
    version,
    about = "Conformance pinger for Webmention endpoints"
)]
struct Args {
    /// The URL of the Webmention endpoint that will receive the pings
    #[arg(short, long, env = "TESTPINGER_ENDPOINT")]
    endpoint: Option<String>,

    /// The URL of the target that will get mentioned (repeatable, the last two are used)
    #[arg(short = 't', long = "target", env = "TESTPINGER_TARGET", value_delimiter = ',')]
    targets: Vec<String>,

    /// Fetches of each mention per target before shutting down; 0 never shuts down
    #[arg(short, long, env = "TESTPINGER_FETCHES", default_value_t = 1)]
    fetches: u32,

    /// Host name or IP address to bring up the server at
    #[arg(short = 'H', long, env = "TESTPINGER_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port number to bring up the server at
    #[arg(short, long, env = "TESTPINGER_PORT", default_value_t = 8080)]
    port: u16,

    /// Keep running until all pings have responses, ignoring --fetches
    #[arg(short, long, env = "TESTPINGER_SYNC")]
    sync: bool,

    /// Directory of test templates to use instead of the shipped ones
    #[arg(long, env = "TESTPINGER_TEMPLATES")]
    templates: Option<PathBuf>,

    /// Timeout for each ping request in milliseconds
    #[arg(long, env = "TESTPINGER_TIMEOUT_MS", default_value_t = 20000)]
    timeout_ms: u64,

    /// Write the final run report as JSON to this file
    #[arg(long, env = "TESTPINGER_REPORT")]
    report: Option<PathBuf>,

    /// Emit JSON log lines instead of human-readable ones
    #[arg(long, env = "TESTPINGER_JSON_LOGS")]
    json_logs: bool,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            endpoint: self.endpoint.unwrap_or_default(),
            targets: self.targets,
            fetches: self.fetches,
            host: self.host,
            port: self.port,
            sync: self.sync,
            template_dir: self.templates,
            client: ClientConfig {
                timeout_ms: self.timeout_ms,
                ..Default::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = Args::parse();
    let report_path = args.report.take();

    // Initialize tracing
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(args.json_logs.then(|| fmt::layer().json()))
        .with((!args.json_logs).then(fmt::layer))
        .with(filter)
        .init();

    let config = args.into_config();
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Unable to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let report = match config.template_dir.clone() {
        Some(dir) => runner::run(config, DirectoryTemplates::new(dir), interrupt).await?,
        None => runner::run(config, MemoryTemplates::embedded(), interrupt).await?,
    };

    info!(
        templates = report.templates,
        targets = report.targets,
        pings = report.pings_issued,
        failed = report.failed_pings,
        fetches = report.fetches_served,
        rejected_fetches = report.fetches_rejected,
        outstanding_fetches = report.quota_outstanding,
        stop_reason = ?report.stop_reason,
        "Run finished"
    );

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    Ok(())
}
