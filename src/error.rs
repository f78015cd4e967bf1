// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the Webmention test pinger.
//!
//! Only [`HarnessError`] ends a run. Everything else is answered or recorded
//! locally by the request that produced it.

use std::path::PathBuf;
use thiserror::Error;

/// Run-fatal errors. Any of these exits the process with code 1.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Couldn't list test templates: {0}")]
    ListUnavailable(#[source] TemplateError),

    #[error("No test templates found")]
    NoTemplates,

    #[error("Encountered an error during pinging: {0}")]
    Dispatch(String),

    #[error("Failed to bind callback server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the fetch quota ledger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Template {0} is not tracked by the ledger")]
    UnknownTemplate(String),

    #[error("Template {0} was fetched more times than expected")]
    QuotaExceeded(String),
}

/// Errors raised by a template source.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Template directory {path} is unreadable: {source}")]
    ListUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read template {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render template {name}: {source}")]
    Render {
        name: String,
        #[source]
        source: tera::Error,
    },
}

/// Why a single outbound ping failed. Failed pings are never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PingError {
    #[error("No HTTP response ({0})")]
    Transport(String),

    #[error(
        "HTTP code {status}{}",
        .retry_after
            .map(|secs| format!(" - should retry after {secs} seconds"))
            .unwrap_or_default()
    )]
    BadStatus {
        status: u16,
        retry_after: Option<u64>,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, HarnessError>;
