// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Webmention Test Pinger
//!
//! A conformance harness for Webmention endpoints. It pings the endpoint
//! under test once per test template and target, and serves the template
//! sources the endpoint fetches back to verify each mention:
//!
//! - Per-template fetch quotas (one extra for `basic-reply`)
//! - Fetch-bounded or ping-bounded (sync) termination
//! - Over-fetch detection (`500` once a quota is used up)
//! - Failed pings recorded permanently, never retried
//! - Exactly-once shutdown of the callback server

pub mod completion;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod fetch_url;
pub mod handlers;
pub mod ledger;
pub mod runner;
pub mod server;
pub mod templates;

pub use completion::TerminationPolicy;
pub use config::Config;
pub use controller::{RunController, RunReport, StopReason};
pub use dispatcher::PingDispatcher;
pub use error::{HarnessError, LedgerError, PingError, TemplateError};
pub use ledger::{FetchLedger, BASIC_REPLY};
pub use templates::{DirectoryTemplates, MemoryTemplates, TemplateSource};
