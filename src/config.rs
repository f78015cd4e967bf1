// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the Webmention test pinger.
//!
//! By default the callback server listens on `127.0.0.1:8080`, every
//! template is expected to be fetched once per target, and outbound pings
//! time out after 20s.

use crate::completion::TerminationPolicy;
use crate::error::HarnessError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Only the last two configured targets take part in a run.
pub const MAX_TARGETS: usize = 2;

/// Configuration for a single harness run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Webmention endpoint that receives the pings
    #[serde(default)]
    pub endpoint: String,

    /// Target URLs that get mentioned (primary, then optional alternate)
    #[serde(default)]
    pub targets: Vec<String>,

    /// Expected fetches per template per target; 0 never auto-stops (default: 1)
    #[serde(default = "default_fetches")]
    pub fetches: u32,

    /// Host the callback server binds to and advertises (default: 127.0.0.1)
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the callback server binds to (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Stop once every ping has a response, ignoring fetches (default: false)
    #[serde(default)]
    pub sync: bool,

    /// Directory of `*.html` test templates; the shipped set when unset
    #[serde(default)]
    pub template_dir: Option<PathBuf>,

    /// Outbound client configuration
    #[serde(default)]
    pub client: ClientConfig,
}

/// Outbound HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Request timeout in milliseconds (default: 20000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum redirects followed per ping (default: 9)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// User-Agent sent with every ping
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

// Default value functions
fn default_fetches() -> u32 {
    1
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_ms() -> u64 {
    20000
}

fn default_max_redirects() -> usize {
    9
}

fn default_user_agent() -> String {
    "WebMention-Testsuite (https://github.com/voxpelli/node-webmention-testpinger)".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            targets: Vec::new(),
            fetches: default_fetches(),
            host: default_host(),
            port: default_port(),
            sync: false,
            template_dir: None,
            client: ClientConfig::default(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    /// Check that the endpoint and at least one target are present and parse
    /// as URLs.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.endpoint.trim().is_empty() || self.targets.iter().all(|t| t.trim().is_empty()) {
            return Err(HarnessError::Configuration(
                "No endpoint URL and/or no target URL to ping was provided - both required"
                    .to_string(),
            ));
        }

        url::Url::parse(&self.endpoint).map_err(|e| {
            HarnessError::Configuration(format!("invalid endpoint URL {}: {e}", self.endpoint))
        })?;

        for target in self.active_targets() {
            url::Url::parse(target).map_err(|e| {
                HarnessError::Configuration(format!("invalid target URL {target}: {e}"))
            })?;
        }

        Ok(())
    }

    /// The targets that take part in the run: the last two non-empty ones.
    pub fn active_targets(&self) -> Vec<&str> {
        let targets: Vec<&str> = self
            .targets
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        let skip = targets.len().saturating_sub(MAX_TARGETS);
        targets.into_iter().skip(skip).collect()
    }

    /// The termination policy selected by `sync` and `fetches`.
    pub fn policy(&self) -> TerminationPolicy {
        if self.sync {
            TerminationPolicy::SyncBounded
        } else {
            TerminationPolicy::FetchBounded {
                fetches_per_target: self.fetches,
            }
        }
    }

    /// Socket address string for the callback listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ClientConfig {
    /// Get the request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
