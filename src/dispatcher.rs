// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Outbound ping dispatcher.
//!
//! Sends one Webmention (`POST`, form fields `source` and `target`) per
//! template and target to the endpoint under test. Each ping runs as its own
//! task and reports its outcome to the [`RunController`]. Failed pings are
//! final: a `Retry-After` header is reported, never honoured.

use crate::config::ClientConfig;
use crate::controller::{PingResult, RunController};
use crate::error::{HarnessError, PingError};
use crate::fetch_url::FetchUrls;
use reqwest::header::RETRY_AFTER;
use reqwest::{redirect, Client};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;
use url::Url;

/// Classify an HTTP status: 2xx succeeds, anything else fails.
pub fn classify_status(status: u16, retry_after: Option<&str>) -> PingResult {
    if (200..300).contains(&status) {
        Ok(status)
    } else {
        Err(PingError::BadStatus {
            status,
            retry_after: retry_after.and_then(parse_retry_after),
        })
    }
}

/// Leading decimal seconds of a `Retry-After` value; HTTP dates yield None.
fn parse_retry_after(value: &str) -> Option<u64> {
    let value = value.trim();
    let digits = value
        .find(|c: char| !c.is_ascii_digit())
        .map_or(value, |end| &value[..end]);
    digits.parse().ok()
}

/// Sends pings to one Webmention endpoint.
#[derive(Debug, Clone)]
pub struct PingDispatcher {
    client: Client,
    endpoint: Url,
}

impl PingDispatcher {
    /// Build a dispatcher for `endpoint`. Failing to build the client is an
    /// unrecoverable dispatch error.
    pub fn new(endpoint: &str, config: &ClientConfig) -> Result<Self, HarnessError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| HarnessError::Configuration(format!("invalid endpoint URL: {e}")))?;

        let client = Client::builder()
            .timeout(config.timeout())
            .redirect(redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| HarnessError::Dispatch(e.to_string()))?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send one ping claiming `source` mentions `target`.
    pub async fn ping(&self, source: &str, target: &str) -> PingResult {
        debug!(source = %source, target = %target, "Sending ping");

        let response = self
            .client
            .post(self.endpoint.clone())
            .form(&[("source", source), ("target", target)])
            .send()
            .await
            .map_err(|e| PingError::Transport(e.to_string()))?;

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok());

        classify_status(response.status().as_u16(), retry_after)
    }

    /// Spawn a ping for every template and target. Each task records its
    /// outcome with `controller` before finishing.
    ///
    /// Every template uses the same source URL, carrying the first target as
    /// `target` and the second, if any, as `alternateTarget`.
    pub fn dispatch_all(
        &self,
        controller: Arc<RunController>,
        urls: &FetchUrls,
        templates: &[String],
        targets: &[String],
    ) -> JoinSet<()> {
        let mut tasks = JoinSet::new();
        let Some(primary) = targets.first() else {
            return tasks;
        };
        let alternate = targets.get(1).map(String::as_str);

        for template in templates {
            let source = urls.source(template, primary, alternate);

            for target in targets {
                let dispatcher = self.clone();
                let controller = Arc::clone(&controller);
                let template = template.clone();
                let source = source.clone();
                let target = target.clone();

                tasks.spawn(async move {
                    let result = dispatcher.ping(&source, &target).await;
                    controller.record_ping(&template, &target, &result).await;
                });
            }
        }

        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(200, None), Ok(200));
        assert_eq!(classify_status(202, Some("10")), Ok(202));
        assert_eq!(classify_status(299, None), Ok(299));

        assert_eq!(
            classify_status(199, None),
            Err(PingError::BadStatus {
                status: 199,
                retry_after: None
            })
        );
        assert_eq!(
            classify_status(300, None),
            Err(PingError::BadStatus {
                status: 300,
                retry_after: None
            })
        );
    }

    #[test]
    fn test_retry_after_reported() {
        assert_eq!(
            classify_status(429, Some("120")),
            Err(PingError::BadStatus {
                status: 429,
                retry_after: Some(120)
            })
        );
        assert_eq!(
            classify_status(503, Some("Wed, 21 Oct 2026 07:28:00 GMT")),
            Err(PingError::BadStatus {
                status: 503,
                retry_after: None
            })
        );
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("30"), Some(30));
        assert_eq!(parse_retry_after(" 45 "), Some(45));
        assert_eq!(parse_retry_after("12.5"), Some(12));
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_invalid_endpoint() {
        let result = PingDispatcher::new("not a url", &ClientConfig::default());
        assert!(matches!(result, Err(HarnessError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_failure() {
        // Bind and drop to get a local port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dispatcher =
            PingDispatcher::new(&format!("http://{addr}/webmention"), &ClientConfig::default())
                .unwrap();
        let result = dispatcher.ping("http://127.0.0.1:1/template", "https://t.example/").await;
        assert!(matches!(result, Err(PingError::Transport(_))));
    }
}
