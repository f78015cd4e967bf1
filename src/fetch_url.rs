// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Callback URLs pointing back at the `/template` fetch endpoint.

use crate::ledger::BASIC_REPLY;
use url::Url;

/// Path the inbound fetch handler is mounted at.
pub const TEMPLATE_PATH: &str = "/template";

/// Builds fetch URLs for the callback server at `http://{host}:{port}`.
#[derive(Debug, Clone)]
pub struct FetchUrls {
    base: Url,
}

impl FetchUrls {
    pub fn new(host: &str, port: u16) -> Result<Self, url::ParseError> {
        let base = Url::parse(&format!("http://{host}:{port}{TEMPLATE_PATH}"))?;
        Ok(Self { base })
    }

    /// Source URL pinged for template `name`.
    pub fn source(&self, name: &str, target: &str, alternate_target: Option<&str>) -> String {
        let mut url = self.base.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("name", name).append_pair("target", target);
            if let Some(alternate) = alternate_target {
                query.append_pair("alternateTarget", alternate);
            }
        }
        url.into()
    }

    /// URL of the basic reply whose target is template `name` itself.
    pub fn comment(&self, name: &str, target: &str) -> String {
        self.source(BASIC_REPLY, &self.source(name, target, None), None)
    }
}
