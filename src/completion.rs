// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Termination policies and the completion decision.

use serde::{Deserialize, Serialize};

/// The rule deciding when a run is finished. Fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum TerminationPolicy {
    /// Stop once every scheduled ping has an outcome; fetches are ignored.
    SyncBounded,
    /// Stop once the fetch ledger is empty. `0` fetches never stops.
    FetchBounded { fetches_per_target: u32 },
}

impl TerminationPolicy {
    /// Whether inbound fetches are counted against the ledger.
    pub fn enforces_quota(&self) -> bool {
        matches!(self, Self::FetchBounded { fetches_per_target } if *fetches_per_target > 0)
    }
}

/// Snapshot of the run state the completion decision looks at.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub template_count: usize,
    pub scheduled_pings: usize,
    pub pings_issued: usize,
    pub ledger_empty: bool,
}

/// Decide whether the run is complete under `policy`.
pub fn is_complete(policy: TerminationPolicy, progress: &Progress) -> bool {
    match policy {
        TerminationPolicy::SyncBounded => progress.pings_issued == progress.scheduled_pings,
        TerminationPolicy::FetchBounded { .. } => {
            policy.enforces_quota() && progress.template_count > 0 && progress.ledger_empty
        }
    }
}
