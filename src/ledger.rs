// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fetch quota ledger.
//!
//! Tracks how many more times each template is expected to be fetched by the
//! endpoint under test. Quotas are fixed at initialization and only ever go
//! down afterwards: a fetch decrements, a permanently failed ping deletes. An
//! entry disappears the moment its quota reaches zero, so an empty ledger
//! means every expected fetch has happened (or can no longer happen).

use crate::error::LedgerError;
use std::collections::{HashMap, HashSet};

/// Reserved template every other template links to as its comment.
pub const BASIC_REPLY: &str = "basic-reply";

/// Result of a successfully recorded fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchProgress {
    /// More fetches are still expected for this template
    Remaining(u32),
    /// That was the last expected fetch; the entry was removed
    Drained,
}

/// In-memory map from template id to remaining expected fetches.
#[derive(Debug, Default)]
pub struct FetchLedger {
    /// Remaining fetches per template, always > 0
    remaining: HashMap<String, u32>,
    /// Every id the ledger was initialized with
    known: HashSet<String>,
    /// Sum of all initial quotas
    initial_total: u64,
    /// Fetches recorded against a quota
    recorded: u64,
    /// Quota dropped through permanent ping failures
    discarded: u64,
}

impl FetchLedger {
    /// Build a ledger expecting `fetches_per_target * target_count` fetches of
    /// every template, plus one more for [`BASIC_REPLY`], which is also
    /// fetched directly through the comment link embedded in the others.
    pub fn initialize<I, S>(template_ids: I, fetches_per_target: u32, target_count: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let per_template = fetches_per_target.saturating_mul(target_count as u32);
        let mut ledger = Self::default();

        for id in template_ids {
            let id = id.into();
            let mut quota = per_template;
            if id == BASIC_REPLY {
                quota = quota.saturating_add(1);
            }

            ledger.known.insert(id.clone());
            if quota > 0 {
                ledger.initial_total += u64::from(quota);
                ledger.remaining.insert(id, quota);
            }
        }

        ledger
    }

    /// Record one fetch of `id`.
    pub fn record_fetch(&mut self, id: &str) -> Result<FetchProgress, LedgerError> {
        if !self.known.contains(id) {
            return Err(LedgerError::UnknownTemplate(id.to_string()));
        }

        let Some(left) = self.remaining.get_mut(id) else {
            return Err(LedgerError::QuotaExceeded(id.to_string()));
        };

        *left -= 1;
        self.recorded += 1;

        if *left == 0 {
            self.remaining.remove(id);
            Ok(FetchProgress::Drained)
        } else {
            Ok(FetchProgress::Remaining(*left))
        }
    }

    /// Drop whatever is left of `id`'s quota; no fetch will come for it.
    ///
    /// Returns the number of expected fetches discarded.
    pub fn record_permanent_failure(&mut self, id: &str) -> u32 {
        let dropped = self.remaining.remove(id).unwrap_or(0);
        self.discarded += u64::from(dropped);
        dropped
    }

    /// True once no template has an outstanding quota.
    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Remaining expected fetches for `id`, 0 when drained or unknown.
    pub fn remaining(&self, id: &str) -> u32 {
        self.remaining.get(id).copied().unwrap_or(0)
    }

    pub fn initial_total(&self) -> u64 {
        self.initial_total
    }

    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Sum of all quotas still outstanding.
    pub fn outstanding(&self) -> u64 {
        self.remaining.values().map(|v| u64::from(*v)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_conserved(ledger: &FetchLedger) {
        assert_eq!(
            ledger.initial_total(),
            ledger.recorded() + ledger.discarded() + ledger.outstanding()
        );
    }

    #[test]
    fn test_basic_reply_gets_extra_unit() {
        let ledger = FetchLedger::initialize(
            ["basic-like", BASIC_REPLY, "basic-repost", "basic-mention"],
            1,
            1,
        );
        assert_eq!(ledger.remaining(BASIC_REPLY), 2);
        assert_eq!(ledger.remaining("basic-like"), 1);
        assert_eq!(ledger.remaining("basic-repost"), 1);
        assert_eq!(ledger.remaining("basic-mention"), 1);
        assert_eq!(ledger.initial_total(), 5);
    }

    #[test]
    fn test_quota_scales_with_targets() {
        let ledger = FetchLedger::initialize(["basic-like", BASIC_REPLY], 3, 2);
        assert_eq!(ledger.remaining("basic-like"), 6);
        assert_eq!(ledger.remaining(BASIC_REPLY), 7);
    }

    #[test]
    fn test_second_fetch_over_quota_one_rejected() {
        let mut ledger = FetchLedger::initialize(["basic-like"], 1, 1);

        assert_eq!(ledger.record_fetch("basic-like"), Ok(FetchProgress::Drained));
        assert!(ledger.is_empty());
        assert_eq!(
            ledger.record_fetch("basic-like"),
            Err(LedgerError::QuotaExceeded("basic-like".to_string()))
        );
        assert_conserved(&ledger);
    }

    #[test]
    fn test_countdown() {
        let mut ledger = FetchLedger::initialize([BASIC_REPLY], 1, 2);

        assert_eq!(ledger.record_fetch(BASIC_REPLY), Ok(FetchProgress::Remaining(2)));
        assert_eq!(ledger.record_fetch(BASIC_REPLY), Ok(FetchProgress::Remaining(1)));
        assert_eq!(ledger.record_fetch(BASIC_REPLY), Ok(FetchProgress::Drained));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_unknown_template() {
        let mut ledger = FetchLedger::initialize(["basic-like"], 1, 1);
        assert_eq!(
            ledger.record_fetch("does-not-exist"),
            Err(LedgerError::UnknownTemplate("does-not-exist".to_string()))
        );
        assert_eq!(ledger.remaining("basic-like"), 1);
        assert_eq!(ledger.recorded(), 0);
    }

    #[test]
    fn test_permanent_failure_removes_entry() {
        let mut ledger = FetchLedger::initialize(["basic-like", BASIC_REPLY], 1, 1);

        assert_eq!(ledger.record_permanent_failure(BASIC_REPLY), 2);
        assert_eq!(ledger.record_permanent_failure(BASIC_REPLY), 0);
        assert!(!ledger.is_empty());

        assert_eq!(ledger.record_fetch("basic-like"), Ok(FetchProgress::Drained));
        assert!(ledger.is_empty());
        assert_eq!(
            ledger.record_fetch(BASIC_REPLY),
            Err(LedgerError::QuotaExceeded(BASIC_REPLY.to_string()))
        );
        assert_conserved(&ledger);
    }

    #[test]
    fn test_conservation_with_outstanding_quota() {
        let mut ledger =
            FetchLedger::initialize(["a", "b", "c", BASIC_REPLY], 2, 2);

        ledger.record_fetch("a").unwrap();
        ledger.record_fetch("a").unwrap();
        ledger.record_fetch(BASIC_REPLY).unwrap();
        ledger.record_permanent_failure("b");
        let _ = ledger.record_fetch("b");

        assert_conserved(&ledger);
        assert_eq!(ledger.recorded(), 3);
        assert_eq!(ledger.discarded(), 4);
        assert_eq!(ledger.outstanding(), 2 + 4 + 4);
    }

    #[test]
    fn test_zero_fetches_tracks_nothing_but_basic_reply() {
        let ledger = FetchLedger::initialize(["basic-like", BASIC_REPLY], 0, 2);
        assert_eq!(ledger.remaining("basic-like"), 0);
        assert_eq!(ledger.remaining(BASIC_REPLY), 1);
    }
}
