// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Run controller.
//!
//! Owns the fetch ledger, the run counters and the shutdown trigger. Ping
//! outcomes and inbound fetches both arrive here, in any order, and every
//! mutation is followed by a completion check under the same lock. The
//! shutdown sender is taken out of the state on the first stop, so the
//! listener is told to close at most once per run.

use crate::completion::{is_complete, Progress, TerminationPolicy};
use crate::error::{HarnessError, LedgerError, PingError};
use crate::ledger::{FetchLedger, FetchProgress};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

/// Why the listener was told to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    Interrupted,
}

/// Resolves once the run has been stopped.
pub type ShutdownSignal = oneshot::Receiver<StopReason>;

/// What the inbound handler should do with a fetch that rendered fine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchVerdict {
    Serve,
    Reject(LedgerError),
}

/// Outcome of one outbound ping: the 2xx status, or why it failed.
pub type PingResult = std::result::Result<u16, PingError>;

/// Final counters of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub policy: TerminationPolicy,
    pub templates: usize,
    pub targets: usize,
    pub scheduled_pings: usize,
    pub pings_issued: usize,
    pub failed_pings: usize,
    pub fetches_served: usize,
    pub fetches_rejected: usize,
    pub quota_initial: u64,
    pub quota_fetched: u64,
    pub quota_discarded: u64,
    pub quota_outstanding: u64,
    pub stop_reason: Option<StopReason>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// True when the run completed without a single failed ping.
    pub fn is_clean(&self) -> bool {
        self.failed_pings == 0 && self.stop_reason == Some(StopReason::Completed)
    }
}

#[derive(Debug)]
struct RunState {
    ledger: FetchLedger,
    pings_issued: usize,
    failed_pings: usize,
    fetches_served: usize,
    fetches_rejected: usize,
    shutdown: Option<oneshot::Sender<StopReason>>,
    stop_reason: Option<StopReason>,
}

/// Shared coordinator for one harness run.
pub struct RunController {
    policy: TerminationPolicy,
    template_count: usize,
    target_count: usize,
    started_at: DateTime<Utc>,
    state: Mutex<RunState>,
}

impl RunController {
    /// Create the controller for a run over `template_ids` and `target_count`
    /// targets, along with the signal the server waits on.
    pub fn new(
        policy: TerminationPolicy,
        template_ids: &[String],
        target_count: usize,
    ) -> Result<(Self, ShutdownSignal), HarnessError> {
        if template_ids.is_empty() {
            return Err(HarnessError::NoTemplates);
        }

        let fetches_per_target = match policy {
            TerminationPolicy::FetchBounded { fetches_per_target } => fetches_per_target,
            TerminationPolicy::SyncBounded => 1,
        };
        let ledger =
            FetchLedger::initialize(template_ids.iter().cloned(), fetches_per_target, target_count);
        let (tx, rx) = oneshot::channel();

        let controller = Self {
            policy,
            template_count: template_ids.len(),
            target_count,
            started_at: Utc::now(),
            state: Mutex::new(RunState {
                ledger,
                pings_issued: 0,
                failed_pings: 0,
                fetches_served: 0,
                fetches_rejected: 0,
                shutdown: Some(tx),
                stop_reason: None,
            }),
        };

        Ok((controller, rx))
    }

    pub fn policy(&self) -> TerminationPolicy {
        self.policy
    }

    /// Total number of pings the run sends: every template to every target.
    pub fn scheduled_pings(&self) -> usize {
        self.template_count * self.target_count
    }

    /// Account for an inbound fetch of template `id` that rendered fine.
    pub async fn record_fetch(&self, id: &str) -> FetchVerdict {
        let mut state = self.state.lock().await;

        let verdict = if self.policy.enforces_quota() {
            match state.ledger.record_fetch(id) {
                Ok(FetchProgress::Remaining(left)) => {
                    debug!(template = %id, remaining = left, "Fetch recorded");
                    FetchVerdict::Serve
                }
                Ok(FetchProgress::Drained) => {
                    debug!(template = %id, "All expected fetches done");
                    FetchVerdict::Serve
                }
                Err(err @ LedgerError::QuotaExceeded(_)) => {
                    warn!(template = %id, "Tried to fetch mention too many times");
                    FetchVerdict::Reject(err)
                }
                Err(err @ LedgerError::UnknownTemplate(_)) => {
                    warn!(template = %id, "Fetched template was not part of this run");
                    FetchVerdict::Reject(err)
                }
            }
        } else {
            FetchVerdict::Serve
        };

        match verdict {
            FetchVerdict::Serve => state.fetches_served += 1,
            FetchVerdict::Reject(_) => state.fetches_rejected += 1,
        }

        self.complete_if_done(&mut state);
        verdict
    }

    /// Account for the outcome of the ping of `template` to `target`.
    ///
    /// Returns true if this outcome stopped the run.
    pub async fn record_ping(&self, template: &str, target: &str, result: &PingResult) -> bool {
        let mut state = self.state.lock().await;
        state.pings_issued += 1;

        match result {
            Ok(status) => {
                info!(template = %template, target = %target, status, "pinged");
            }
            Err(err) => {
                warn!(template = %template, target = %target, error = %err, "failed to be pinged");
                state.failed_pings += 1;
                let dropped = state.ledger.record_permanent_failure(template);
                if dropped > 0 {
                    debug!(template = %template, dropped, "Dropped expected fetches");
                }
            }
        }

        self.complete_if_done(&mut state)
    }

    /// Run the completion check on its own. Returns true if this call stopped
    /// the run.
    pub async fn check_completion(&self) -> bool {
        let mut state = self.state.lock().await;
        self.complete_if_done(&mut state)
    }

    /// Force the run to stop, e.g. on Ctrl-C. Returns true if this call
    /// stopped the run.
    pub async fn interrupt(&self) -> bool {
        let mut state = self.state.lock().await;
        let stopped = Self::stop(&mut state, StopReason::Interrupted);
        if stopped {
            warn!(
                outstanding_fetches = state.ledger.outstanding(),
                pings_issued = state.pings_issued,
                "Run interrupted"
            );
        }
        stopped
    }

    pub async fn is_stopped(&self) -> bool {
        self.state.lock().await.stop_reason.is_some()
    }

    /// Snapshot of the counters as they stand now.
    pub async fn report(&self) -> RunReport {
        let state = self.state.lock().await;
        RunReport {
            policy: self.policy,
            templates: self.template_count,
            targets: self.target_count,
            scheduled_pings: self.scheduled_pings(),
            pings_issued: state.pings_issued,
            failed_pings: state.failed_pings,
            fetches_served: state.fetches_served,
            fetches_rejected: state.fetches_rejected,
            quota_initial: state.ledger.initial_total(),
            quota_fetched: state.ledger.recorded(),
            quota_discarded: state.ledger.discarded(),
            quota_outstanding: state.ledger.outstanding(),
            stop_reason: state.stop_reason,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }

    fn progress(&self, state: &RunState) -> Progress {
        Progress {
            template_count: self.template_count,
            scheduled_pings: self.scheduled_pings(),
            pings_issued: state.pings_issued,
            ledger_empty: state.ledger.is_empty(),
        }
    }

    fn complete_if_done(&self, state: &mut RunState) -> bool {
        if !is_complete(self.policy, &self.progress(state)) {
            return false;
        }

        let stopped = Self::stop(state, StopReason::Completed);
        if stopped {
            info!(
                templates = self.template_count,
                pings = state.pings_issued,
                fetches = state.ledger.recorded(),
                failed = state.failed_pings,
                "Done with all {} pings!",
                self.template_count
            );
        }
        stopped
    }

    fn stop(state: &mut RunState, reason: StopReason) -> bool {
        let Some(tx) = state.shutdown.take() else {
            return false;
        };
        state.stop_reason = Some(reason);
        // The server may already be gone; the stop still counts.
        let _ = tx.send(reason);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::BASIC_REPLY;
    use std::sync::Arc;

    const FETCH_ONCE: TerminationPolicy = TerminationPolicy::FetchBounded {
        fetches_per_target: 1,
    };

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn bad_status() -> PingResult {
        Err(PingError::BadStatus {
            status: 500,
            retry_after: None,
        })
    }

    #[test]
    fn test_empty_template_list_is_startup_error() {
        assert!(matches!(
            RunController::new(FETCH_ONCE, &[], 1),
            Err(HarnessError::NoTemplates)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_checks_stop_once() {
        let (controller, mut signal) =
            RunController::new(TerminationPolicy::SyncBounded, &ids(&["basic-like"]), 1).unwrap();
        let controller = Arc::new(controller);

        // Completes the run, but the stop happens in whichever call wins.
        {
            let mut state = controller.state.lock().await;
            state.pings_issued = 1;
        }

        let mut handles = Vec::new();
        for _ in 0..32 {
            let controller = Arc::clone(&controller);
            handles.push(tokio::spawn(async move { controller.check_completion().await }));
        }

        let mut stops = 0;
        for handle in handles {
            if handle.await.unwrap() {
                stops += 1;
            }
        }

        assert_eq!(stops, 1);
        assert_eq!(signal.try_recv(), Ok(StopReason::Completed));
        assert!(!controller.interrupt().await);
    }

    #[tokio::test]
    async fn test_sync_stops_on_last_ping_outcome() {
        let (controller, mut signal) =
            RunController::new(TerminationPolicy::SyncBounded, &ids(&["a", "b"]), 2).unwrap();
        assert_eq!(controller.scheduled_pings(), 4);

        assert!(!controller.record_ping("a", "t1", &Ok(202)).await);
        assert!(!controller.record_ping("b", "t1", &bad_status()).await);
        assert!(!controller.record_ping("a", "t2", &Ok(200)).await);
        assert!(signal.try_recv().is_err());

        assert!(controller.record_ping("b", "t2", &Ok(201)).await);
        assert_eq!(signal.try_recv(), Ok(StopReason::Completed));

        let report = controller.report().await;
        assert_eq!(report.pings_issued, 4);
        assert_eq!(report.failed_pings, 1);
        assert_eq!(report.fetches_served, 0);
    }

    #[tokio::test]
    async fn test_sync_ignores_fetch_quota() {
        let (controller, _signal) =
            RunController::new(TerminationPolicy::SyncBounded, &ids(&["a"]), 1).unwrap();

        for _ in 0..5 {
            assert_eq!(controller.record_fetch("a").await, FetchVerdict::Serve);
        }
        assert!(!controller.is_stopped().await);
    }

    #[tokio::test]
    async fn test_all_failed_pings_complete_fetch_bounded_run() {
        let (controller, mut signal) =
            RunController::new(FETCH_ONCE, &ids(&["a", BASIC_REPLY, "c"]), 2).unwrap();

        let mut stopped = Vec::new();
        for template in ["a", BASIC_REPLY, "c"] {
            for target in ["t1", "t2"] {
                stopped.push(controller.record_ping(template, target, &bad_status()).await);
            }
        }

        // The third template's first failure empties the ledger.
        assert_eq!(stopped, vec![false, false, false, false, true, false]);
        assert_eq!(signal.try_recv(), Ok(StopReason::Completed));

        let report = controller.report().await;
        assert_eq!(report.failed_pings, 6);
        assert_eq!(report.quota_discarded, report.quota_initial);
        assert_eq!(report.quota_outstanding, 0);
    }

    #[tokio::test]
    async fn test_fetches_drain_ledger_and_stop() {
        let (controller, mut signal) =
            RunController::new(FETCH_ONCE, &ids(&["basic-like", BASIC_REPLY]), 1).unwrap();

        assert!(!controller.record_ping("basic-like", "t", &Ok(202)).await);
        assert!(!controller.record_ping(BASIC_REPLY, "t", &Ok(202)).await);

        assert_eq!(controller.record_fetch(BASIC_REPLY).await, FetchVerdict::Serve);
        assert_eq!(controller.record_fetch("basic-like").await, FetchVerdict::Serve);
        assert!(signal.try_recv().is_err());

        assert_eq!(controller.record_fetch(BASIC_REPLY).await, FetchVerdict::Serve);
        assert_eq!(signal.try_recv(), Ok(StopReason::Completed));

        assert_eq!(
            controller.record_fetch("basic-like").await,
            FetchVerdict::Reject(LedgerError::QuotaExceeded("basic-like".to_string()))
        );

        let report = controller.report().await;
        assert!(report.is_clean());
        assert_eq!(report.fetches_served, 3);
        assert_eq!(report.fetches_rejected, 1);
        assert_eq!(report.quota_fetched, report.quota_initial);
    }

    #[tokio::test]
    async fn test_fetch_before_ping_response() {
        let (controller, _signal) = RunController::new(FETCH_ONCE, &ids(&["a", "b"]), 1).unwrap();

        assert_eq!(controller.record_fetch("a").await, FetchVerdict::Serve);
        assert!(!controller.record_ping("a", "t", &Ok(202)).await);
        assert!(!controller.is_stopped().await);
    }

    #[tokio::test]
    async fn test_unbounded_fetches_never_stop() {
        let policy = TerminationPolicy::FetchBounded {
            fetches_per_target: 0,
        };
        let (controller, mut signal) = RunController::new(policy, &ids(&["a"]), 1).unwrap();

        assert!(!controller.record_ping("a", "t", &bad_status()).await);
        assert_eq!(controller.record_fetch("a").await, FetchVerdict::Serve);
        assert!(signal.try_recv().is_err());

        assert!(controller.interrupt().await);
        assert_eq!(signal.try_recv(), Ok(StopReason::Interrupted));
        assert_eq!(controller.report().await.stop_reason, Some(StopReason::Interrupted));
    }

    #[tokio::test]
    async fn test_unbounded_fetches_ignore_all_failed_pings() {
        let policy = TerminationPolicy::FetchBounded {
            fetches_per_target: 0,
        };
        let (controller, mut signal) =
            RunController::new(policy, &ids(&["a", BASIC_REPLY]), 2).unwrap();

        for template in ["a", BASIC_REPLY] {
            for target in ["t1", "t2"] {
                assert!(!controller.record_ping(template, target, &bad_status()).await);
            }
        }

        assert!(signal.try_recv().is_err());
        assert!(!controller.is_stopped().await);

        let report = controller.report().await;
        assert_eq!(report.failed_pings, 4);
        assert_eq!(report.quota_outstanding, 0);
        assert_eq!(report.stop_reason, None);
    }

    #[tokio::test]
    async fn test_conservation_after_interrupt() {
        let (controller, _signal) =
            RunController::new(FETCH_ONCE, &ids(&["a", "b", "c", BASIC_REPLY]), 2).unwrap();

        controller.record_fetch("a").await;
        controller.record_fetch(BASIC_REPLY).await;
        controller.record_ping("b", "t1", &bad_status()).await;
        controller.interrupt().await;

        let report = controller.report().await;
        assert_eq!(
            report.quota_initial,
            report.quota_fetched + report.quota_discarded + report.quota_outstanding
        );
        assert_eq!(report.quota_fetched, 2);
        assert_eq!(report.quota_discarded, 2);
    }
}
