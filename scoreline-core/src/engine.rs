//! Sync engine - drains the local action log into the remote game store.
//!
//! A drain walks the queue in enqueue order and dispatches each pending
//! action, persisting the `in_flight` transition *before* the network call
//! begins so a crash mid-drain never loses an action; at worst an already
//! applied call is replayed, which the idempotency key makes a no-op.
//!
//! At most one drain runs at a time. A drain request arriving mid-drain is
//! coalesced: the current drain runs once more before finishing rather than
//! a second drain starting concurrently.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::action::{ActionKind, ActionStatus, EntityKey, QueuedAction};
use crate::config::RetryConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::game::{timestamp_ms, GameId};
use crate::log::{ActionLog, FailureDisposition};
use crate::remote::{RemoteError, RemoteGameStore};

/// What a call to [`SyncEngine::drain`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// A drain actually ran (connectivity was up and no drain was active).
    pub ran: bool,
    /// The request was folded into a drain already in progress.
    pub coalesced: bool,
    /// Actions acknowledged and removed from the log.
    pub completed: usize,
    /// Actions that failed retryably and were rescheduled.
    pub retried: usize,
    /// Actions that became terminal-failed (non-retryable error or attempt
    /// cap reached).
    pub terminal: usize,
    /// Actions skipped because their backoff has not elapsed or an earlier
    /// action for the same game blocks them.
    pub deferred: usize,
    /// Actions still awaiting sync when the drain finished.
    pub remaining: usize,
}

/// Drains the [`ActionLog`] against a [`RemoteGameStore`].
///
/// Cheap to clone; clones share the drain mutual-exclusion state.
#[derive(Clone)]
pub struct SyncEngine {
    log: ActionLog,
    remote: Arc<dyn RemoteGameStore>,
    monitor: ConnectivityMonitor,
    retry: RetryConfig,
    draining: Arc<AtomicBool>,
    rerun_requested: Arc<AtomicBool>,
}

impl SyncEngine {
    /// Create an engine over the given log, remote store, and monitor.
    #[must_use]
    pub fn new(
        log: ActionLog,
        remote: Arc<dyn RemoteGameStore>,
        monitor: ConnectivityMonitor,
        retry: RetryConfig,
    ) -> Self {
        Self {
            log,
            remote,
            monitor,
            retry,
            draining: Arc::new(AtomicBool::new(false)),
            rerun_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The action log this engine drains.
    #[must_use]
    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    /// Attempt to flush the action log to the remote store.
    ///
    /// Returns immediately (without running) when offline. If a drain is
    /// already in flight the request is coalesced into one more pass at the
    /// end of the current drain. All remote failures are converted into
    /// status updates on the queue; `drain` itself never propagates them.
    pub async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();
        if !self.monitor.is_online() {
            tracing::debug!("Drain requested while offline, skipping");
            report.remaining = self.log.pending_count();
            return report;
        }
        if self.draining.swap(true, Ordering::SeqCst) {
            self.rerun_requested.store(true, Ordering::SeqCst);
            report.coalesced = true;
            report.remaining = self.log.pending_count();
            return report;
        }

        report.ran = true;
        loop {
            self.rerun_requested.store(false, Ordering::SeqCst);
            self.drain_pass(&mut report).await;
            if self.rerun_requested.load(Ordering::SeqCst) && self.monitor.is_online() {
                continue;
            }
            self.draining.store(false, Ordering::SeqCst);
            // A request arriving between the check above and the release
            // would otherwise be lost: it saw `draining` still set and only
            // flagged a rerun. Re-acquire and run it, unless another drain
            // has already taken over.
            if self.rerun_requested.load(Ordering::SeqCst)
                && self.monitor.is_online()
                && !self.draining.swap(true, Ordering::SeqCst)
            {
                continue;
            }
            break;
        }

        report.remaining = self.log.pending_count();
        tracing::info!(
            completed = report.completed,
            retried = report.retried,
            terminal = report.terminal,
            remaining = report.remaining,
            "Drain finished"
        );
        report
    }

    /// One pass over the queue in enqueue order.
    async fn drain_pass(&self, report: &mut DrainReport) {
        let now = timestamp_ms();
        // Entities with an earlier unfinished action; later actions for the
        // same game must wait so writes stay in order.
        let mut blocked: HashSet<EntityKey> = HashSet::new();

        for action in self.log.list() {
            match action.status {
                ActionStatus::TerminalFailed => {
                    // Dependents of a failed create must not be sent.
                    blocked.insert(action.entity);
                    continue;
                }
                ActionStatus::Pending => {}
                // Done actions are pruned on completion; in_flight only
                // appears if a previous process crashed, and those were
                // reset to pending on load.
                ActionStatus::InFlight | ActionStatus::Failed | ActionStatus::Done => continue,
            }
            if blocked.contains(&action.entity) {
                report.deferred += 1;
                continue;
            }
            if action.next_attempt_at > now {
                blocked.insert(action.entity);
                report.deferred += 1;
                continue;
            }
            if !self.monitor.is_online() {
                tracing::debug!("Went offline mid-drain, stopping");
                break;
            }

            if let Err(e) = self.log.mark_status(action.id, ActionStatus::InFlight) {
                tracing::warn!(action = %action.id, "Could not mark action in flight: {e}");
                continue;
            }
            // Re-read the stored entry: a create completed earlier in this
            // pass may have rewritten this action's target ID.
            let Some(current) = self.log.get(action.id) else {
                continue;
            };

            match self.dispatch(&current).await {
                Ok(created) => {
                    if let Err(e) = self.log.complete(action.id) {
                        tracing::warn!(action = %action.id, "Could not complete action: {e}");
                    }
                    if let (Some(game_id), EntityKey::Local(local_game)) = (created, action.entity)
                    {
                        let rewritten = self.log.resolve_target(local_game, game_id);
                        tracing::debug!(
                            game = %game_id,
                            rewritten,
                            "Server acknowledged creation, dependents rewritten"
                        );
                    }
                    report.completed += 1;
                }
                Err(error) if error.is_retryable() => {
                    let delay = self.retry.delay_for_attempt(action.attempt_count);
                    let next_attempt_at = now.saturating_add(delay);
                    match self.log.record_failure(
                        action.id,
                        error.to_string(),
                        next_attempt_at,
                        self.retry.max_attempts,
                    ) {
                        Ok(FailureDisposition::Retrying(attempts)) => {
                            tracing::warn!(
                                action = %action.id,
                                kind = action.kind.name(),
                                attempts,
                                delay_ms = delay,
                                "Retryable sync failure: {error}"
                            );
                            report.retried += 1;
                        }
                        Ok(FailureDisposition::Terminal) => {
                            tracing::error!(
                                action = %action.id,
                                kind = action.kind.name(),
                                "Attempt cap reached, action needs manual intervention: {error}"
                            );
                            report.terminal += 1;
                        }
                        Err(e) => {
                            tracing::warn!(action = %action.id, "Could not record failure: {e}");
                        }
                    }
                    // Preserve per-game ordering: stop draining this entity.
                    blocked.insert(action.entity);
                }
                Err(error) => {
                    tracing::error!(
                        action = %action.id,
                        kind = action.kind.name(),
                        "Non-retryable sync failure: {error}"
                    );
                    if let Err(e) = self.log.mark_terminal(action.id, error.to_string()) {
                        tracing::warn!(action = %action.id, "Could not mark terminal: {e}");
                    }
                    report.terminal += 1;
                    blocked.insert(action.entity);
                }
            }
        }
    }

    /// Issue the remote call for one action, bounded by the call timeout.
    ///
    /// Returns the server-assigned game ID for creations.
    async fn dispatch(&self, action: &QueuedAction) -> Result<Option<GameId>, RemoteError> {
        let key = action.idempotency_key();
        let call = async {
            match &action.kind {
                ActionKind::CreateGame(payload) => {
                    self.remote.create_game(key, payload).await.map(Some)
                }
                ActionKind::UpdateGame(changes) => {
                    let game_id = Self::target(action)?;
                    self.remote
                        .update_game(key, game_id, changes)
                        .await
                        .map(|()| None)
                }
                ActionKind::AppendEvent(payload) => {
                    let game_id = Self::target(action)?;
                    self.remote
                        .append_game_event(key, game_id, payload)
                        .await
                        .map(|_| None)
                }
                ActionKind::AppendQuarterScore(payload) => {
                    let game_id = Self::target(action)?;
                    self.remote
                        .append_quarter_score(key, game_id, payload)
                        .await
                        .map(|()| None)
                }
                ActionKind::DeleteGame => {
                    let game_id = Self::target(action)?;
                    self.remote.delete_game(key, game_id).await.map(|()| None)
                }
            }
        };
        match tokio::time::timeout(Duration::from_millis(self.retry.call_timeout_ms), call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        }
    }

    /// The resolved remote target of a dependent action.
    ///
    /// An unresolved target here means the game's create was discarded out
    /// from under its dependents; nothing sensible can be sent.
    fn target(action: &QueuedAction) -> Result<GameId, RemoteError> {
        action.target_id.ok_or_else(|| {
            RemoteError::Rejected("target game was never created on the server".into())
        })
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("draining", &self.draining.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
