//! Offline client facade.
//!
//! Ties the action log, connectivity monitor, sync engine, and status
//! reporter together behind the interface the scoreboard UI talks to:
//! record a mutation locally (always succeeds short of capacity), ask for
//! a sync, poll status, and resolve terminal failures.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::action::{ActionKind, QueuedAction};
use crate::config::RetryConfig;
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use crate::engine::{DrainReport, SyncEngine};
use crate::error::SyncResult;
use crate::game::{timestamp_ms, GameEventPayload, GameId, GamePayload, LocalId, QuarterScorePayload};
use crate::log::{ActionLog, EnqueueReceipt};
use crate::remote::RemoteGameStore;
use crate::status::{StatusReporter, SyncStatus};

/// Client-side entry point for offline-first score keeping.
///
/// Every mutation is written to the local action log first and synced
/// opportunistically; the UI never waits on the network. Cheap to clone.
#[derive(Clone)]
pub struct OfflineClient {
    log: ActionLog,
    monitor: ConnectivityMonitor,
    engine: SyncEngine,
    reporter: StatusReporter,
}

impl OfflineClient {
    /// Assemble a client from its parts.
    #[must_use]
    pub fn new(
        log: ActionLog,
        remote: Arc<dyn RemoteGameStore>,
        monitor: ConnectivityMonitor,
        retry: RetryConfig,
    ) -> Self {
        let engine = SyncEngine::new(log.clone(), remote, monitor.clone(), retry);
        let reporter = StatusReporter::new(log.clone(), monitor.clone());
        Self {
            log,
            monitor,
            engine,
            reporter,
        }
    }

    /// The action log backing this client.
    #[must_use]
    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    /// The connectivity monitor feeding this client.
    #[must_use]
    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    /// Record a new game locally.
    ///
    /// Returns the local id the game is known by until the server assigns
    /// a real one. Follow-up actions recorded against that local id are
    /// rewritten automatically once the create syncs.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Capacity`](crate::error::SyncError::Capacity) when the log is full of unsyncable
    /// actions, or [`SyncError::Storage`](crate::error::SyncError::Storage) when persistence fails.
    pub fn record_create_game(
        &self,
        payload: GamePayload,
    ) -> SyncResult<(LocalId, EnqueueReceipt)> {
        let action = QueuedAction::create_game(payload, timestamp_ms());
        let local_game = action.id;
        let receipt = self.log.enqueue(action)?;
        Ok((local_game, receipt))
    }

    /// Record a partial update to a game that already has a server id.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Capacity`](crate::error::SyncError::Capacity) or [`SyncError::Storage`](crate::error::SyncError::Storage) when the
    /// enqueue fails.
    pub fn record_update_game(
        &self,
        game_id: GameId,
        changes: Value,
    ) -> SyncResult<EnqueueReceipt> {
        Ok(self.log.enqueue(QueuedAction::for_game(
            ActionKind::UpdateGame(changes),
            game_id,
            timestamp_ms(),
        ))?)
    }

    /// Record a scoring event against a synced game.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Capacity`](crate::error::SyncError::Capacity) or [`SyncError::Storage`](crate::error::SyncError::Storage) when the
    /// enqueue fails.
    pub fn record_event(
        &self,
        game_id: GameId,
        event: GameEventPayload,
    ) -> SyncResult<EnqueueReceipt> {
        Ok(self.log.enqueue(QueuedAction::for_game(
            ActionKind::AppendEvent(event),
            game_id,
            timestamp_ms(),
        ))?)
    }

    /// Record a scoring event against a game that has not synced yet.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Capacity`](crate::error::SyncError::Capacity) or [`SyncError::Storage`](crate::error::SyncError::Storage) when the
    /// enqueue fails.
    pub fn record_event_local(
        &self,
        local_game: LocalId,
        event: GameEventPayload,
    ) -> SyncResult<EnqueueReceipt> {
        Ok(self.log.enqueue(QueuedAction::for_local_game(
            ActionKind::AppendEvent(event),
            local_game,
            timestamp_ms(),
        ))?)
    }

    /// Record a quarter score against a synced game.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Capacity`](crate::error::SyncError::Capacity) or [`SyncError::Storage`](crate::error::SyncError::Storage) when the
    /// enqueue fails.
    pub fn record_quarter_score(
        &self,
        game_id: GameId,
        score: QuarterScorePayload,
    ) -> SyncResult<EnqueueReceipt> {
        Ok(self.log.enqueue(QueuedAction::for_game(
            ActionKind::AppendQuarterScore(score),
            game_id,
            timestamp_ms(),
        ))?)
    }

    /// Record a quarter score against a game that has not synced yet.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Capacity`](crate::error::SyncError::Capacity) or [`SyncError::Storage`](crate::error::SyncError::Storage) when the
    /// enqueue fails.
    pub fn record_quarter_score_local(
        &self,
        local_game: LocalId,
        score: QuarterScorePayload,
    ) -> SyncResult<EnqueueReceipt> {
        Ok(self.log.enqueue(QueuedAction::for_local_game(
            ActionKind::AppendQuarterScore(score),
            local_game,
            timestamp_ms(),
        ))?)
    }

    /// Record a game deletion.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Capacity`](crate::error::SyncError::Capacity) or [`SyncError::Storage`](crate::error::SyncError::Storage) when the
    /// enqueue fails.
    pub fn record_delete_game(&self, game_id: GameId) -> SyncResult<EnqueueReceipt> {
        Ok(self.log.enqueue(QueuedAction::for_game(
            ActionKind::DeleteGame,
            game_id,
            timestamp_ms(),
        ))?)
    }

    /// Flush the action log to the server now.
    ///
    /// A no-op while offline; concurrent calls coalesce into the drain
    /// already running.
    pub async fn sync_now(&self) -> DrainReport {
        self.engine.drain().await
    }

    /// Current queue and connectivity status for the UI badge.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.reporter.status()
    }

    /// Everything still waiting to sync, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<QueuedAction> {
        self.log.list()
    }

    /// Re-arm a terminally failed action so the next sync retries it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Queue`](crate::error::SyncError::Queue) for an unknown id or an action that is
    /// not retryable.
    pub fn retry_action(&self, id: LocalId) -> SyncResult<()> {
        Ok(self.log.retry(id)?)
    }

    /// Drop a terminally failed action from the log.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Queue`](crate::error::SyncError::Queue) for an unknown id or an action that has
    /// not terminally failed.
    pub fn discard_action(&self, id: LocalId) -> SyncResult<()> {
        Ok(self.log.discard(id)?)
    }

    /// Start the background task that syncs whenever connectivity returns.
    ///
    /// Subscribes to the monitor and funnels its debounced sync requests
    /// through a channel into [`SyncEngine::drain`]. The task ends when the
    /// monitor (and with it the channel sender) is dropped.
    pub fn spawn_auto_sync(&self) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        self.monitor.subscribe(move |event| {
            if event == ConnectivityEvent::SyncRequested {
                // Receiver gone means the task was aborted; nothing to do.
                let _ = tx.send(());
            }
        });
        let engine = self.engine.clone();
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                let report = engine.drain().await;
                tracing::debug!(
                    completed = report.completed,
                    remaining = report.remaining,
                    "Auto-sync drain finished"
                );
            }
        })
    }
}

impl std::fmt::Debug for OfflineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineClient")
            .field("online", &self.monitor.is_online())
            .field("queued", &self.log.len())
            .finish_non_exhaustive()
    }
}
