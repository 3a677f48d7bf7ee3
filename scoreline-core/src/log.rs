//! Local action log - the durable, ordered queue of pending mutations.
//!
//! Every mutating call persists the full queue synchronously through a
//! [`QueueStorage`] backend, so a crash or reload never loses an
//! acknowledged-pending write. A queue that fails to parse on load is reset
//! to empty (fail-safe) and reported to the caller.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::action::{ActionStatus, EntityKey, QueuedAction};
use crate::config::QueueConfig;
use crate::game::{GameId, LocalId};

/// Version tag for the persisted queue document.
const QUEUE_DOC_VERSION: u32 = 1;

/// Errors from a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend is out of space.
    #[error("storage quota exceeded")]
    QuotaExceeded,
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from action log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The queue is full and nothing can be evicted.
    #[error("action log at capacity")]
    Capacity,
    /// No queued action with the given ID.
    #[error("action not found: {0}")]
    ActionNotFound(LocalId),
    /// The requested status change is not allowed.
    #[error("invalid status transition for action {id}: {from} -> {to}")]
    InvalidTransition {
        /// The action whose transition was rejected.
        id: LocalId,
        /// Current status.
        from: ActionStatus,
        /// Requested status.
        to: ActionStatus,
    },
    /// Only completed or discarded actions may be removed.
    #[error("action {0} is not removable in its current state")]
    NotRemovable(LocalId),
    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Key-value persistence for the serialized queue.
///
/// Implementations must survive reloads of the host application but need not
/// survive an uninstall or explicit data clear.
pub trait QueueStorage: Send + Sync {
    /// Load the persisted queue document, if one exists.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend cannot be read.
    fn load(&self) -> Result<Option<String>, StorageError>;

    /// Persist the queue document, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::QuotaExceeded`] when the backend is full.
    fn save(&self, json: &str) -> Result<(), StorageError>;

    /// Remove any persisted queue document.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend cannot be written.
    fn clear(&self) -> Result<(), StorageError>;
}

/// File-backed storage: one JSON file at a fixed path.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Create storage writing to the given file path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the parent directory cannot be created.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }
}

impl QueueStorage for FileStorage {
    fn load(&self) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, json: &str) -> Result<(), StorageError> {
        std::fs::write(&self.path, json).map_err(|e| {
            if e.raw_os_error() == Some(28) {
                // ENOSPC
                StorageError::QuotaExceeded
            } else {
                StorageError::Io(e)
            }
        })
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory storage with an optional byte quota.
///
/// Used in tests and as a stand-in on platforms without a filesystem.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: std::sync::Mutex<Option<String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    /// Create unbounded in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage that rejects documents larger than `quota_bytes`.
    #[must_use]
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            data: std::sync::Mutex::new(None),
            quota_bytes: Some(quota_bytes),
        }
    }
}

impl QueueStorage for MemoryStorage {
    fn load(&self) -> Result<Option<String>, StorageError> {
        let data = self
            .data
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(data.clone())
    }

    fn save(&self, json: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota_bytes {
            if json.len() > quota {
                return Err(StorageError::QuotaExceeded);
            }
        }
        let mut data = self
            .data
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *data = Some(json.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut data = self
            .data
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *data = None;
        Ok(())
    }
}

/// The persisted shape of the queue.
#[derive(Debug, Serialize, Deserialize)]
struct QueueDocument {
    version: u32,
    actions: Vec<QueuedAction>,
}

/// What happened while loading a persisted queue.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Number of actions restored from storage.
    pub restored: usize,
    /// Number of actions that were `in_flight` at crash time and were reset
    /// to `pending`.
    pub reset_to_pending: usize,
    /// The persisted document failed to parse and the queue was reset to
    /// empty. Unsynced data was lost; the caller must warn the user.
    pub corruption_detected: bool,
}

/// Outcome of [`ActionLog::record_failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// The action returned to pending with the given attempt count.
    Retrying(u32),
    /// The attempt cap was reached; the action is now terminal-failed.
    Terminal,
}

/// Result of an enqueue, reporting any capacity handling that occurred.
#[derive(Debug, Clone, Default)]
pub struct EnqueueReceipt {
    /// Actions evicted (oldest first) to make room.
    pub evicted: Vec<LocalId>,
    /// The queue is at or over its configured capacity after this enqueue.
    pub at_capacity: bool,
}

/// Ordered, durable queue of [`QueuedAction`] entries.
///
/// Cheap to clone; clones share the same underlying queue and storage.
#[derive(Clone)]
pub struct ActionLog {
    actions: Arc<RwLock<Vec<QueuedAction>>>,
    storage: Arc<dyn QueueStorage>,
    capacity: usize,
}

impl ActionLog {
    /// Open a log over the given storage, restoring any persisted queue.
    ///
    /// A document that fails to parse is discarded and the queue starts
    /// empty; this is reported through [`LoadReport::corruption_detected`]
    /// rather than an error, so the app keeps working.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Storage`] if the backend cannot be read.
    pub fn open(
        storage: Arc<dyn QueueStorage>,
        config: &QueueConfig,
    ) -> Result<(Self, LoadReport), LogError> {
        let mut report = LoadReport::default();
        let actions = match storage.load()? {
            None => Vec::new(),
            Some(json) => match serde_json::from_str::<QueueDocument>(&json) {
                Ok(doc) => {
                    let mut actions = doc.actions;
                    for action in &mut actions {
                        // A crash mid-drain leaves actions in_flight; the
                        // call may or may not have reached the server, so
                        // they go back to pending and the idempotency key
                        // makes the replay safe.
                        if action.status == ActionStatus::InFlight {
                            action.status = ActionStatus::Pending;
                            report.reset_to_pending += 1;
                        }
                    }
                    report.restored = actions.len();
                    actions
                }
                Err(e) => {
                    tracing::warn!("Persisted action queue is corrupt, resetting: {e}");
                    report.corruption_detected = true;
                    Vec::new()
                }
            },
        };

        let log = Self {
            actions: Arc::new(RwLock::new(actions)),
            storage,
            capacity: config.capacity,
        };
        if report.reset_to_pending > 0 || report.corruption_detected {
            log.persist_or_warn();
        }
        Ok((log, report))
    }

    /// Append an action with status `pending`.
    ///
    /// When the queue is at capacity or the backend reports quota
    /// exhaustion, the oldest entries that are not `in_flight` are evicted
    /// (least-recently-added first) and reported in the receipt.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Capacity`] when nothing can be evicted, or
    /// [`LogError::Storage`] on other backend failures.
    pub fn enqueue(&self, action: QueuedAction) -> Result<EnqueueReceipt, LogError> {
        let mut receipt = EnqueueReceipt::default();
        let mut actions = self
            .actions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Count-based capacity: make room before appending.
        while actions.len() >= self.capacity {
            match Self::evict_oldest(&mut actions) {
                Some(id) => receipt.evicted.push(id),
                None => return Err(LogError::Capacity),
            }
        }
        let new_id = action.id;
        actions.push(action);
        receipt.at_capacity = actions.len() >= self.capacity;

        // Quota-based capacity: evict until the backend accepts the document.
        loop {
            match self.persist(&actions) {
                Ok(()) => break,
                Err(StorageError::QuotaExceeded) => {
                    match Self::evict_oldest_except(&mut actions, new_id) {
                        Some(id) => {
                            receipt.at_capacity = true;
                            receipt.evicted.push(id);
                        }
                        None => {
                            // Roll back the enqueue; the caller must surface this.
                            actions.retain(|a| a.id != new_id);
                            return Err(LogError::Capacity);
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !receipt.evicted.is_empty() {
            tracing::warn!(
                evicted = receipt.evicted.len(),
                "Action log at capacity, evicted oldest pending entries"
            );
        }
        Ok(receipt)
    }

    /// Snapshot of a single action by ID.
    #[must_use]
    pub fn get(&self, id: LocalId) -> Option<QueuedAction> {
        let actions = self
            .actions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        actions.iter().find(|a| a.id == id).cloned()
    }

    /// All queued actions in insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<QueuedAction> {
        let actions = self
            .actions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        actions.clone()
    }

    /// Number of queued actions.
    #[must_use]
    pub fn len(&self) -> usize {
        let actions = self
            .actions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        actions.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of actions awaiting sync (anything not terminal-failed).
    #[must_use]
    pub fn pending_count(&self) -> usize {
        let actions = self
            .actions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        actions.iter().filter(|a| !a.is_terminal()).count()
    }

    /// Whether any action requires manual intervention.
    #[must_use]
    pub fn has_terminal_failures(&self) -> bool {
        let actions = self
            .actions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        actions.iter().any(|a| a.is_terminal())
    }

    /// Transition an action's status, rejecting invalid transitions.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::ActionNotFound`] or [`LogError::InvalidTransition`].
    pub fn mark_status(&self, id: LocalId, status: ActionStatus) -> Result<(), LogError> {
        let mut actions = self
            .actions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let action = actions
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(LogError::ActionNotFound(id))?;
        if !action.status.can_transition_to(status) {
            return Err(LogError::InvalidTransition {
                id,
                from: action.status,
                to: status,
            });
        }
        action.status = status;
        self.persist_or_warn_locked(&actions);
        Ok(())
    }

    /// Record a retryable failure: `in_flight -> failed`, bump the attempt
    /// count, and schedule the next attempt. Once the attempt count reaches
    /// `max_attempts` the action becomes terminal instead.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::ActionNotFound`] or [`LogError::InvalidTransition`].
    pub fn record_failure(
        &self,
        id: LocalId,
        error: String,
        next_attempt_at: u64,
        max_attempts: u32,
    ) -> Result<FailureDisposition, LogError> {
        let mut actions = self
            .actions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let action = actions
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(LogError::ActionNotFound(id))?;
        if !action.status.can_transition_to(ActionStatus::Failed) {
            return Err(LogError::InvalidTransition {
                id,
                from: action.status,
                to: ActionStatus::Failed,
            });
        }
        action.status = ActionStatus::Failed;
        action.attempt_count += 1;
        action.last_error = Some(error);
        let disposition = if action.attempt_count >= max_attempts {
            action.status = ActionStatus::TerminalFailed;
            FailureDisposition::Terminal
        } else {
            // Failed actions return to pending so the next drain picks them
            // up at their original queue position once the backoff elapses.
            action.status = ActionStatus::Pending;
            action.next_attempt_at = next_attempt_at;
            FailureDisposition::Retrying(action.attempt_count)
        };
        self.persist_or_warn_locked(&actions);
        Ok(disposition)
    }

    /// Record a non-retryable failure: the action becomes terminal and is
    /// excluded from automatic retries until the user intervenes.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::ActionNotFound`] or [`LogError::InvalidTransition`].
    pub fn mark_terminal(&self, id: LocalId, error: String) -> Result<(), LogError> {
        let mut actions = self
            .actions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let action = actions
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(LogError::ActionNotFound(id))?;
        if !action.status.can_transition_to(ActionStatus::TerminalFailed) {
            return Err(LogError::InvalidTransition {
                id,
                from: action.status,
                to: ActionStatus::TerminalFailed,
            });
        }
        action.status = ActionStatus::TerminalFailed;
        action.last_error = Some(error);
        self.persist_or_warn_locked(&actions);
        Ok(())
    }

    /// Mark an in-flight action done and remove it from the log.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::ActionNotFound`] or [`LogError::InvalidTransition`].
    pub fn complete(&self, id: LocalId) -> Result<(), LogError> {
        let mut actions = self
            .actions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let action = actions
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(LogError::ActionNotFound(id))?;
        if !action.status.can_transition_to(ActionStatus::Done) {
            return Err(LogError::InvalidTransition {
                id,
                from: action.status,
                to: ActionStatus::Done,
            });
        }
        // Done actions are never replayed; prune immediately.
        actions.retain(|a| a.id != id);
        self.persist_or_warn_locked(&actions);
        Ok(())
    }

    /// Manually re-queue a failed or terminal-failed action, resetting its
    /// attempt count and backoff.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::ActionNotFound`] or [`LogError::InvalidTransition`].
    pub fn retry(&self, id: LocalId) -> Result<(), LogError> {
        let mut actions = self
            .actions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let action = actions
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(LogError::ActionNotFound(id))?;
        if !action.status.can_transition_to(ActionStatus::Pending) {
            return Err(LogError::InvalidTransition {
                id,
                from: action.status,
                to: ActionStatus::Pending,
            });
        }
        action.status = ActionStatus::Pending;
        action.attempt_count = 0;
        action.next_attempt_at = 0;
        action.last_error = None;
        self.persist_or_warn_locked(&actions);
        Ok(())
    }

    /// Remove a terminal-failed action the user chose to abandon.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::ActionNotFound`] if the action does not exist or
    /// [`LogError::NotRemovable`] if it is not terminal-failed.
    pub fn discard(&self, id: LocalId) -> Result<(), LogError> {
        let mut actions = self
            .actions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let action = actions
            .iter()
            .find(|a| a.id == id)
            .ok_or(LogError::ActionNotFound(id))?;
        if !action.is_terminal() {
            return Err(LogError::NotRemovable(id));
        }
        actions.retain(|a| a.id != id);
        self.persist_or_warn_locked(&actions);
        Ok(())
    }

    /// Rewrite the target of every action belonging to a game created
    /// offline, once the server has assigned its real ID.
    ///
    /// Returns the number of actions rewritten.
    pub fn resolve_target(&self, local_game: LocalId, game_id: GameId) -> usize {
        let mut actions = self
            .actions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut rewritten = 0;
        for action in actions.iter_mut() {
            if action.entity == EntityKey::Local(local_game) {
                action.entity = EntityKey::Remote(game_id);
                action.target_id = Some(game_id);
                rewritten += 1;
            }
        }
        if rewritten > 0 {
            self.persist_or_warn_locked(&actions);
        }
        rewritten
    }

    /// Drop all queued actions and clear storage. Explicit user action only.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Storage`] if the backend cannot be cleared.
    pub fn reset(&self) -> Result<(), LogError> {
        let mut actions = self
            .actions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        actions.clear();
        self.storage.clear()?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    fn persist(&self, actions: &[QueuedAction]) -> Result<(), StorageError> {
        let doc = QueueDocument {
            version: QUEUE_DOC_VERSION,
            actions: actions.to_vec(),
        };
        let json = serde_json::to_string(&doc).map_err(|e| {
            StorageError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        self.storage.save(&json)
    }

    fn persist_or_warn_locked(&self, actions: &[QueuedAction]) {
        if let Err(e) = self.persist(actions) {
            tracing::warn!("Failed to persist action queue: {e}");
        }
    }

    fn persist_or_warn(&self) {
        let actions = self
            .actions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.persist_or_warn_locked(&actions);
    }

    /// Evict the oldest entry that is not in flight. Returns its ID.
    fn evict_oldest(actions: &mut Vec<QueuedAction>) -> Option<LocalId> {
        let idx = actions
            .iter()
            .position(|a| a.status != ActionStatus::InFlight)?;
        Some(actions.remove(idx).id)
    }

    /// Evict the oldest entry that is not in flight and not `keep`.
    fn evict_oldest_except(actions: &mut Vec<QueuedAction>, keep: LocalId) -> Option<LocalId> {
        let idx = actions
            .iter()
            .position(|a| a.status != ActionStatus::InFlight && a.id != keep)?;
        Some(actions.remove(idx).id)
    }
}

impl std::fmt::Debug for ActionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionLog")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::game::GamePayload;
    use proptest::prelude::*;

    fn open_memory_log() -> ActionLog {
        let (log, report) =
            ActionLog::open(Arc::new(MemoryStorage::new()), &QueueConfig::default())
                .expect("open log");
        assert_eq!(report.restored, 0);
        log
    }

    fn create_action(home: &str, t: u64) -> QueuedAction {
        QueuedAction::create_game(GamePayload::new(home, "Away"), t)
    }

    #[test]
    fn test_enqueue_and_list_in_order() {
        let log = open_memory_log();
        let a = create_action("A", 1);
        let b = create_action("B", 2);
        let c = create_action("C", 3);
        let ids = [a.id, b.id, c.id];
        for action in [a, b, c] {
            log.enqueue(action).expect("enqueue");
        }
        let listed: Vec<_> = log.list().into_iter().map(|a| a.id).collect();
        assert_eq!(listed, ids);
    }

    proptest! {
        // Property 1: any sequence of offline enqueues lists back in exact order.
        #[test]
        fn prop_list_preserves_enqueue_order(timestamps in proptest::collection::vec(0u64..1_000_000, 1..40)) {
            let log = open_memory_log();
            let mut ids = Vec::new();
            for t in timestamps {
                let action = create_action("Team", t);
                ids.push(action.id);
                log.enqueue(action).expect("enqueue");
            }
            let listed: Vec<_> = log.list().into_iter().map(|a| a.id).collect();
            prop_assert_eq!(listed, ids);
        }
    }

    #[test]
    fn test_reload_restores_queue() {
        let storage = Arc::new(MemoryStorage::new());
        let action = create_action("A", 1);
        let id = action.id;
        {
            let (log, _) =
                ActionLog::open(Arc::clone(&storage) as Arc<dyn QueueStorage>, &QueueConfig::default())
                    .expect("open");
            log.enqueue(action).expect("enqueue");
        }
        let (log2, report) =
            ActionLog::open(storage, &QueueConfig::default()).expect("reopen");
        assert_eq!(report.restored, 1);
        assert!(!report.corruption_detected);
        let restored = log2.list();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].id, id);
        assert_eq!(restored[0].status, ActionStatus::Pending);
    }

    #[test]
    fn test_reload_resets_in_flight_to_pending() {
        let storage = Arc::new(MemoryStorage::new());
        {
            let (log, _) =
                ActionLog::open(Arc::clone(&storage) as Arc<dyn QueueStorage>, &QueueConfig::default())
                    .expect("open");
            let action = create_action("A", 1);
            let id = action.id;
            log.enqueue(action).expect("enqueue");
            log.mark_status(id, ActionStatus::InFlight).expect("mark");
        }
        let (log2, report) =
            ActionLog::open(storage, &QueueConfig::default()).expect("reopen");
        assert_eq!(report.reset_to_pending, 1);
        assert_eq!(log2.list()[0].status, ActionStatus::Pending);
    }

    #[test]
    fn test_corrupt_document_resets_to_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.save("{not valid json").expect("seed garbage");
        let (log, report) = ActionLog::open(
            Arc::clone(&storage) as Arc<dyn QueueStorage>,
            &QueueConfig::default(),
        )
        .expect("open");
        assert!(report.corruption_detected);
        assert!(log.is_empty());
        // The reset is persisted so the next load is clean.
        let (_, report2) = ActionLog::open(storage, &QueueConfig::default()).expect("reopen");
        assert!(!report2.corruption_detected);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let log = open_memory_log();
        let action = create_action("A", 1);
        let id = action.id;
        log.enqueue(action).expect("enqueue");
        // pending -> done skips in_flight
        let result = log.complete(id);
        assert!(matches!(result, Err(LogError::InvalidTransition { .. })));
    }

    #[test]
    fn test_complete_removes_action() {
        let log = open_memory_log();
        let action = create_action("A", 1);
        let id = action.id;
        log.enqueue(action).expect("enqueue");
        log.mark_status(id, ActionStatus::InFlight).expect("mark");
        log.complete(id).expect("complete");
        assert!(log.is_empty());
        // Completed actions are gone for good.
        assert!(matches!(
            log.mark_status(id, ActionStatus::Pending),
            Err(LogError::ActionNotFound(_))
        ));
    }

    #[test]
    fn test_record_failure_returns_to_pending_with_backoff() {
        let log = open_memory_log();
        let action = create_action("A", 1);
        let id = action.id;
        log.enqueue(action).expect("enqueue");
        log.mark_status(id, ActionStatus::InFlight).expect("mark");
        let disposition = log
            .record_failure(id, "connection refused".into(), 5_000, 5)
            .expect("record");
        assert_eq!(disposition, FailureDisposition::Retrying(1));
        let listed = log.list();
        assert_eq!(listed[0].status, ActionStatus::Pending);
        assert_eq!(listed[0].next_attempt_at, 5_000);
        assert_eq!(listed[0].last_error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_record_failure_hits_attempt_cap() {
        let log = open_memory_log();
        let a = create_action("A", 1);
        let id = a.id;
        log.enqueue(a).expect("enqueue");
        for attempt in 1..=2 {
            log.mark_status(id, ActionStatus::InFlight).expect("mark");
            let disposition = log
                .record_failure(id, "timeout".into(), 0, 2)
                .expect("record");
            if attempt < 2 {
                assert_eq!(disposition, FailureDisposition::Retrying(attempt));
            } else {
                assert_eq!(disposition, FailureDisposition::Terminal);
            }
        }
        assert!(log.has_terminal_failures());
    }

    #[test]
    fn test_terminal_excluded_from_pending_count() {
        let log = open_memory_log();
        let a = create_action("A", 1);
        let b = create_action("B", 2);
        let id = a.id;
        log.enqueue(a).expect("enqueue");
        log.enqueue(b).expect("enqueue");
        log.mark_status(id, ActionStatus::InFlight).expect("mark");
        log.mark_terminal(id, "rejected".into()).expect("terminal");
        assert_eq!(log.pending_count(), 1);
        assert!(log.has_terminal_failures());
    }

    #[test]
    fn test_discard_only_removes_terminal() {
        let log = open_memory_log();
        let a = create_action("A", 1);
        let id = a.id;
        log.enqueue(a).expect("enqueue");
        assert!(matches!(log.discard(id), Err(LogError::NotRemovable(_))));
        log.mark_status(id, ActionStatus::InFlight).expect("mark");
        log.mark_terminal(id, "rejected".into()).expect("terminal");
        log.discard(id).expect("discard");
        assert!(log.is_empty());
    }

    #[test]
    fn test_manual_retry_resets_attempts() {
        let log = open_memory_log();
        let a = create_action("A", 1);
        let id = a.id;
        log.enqueue(a).expect("enqueue");
        log.mark_status(id, ActionStatus::InFlight).expect("mark");
        log.mark_terminal(id, "rejected".into()).expect("terminal");
        log.retry(id).expect("retry");
        let listed = log.list();
        assert_eq!(listed[0].status, ActionStatus::Pending);
        assert_eq!(listed[0].attempt_count, 0);
        assert!(listed[0].last_error.is_none());
    }

    #[test]
    fn test_count_capacity_evicts_oldest() {
        let storage = Arc::new(MemoryStorage::new());
        let config = QueueConfig { capacity: 2 };
        let (log, _) = ActionLog::open(storage, &config).expect("open");
        let a = create_action("A", 1);
        let b = create_action("B", 2);
        let c = create_action("C", 3);
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        log.enqueue(a).expect("enqueue a");
        log.enqueue(b).expect("enqueue b");
        let receipt = log.enqueue(c).expect("enqueue c");
        assert_eq!(receipt.evicted, vec![a_id]);
        assert!(receipt.at_capacity);
        let ids: Vec<_> = log.list().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![b_id, c_id]);
    }

    #[test]
    fn test_capacity_never_evicts_in_flight() {
        let storage = Arc::new(MemoryStorage::new());
        let config = QueueConfig { capacity: 2 };
        let (log, _) = ActionLog::open(storage, &config).expect("open");
        let a = create_action("A", 1);
        let b = create_action("B", 2);
        let (a_id, b_id) = (a.id, b.id);
        log.enqueue(a).expect("enqueue a");
        log.enqueue(b).expect("enqueue b");
        log.mark_status(a_id, ActionStatus::InFlight).expect("mark a");
        let receipt = log.enqueue(create_action("C", 3)).expect("enqueue c");
        // b (pending) is evicted instead of the older in-flight a.
        assert_eq!(receipt.evicted, vec![b_id]);
        assert!(log.list().iter().any(|x| x.id == a_id));
    }

    #[test]
    fn test_capacity_error_when_all_in_flight() {
        let storage = Arc::new(MemoryStorage::new());
        let config = QueueConfig { capacity: 1 };
        let (log, _) = ActionLog::open(storage, &config).expect("open");
        let a = create_action("A", 1);
        let a_id = a.id;
        log.enqueue(a).expect("enqueue a");
        log.mark_status(a_id, ActionStatus::InFlight).expect("mark");
        let result = log.enqueue(create_action("B", 2));
        assert!(matches!(result, Err(LogError::Capacity)));
        // The queue is unchanged.
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_quota_exhaustion_evicts_until_save_fits() {
        // Quota sized to hold roughly two actions but not three.
        let one_action_json = {
            let doc = serde_json::json!({
                "version": 1,
                "actions": [create_action("Sizer", 1)]
            });
            doc.to_string().len()
        };
        let storage = Arc::new(MemoryStorage::with_quota(one_action_json * 2));
        let (log, _) = ActionLog::open(storage, &QueueConfig::default()).expect("open");
        log.enqueue(create_action("A", 1)).expect("a");
        log.enqueue(create_action("B", 2)).expect("b");
        let receipt = log.enqueue(create_action("C", 3)).expect("c");
        assert!(!receipt.evicted.is_empty());
        assert!(log.len() <= 2);
    }

    #[test]
    fn test_resolve_target_rewrites_dependents() {
        let log = open_memory_log();
        let create = create_action("A", 1);
        let local_game = create.id;
        let event = QueuedAction::for_local_game(ActionKind::DeleteGame, local_game, 2);
        let unrelated = create_action("B", 3);
        log.enqueue(create).expect("create");
        log.enqueue(event).expect("event");
        log.enqueue(unrelated).expect("unrelated");

        let game_id = GameId::new();
        // The create and its dependent share the same local entity key.
        let rewritten = log.resolve_target(local_game, game_id);
        assert_eq!(rewritten, 2);
        let listed = log.list();
        assert_eq!(listed[0].target_id, Some(game_id));
        assert_eq!(listed[1].target_id, Some(game_id));
        assert_eq!(listed[2].target_id, None);
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("queue.json");
        let storage = Arc::new(FileStorage::new(&path).expect("storage"));
        let action = create_action("A", 1);
        let id = action.id;
        {
            let (log, _) = ActionLog::open(
                Arc::clone(&storage) as Arc<dyn QueueStorage>,
                &QueueConfig::default(),
            )
            .expect("open");
            log.enqueue(action).expect("enqueue");
        }
        assert!(path.exists(), "queue file should be written on enqueue");
        let (log2, report) =
            ActionLog::open(storage, &QueueConfig::default()).expect("reopen");
        assert_eq!(report.restored, 1);
        assert_eq!(log2.list()[0].id, id);
    }
}
