//! Status reporter - read-side aggregation for the UI.

use serde::{Deserialize, Serialize};

use crate::connectivity::ConnectivityMonitor;
use crate::log::ActionLog;

/// A snapshot of sync state for display ("3 items pending sync").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Whether the connectivity monitor currently reports online.
    pub online: bool,
    /// Number of actions awaiting sync.
    pub pending_count: usize,
    /// Whether any action needs manual attention (discard or retry).
    pub has_terminal_failures: bool,
}

/// Derives [`SyncStatus`] from the action log and connectivity monitor.
///
/// Purely read-side; holds no state of its own and never mutates the
/// components it observes.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    log: ActionLog,
    monitor: ConnectivityMonitor,
}

impl StatusReporter {
    /// Create a reporter over the given components.
    #[must_use]
    pub fn new(log: ActionLog, monitor: ConnectivityMonitor) -> Self {
        Self { log, monitor }
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            online: self.monitor.is_online(),
            pending_count: self.log.pending_count(),
            has_terminal_failures: self.log.has_terminal_failures(),
        }
    }
}
