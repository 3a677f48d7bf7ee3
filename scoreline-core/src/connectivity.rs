//! Connectivity monitor - tracks online/offline transitions.
//!
//! The monitor is fed by platform glue (browser `online`/`offline` events,
//! an OS network watcher, or a test) through [`ConnectivityMonitor::set_online`]
//! and [`ConnectivityMonitor::set_offline`]. Subscribers receive
//! [`ConnectivityEvent`] notifications; the offline-to-online transition is
//! debounced so rapid flaps collapse into a single sync request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::DebounceConfig;

/// A connectivity transition delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// The network came back; a sync should be requested.
    ///
    /// Emitted at most once per debounce window.
    SyncRequested,
    /// The network went away. The action log is left untouched.
    WentOffline,
}

type Subscriber = Box<dyn Fn(ConnectivityEvent) + Send + Sync>;

/// Tracks the current connectivity state and notifies subscribers of
/// transitions.
///
/// Cheap to clone; clones share state and subscribers.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    online: Arc<AtomicBool>,
    last_sync_signal: Arc<Mutex<Option<Instant>>>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    debounce: DebounceConfig,
}

impl ConnectivityMonitor {
    /// Create a monitor that starts online.
    #[must_use]
    pub fn new(debounce: DebounceConfig) -> Self {
        Self::with_initial_state(true, debounce)
    }

    /// Create a monitor with an explicit initial state.
    #[must_use]
    pub fn with_initial_state(online: bool, debounce: DebounceConfig) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
            last_sync_signal: Arc::new(Mutex::new(None)),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            debounce,
        }
    }

    /// Current state, for synchronous UI polling.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Register a subscriber for connectivity events.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(ConnectivityEvent) + Send + Sync + 'static,
    {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        subscribers.push(Box::new(callback));
    }

    /// Record a transition to online.
    ///
    /// Emits [`ConnectivityEvent::SyncRequested`] unless a sync was already
    /// requested within the debounce window. Redundant calls while already
    /// online are ignored.
    pub fn set_online(&self) {
        let was_online = self.online.swap(true, Ordering::SeqCst);
        if was_online {
            return;
        }
        tracing::info!("Network is online");

        let should_signal = {
            let mut last = self
                .last_sync_signal
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let now = Instant::now();
            let due = last.is_none_or(|prev| {
                now.duration_since(prev).as_millis() >= u128::from(self.debounce.window_ms)
            });
            if due {
                *last = Some(now);
            }
            due
        };

        if should_signal {
            self.notify(ConnectivityEvent::SyncRequested);
        } else {
            tracing::debug!("Reconnect within debounce window, sync request collapsed");
        }
    }

    /// Record a transition to offline.
    ///
    /// Only records state and notifies subscribers; pending actions are
    /// never cleared by going offline.
    pub fn set_offline(&self) {
        let was_online = self.online.swap(false, Ordering::SeqCst);
        if was_online {
            tracing::info!("Network is offline");
            self.notify(ConnectivityEvent::WentOffline);
        }
    }

    fn notify(&self, event: ConnectivityEvent) {
        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for subscriber in subscribers.iter() {
            subscriber(event);
        }
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("online", &self.is_online())
            .field("debounce_ms", &self.debounce.window_ms)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_monitor(debounce_ms: u64) -> (ConnectivityMonitor, Arc<AtomicUsize>) {
        let monitor = ConnectivityMonitor::with_initial_state(
            false,
            DebounceConfig {
                window_ms: debounce_ms,
            },
        );
        let syncs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&syncs);
        monitor.subscribe(move |event| {
            if event == ConnectivityEvent::SyncRequested {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (monitor, syncs)
    }

    #[test]
    fn test_initial_state() {
        let monitor = ConnectivityMonitor::new(DebounceConfig::default());
        assert!(monitor.is_online());
        let offline =
            ConnectivityMonitor::with_initial_state(false, DebounceConfig::default());
        assert!(!offline.is_online());
    }

    #[test]
    fn test_online_transition_requests_sync() {
        let (monitor, syncs) = counting_monitor(1_000);
        monitor.set_online();
        assert!(monitor.is_online());
        assert_eq!(syncs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rapid_flaps_collapse_to_one_signal() {
        let (monitor, syncs) = counting_monitor(60_000);
        for _ in 0..5 {
            monitor.set_online();
            monitor.set_offline();
        }
        monitor.set_online();
        assert_eq!(syncs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_signal_fires_again_after_window() {
        let (monitor, syncs) = counting_monitor(0);
        monitor.set_online();
        monitor.set_offline();
        monitor.set_online();
        assert_eq!(syncs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_redundant_online_calls_ignored() {
        let (monitor, syncs) = counting_monitor(0);
        monitor.set_online();
        monitor.set_online();
        monitor.set_online();
        assert_eq!(syncs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_offline_notifies_without_sync_request() {
        let monitor =
            ConnectivityMonitor::with_initial_state(true, DebounceConfig::default());
        let went_offline = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&went_offline);
        monitor.subscribe(move |event| {
            if event == ConnectivityEvent::WentOffline {
                flag.store(true, Ordering::SeqCst);
            }
        });
        monitor.set_offline();
        assert!(!monitor.is_online());
        assert!(went_offline.load(Ordering::SeqCst));
    }
}
