//! # Scoreline Core
//!
//! Offline-first sync engine for community sports scoreboards.
//! Every score entered at the field is written to a durable local action
//! log first and pushed to the server opportunistically, so patchy venue
//! connectivity never loses a point.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               scoreline-core                │
//! ├─────────────────────────────────────────────┤
//! │  Action Log      │  Connectivity Monitor    │
//! │  - Durable queue │  - Online/offline state  │
//! │  - Idempotency   │  - Debounced reconnect   │
//! │  - Capacity      │  - Subscriber events     │
//! ├─────────────────────────────────────────────┤
//! │  Sync Engine     │  Cache Worker            │
//! │  - Ordered drain │  - Stale-while-revalidate│
//! │  - Backoff       │  - Versioned caches      │
//! │  - Coalescing    │  - Offline fallback      │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod cache;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod game;
pub mod log;
pub mod remote;
pub mod status;

pub use action::{ActionKind, ActionStatus, EntityKey, QueuedAction};
pub use cache::{
    CacheWorker, CachedResponse, FetchError, FetchRequest, HandledResponse, NetworkFetcher,
    QueuedNotice, RequestClass, ServedFrom, ServedResponse,
};
pub use client::OfflineClient;
pub use config::{DebounceConfig, QueueConfig, RetryConfig};
pub use connectivity::{ConnectivityEvent, ConnectivityMonitor};
pub use engine::{DrainReport, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use game::{GameEventPayload, GameId, GamePayload, LocalId, QuarterScorePayload, TeamSide};
pub use log::{
    ActionLog, EnqueueReceipt, FailureDisposition, FileStorage, LoadReport, LogError,
    MemoryStorage, QueueStorage, StorageError,
};
pub use remote::{MemoryGameStore, RemoteError, RemoteGameStore};
pub use status::{StatusReporter, SyncStatus};

/// Scoreline core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
