//! # Scoreline Server Library
//!
//! Shared types and functionality for the game API server.
//! This library is used by both the binary and integration tests.

pub mod client;
pub mod health;
pub mod metrics;
pub mod routes;
pub mod store;
pub mod validation;

pub use client::{ClientError, HttpGameStore};
pub use store::{GameRecord, GameStore, StoreError, StoredEvent};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Game storage shared across routes.
    pub games: GameStore,
}

impl AppState {
    /// State backed by an in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            games: GameStore::new(),
        }
    }

    /// Get a reference to the game store.
    #[must_use]
    pub fn games(&self) -> &GameStore {
        &self.games
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
