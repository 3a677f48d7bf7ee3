//! Shared game storage for the API server.
//!
//! Provides a thread-safe [`GameStore`] shared across HTTP routes, plus the
//! idempotency registry that makes every mutation safe to replay. Clients
//! retry aggressively after connectivity gaps, so a key that was already
//! applied must return the original outcome instead of applying twice.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scoreline_core::{GameEventPayload, GameId, GamePayload, QuarterScorePayload};

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested game does not exist.
    #[error("Game not found: {0}")]
    GameNotFound(GameId),
    /// The mutation payload was malformed.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    /// An I/O error occurred during persistence.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A recorded in-game event, with its server-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Server-assigned event id.
    pub id: Uuid,
    /// The event as submitted.
    #[serde(flatten)]
    pub payload: GameEventPayload,
}

/// A game as held by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    /// Server-assigned game id.
    pub id: GameId,
    /// Home team name.
    pub home_team: String,
    /// Away team name.
    pub away_team: String,
    /// Where the game is played, if known.
    pub venue: Option<String>,
    /// Scheduled start time (ms since epoch), if known.
    pub scheduled_at: Option<u64>,
    /// Events in submission order.
    pub events: Vec<StoredEvent>,
    /// Per-quarter scores in submission order.
    pub quarter_scores: Vec<QuarterScorePayload>,
}

impl GameRecord {
    fn from_payload(id: GameId, payload: &GamePayload) -> Self {
        Self {
            id,
            home_team: payload.home_team.clone(),
            away_team: payload.away_team.clone(),
            venue: payload.venue.clone(),
            scheduled_at: payload.scheduled_at,
            events: Vec::new(),
            quarter_scores: Vec::new(),
        }
    }
}

/// What a previously applied mutation produced.
///
/// Stored per idempotency key so replays can return the original result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum AppliedOutcome {
    /// A create, with the game id it assigned.
    Created {
        /// The assigned id.
        game_id: GameId,
    },
    /// An event append, with the event id it assigned.
    EventAppended {
        /// The assigned id.
        event_id: Uuid,
    },
    /// A mutation with no assigned id (update, delete, quarter score).
    Applied,
}

/// Thread-safe game storage shared across HTTP routes.
///
/// Cheap to clone; clones share the underlying maps.
#[derive(Debug, Clone, Default)]
pub struct GameStore {
    games: Arc<RwLock<HashMap<GameId, GameRecord>>>,
    applied: Arc<RwLock<HashMap<Uuid, AppliedOutcome>>>,
    /// Optional data directory for filesystem persistence.
    data_dir: Option<PathBuf>,
}

impl GameStore {
    /// Create an empty in-memory store (no persistence).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with filesystem persistence.
    ///
    /// Games are saved as JSON files in `data_dir`. The directory is created
    /// if it doesn't exist, and any games already on disk are loaded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created or read.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        let store = Self {
            games: Arc::new(RwLock::new(HashMap::new())),
            applied: Arc::new(RwLock::new(HashMap::new())),
            data_dir: Some(data_dir),
        };
        let loaded = store.load_all_games()?;
        if !loaded.is_empty() {
            tracing::info!(games = loaded.len(), "Loaded persisted games");
        }
        Ok(store)
    }

    /// Create a game, or return the id a previous attempt with the same key
    /// already assigned.
    ///
    /// # Errors
    ///
    /// Currently infallible but returns `Result` for API consistency.
    pub fn create_game(
        &self,
        idempotency_key: Uuid,
        payload: &GamePayload,
    ) -> Result<GameId, StoreError> {
        if let Some(AppliedOutcome::Created { game_id }) = self.lookup_applied(idempotency_key) {
            tracing::debug!(key = %idempotency_key, game = %game_id, "Replayed create, returning recorded id");
            crate::metrics::record_idempotent_replay("create_game");
            return Ok(game_id);
        }
        let id = GameId::new();
        {
            let mut games = self
                .games
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            games.insert(id, GameRecord::from_payload(id, payload));
        }
        self.record_applied(idempotency_key, AppliedOutcome::Created { game_id: id });
        self.persist_game(id);
        Ok(id)
    }

    /// Merge a partial update into a game's fields.
    ///
    /// Only `home_team`, `away_team`, `venue`, and `scheduled_at` may be
    /// changed; unknown keys are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::GameNotFound`] for an unknown game and
    /// [`StoreError::InvalidPayload`] for unknown or mistyped fields.
    pub fn update_game(
        &self,
        idempotency_key: Uuid,
        game_id: GameId,
        changes: &serde_json::Value,
    ) -> Result<(), StoreError> {
        if self.lookup_applied(idempotency_key).is_some() {
            crate::metrics::record_idempotent_replay("update_game");
            return Ok(());
        }
        let Some(changes) = changes.as_object() else {
            return Err(StoreError::InvalidPayload(
                "update body must be a JSON object".into(),
            ));
        };
        {
            let mut games = self
                .games
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let game = games
                .get_mut(&game_id)
                .ok_or(StoreError::GameNotFound(game_id))?;
            apply_changes(game, changes)?;
        }
        self.record_applied(idempotency_key, AppliedOutcome::Applied);
        self.persist_game(game_id);
        Ok(())
    }

    /// Delete a game.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::GameNotFound`] for an unknown game.
    pub fn delete_game(&self, idempotency_key: Uuid, game_id: GameId) -> Result<(), StoreError> {
        if self.lookup_applied(idempotency_key).is_some() {
            crate::metrics::record_idempotent_replay("delete_game");
            return Ok(());
        }
        {
            let mut games = self
                .games
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if games.remove(&game_id).is_none() {
                return Err(StoreError::GameNotFound(game_id));
            }
        }
        self.record_applied(idempotency_key, AppliedOutcome::Applied);
        self.remove_persisted_game(game_id);
        Ok(())
    }

    /// Append an event to a game, or return the event id a previous attempt
    /// with the same key already assigned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::GameNotFound`] for an unknown game.
    pub fn append_event(
        &self,
        idempotency_key: Uuid,
        game_id: GameId,
        payload: &GameEventPayload,
    ) -> Result<Uuid, StoreError> {
        if let Some(AppliedOutcome::EventAppended { event_id }) =
            self.lookup_applied(idempotency_key)
        {
            tracing::debug!(key = %idempotency_key, "Replayed event append, no-op");
            crate::metrics::record_idempotent_replay("append_event");
            return Ok(event_id);
        }
        let event_id = Uuid::new_v4();
        {
            let mut games = self
                .games
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let game = games
                .get_mut(&game_id)
                .ok_or(StoreError::GameNotFound(game_id))?;
            game.events.push(StoredEvent {
                id: event_id,
                payload: payload.clone(),
            });
        }
        self.record_applied(idempotency_key, AppliedOutcome::EventAppended { event_id });
        self.persist_game(game_id);
        Ok(event_id)
    }

    /// Append a quarter score to a game.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::GameNotFound`] for an unknown game.
    pub fn append_quarter_score(
        &self,
        idempotency_key: Uuid,
        game_id: GameId,
        payload: &QuarterScorePayload,
    ) -> Result<(), StoreError> {
        if self.lookup_applied(idempotency_key).is_some() {
            crate::metrics::record_idempotent_replay("append_quarter_score");
            return Ok(());
        }
        {
            let mut games = self
                .games
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let game = games
                .get_mut(&game_id)
                .ok_or(StoreError::GameNotFound(game_id))?;
            game.quarter_scores.push(*payload);
        }
        self.record_applied(idempotency_key, AppliedOutcome::Applied);
        self.persist_game(game_id);
        Ok(())
    }

    /// Get a game by id.
    #[must_use]
    pub fn get(&self, game_id: GameId) -> Option<GameRecord> {
        let games = self
            .games
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        games.get(&game_id).cloned()
    }

    /// All games, in no particular order.
    #[must_use]
    pub fn list(&self) -> Vec<GameRecord> {
        let games = self
            .games
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        games.values().cloned().collect()
    }

    /// Number of games held.
    #[must_use]
    pub fn game_count(&self) -> usize {
        let games = self
            .games
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        games.len()
    }

    fn lookup_applied(&self, idempotency_key: Uuid) -> Option<AppliedOutcome> {
        let applied = self
            .applied
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        applied.get(&idempotency_key).copied()
    }

    fn record_applied(&self, idempotency_key: Uuid, outcome: AppliedOutcome) {
        let mut applied = self
            .applied
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        applied.insert(idempotency_key, outcome);
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Save a game to disk as JSON.
    ///
    /// No-op if the store was created without a data directory.
    fn persist_game(&self, game_id: GameId) {
        let Some(ref data_dir) = self.data_dir else {
            return;
        };
        let Some(record) = self.get(game_id) else {
            return;
        };
        let json = match serde_json::to_string_pretty(&record) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!("Failed to serialize game {game_id}: {e}");
                return;
            }
        };
        let path = data_dir.join(format!("{game_id}.json"));
        if let Err(e) = std::fs::write(&path, json) {
            tracing::warn!("Failed to persist game {game_id} to {}: {e}", path.display());
        }
    }

    fn remove_persisted_game(&self, game_id: GameId) {
        let Some(ref data_dir) = self.data_dir else {
            return;
        };
        let path = data_dir.join(format!("{game_id}.json"));
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!("Failed to remove persisted game {game_id}: {e}");
            }
        }
    }

    /// Load every persisted game from the data directory into memory.
    ///
    /// Returns the ids that were found on disk. Unparseable files are
    /// skipped with a warning rather than failing startup.
    fn load_all_games(&self) -> Result<Vec<GameId>, StoreError> {
        let Some(ref data_dir) = self.data_dir else {
            return Ok(Vec::new());
        };
        let mut loaded = Vec::new();
        for entry in std::fs::read_dir(data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<GameRecord>(&contents) {
                Ok(record) => {
                    let mut games = self
                        .games
                        .write()
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    loaded.push(record.id);
                    games.insert(record.id, record);
                }
                Err(e) => {
                    tracing::warn!("Skipping unparseable game file {}: {e}", path.display());
                }
            }
        }
        Ok(loaded)
    }
}

/// Merge validated update fields into a record.
fn apply_changes(
    game: &mut GameRecord,
    changes: &serde_json::Map<String, serde_json::Value>,
) -> Result<(), StoreError> {
    for (key, value) in changes {
        match key.as_str() {
            "home_team" => {
                game.home_team = as_string(key, value)?;
            }
            "away_team" => {
                game.away_team = as_string(key, value)?;
            }
            "venue" => {
                game.venue = if value.is_null() {
                    None
                } else {
                    Some(as_string(key, value)?)
                };
            }
            "scheduled_at" => {
                game.scheduled_at = if value.is_null() {
                    None
                } else {
                    Some(value.as_u64().ok_or_else(|| {
                        StoreError::InvalidPayload("scheduled_at must be a timestamp".into())
                    })?)
                };
            }
            other => {
                return Err(StoreError::InvalidPayload(format!(
                    "unknown field: {other}"
                )));
            }
        }
    }
    Ok(())
}

fn as_string(key: &str, value: &serde_json::Value) -> Result<String, StoreError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| StoreError::InvalidPayload(format!("{key} must be a string")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> GamePayload {
        GamePayload::new("Harbour Hawks", "North End Gulls")
    }

    #[test]
    fn test_create_and_get() {
        let store = GameStore::new();
        let id = store
            .create_game(Uuid::new_v4(), &sample_payload())
            .expect("create");
        let record = store.get(id).expect("game exists");
        assert_eq!(record.home_team, "Harbour Hawks");
        assert!(record.events.is_empty());
    }

    #[test]
    fn test_create_replay_returns_same_id() {
        let store = GameStore::new();
        let key = Uuid::new_v4();
        let first = store.create_game(key, &sample_payload()).expect("create");
        let second = store.create_game(key, &sample_payload()).expect("replay");
        assert_eq!(first, second);
        assert_eq!(store.game_count(), 1);
    }

    #[test]
    fn test_event_replay_appends_once() {
        let store = GameStore::new();
        let id = store
            .create_game(Uuid::new_v4(), &sample_payload())
            .expect("create");
        let key = Uuid::new_v4();
        let event = GameEventPayload {
            quarter: 1,
            clock_seconds: 45,
            team: scoreline_core::TeamSide::Home,
            player: None,
            kind: "goal".into(),
        };
        let first = store.append_event(key, id, &event).expect("append");
        let second = store.append_event(key, id, &event).expect("replay");
        assert_eq!(first, second);
        assert_eq!(store.get(id).expect("game").events.len(), 1);
    }

    #[test]
    fn test_update_merges_known_fields_only() {
        let store = GameStore::new();
        let id = store
            .create_game(Uuid::new_v4(), &sample_payload())
            .expect("create");

        store
            .update_game(
                Uuid::new_v4(),
                id,
                &serde_json::json!({"venue": "Memorial Park"}),
            )
            .expect("update");
        assert_eq!(
            store.get(id).expect("game").venue.as_deref(),
            Some("Memorial Park")
        );

        let err = store
            .update_game(Uuid::new_v4(), id, &serde_json::json!({"score": 99}))
            .expect_err("unknown field rejected");
        assert!(matches!(err, StoreError::InvalidPayload(_)));
    }

    #[test]
    fn test_delete_missing_game() {
        let store = GameStore::new();
        let err = store
            .delete_game(Uuid::new_v4(), GameId::new())
            .expect_err("missing game");
        assert!(matches!(err, StoreError::GameNotFound(_)));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = {
            let store = GameStore::with_data_dir(dir.path()).expect("store");
            let id = store
                .create_game(Uuid::new_v4(), &sample_payload())
                .expect("create");
            store
                .append_quarter_score(
                    Uuid::new_v4(),
                    id,
                    &QuarterScorePayload {
                        quarter: 1,
                        home_points: 14,
                        away_points: 7,
                    },
                )
                .expect("score");
            id
        };

        let reopened = GameStore::with_data_dir(dir.path()).expect("reopen");
        let record = reopened.get(id).expect("game survived restart");
        assert_eq!(record.quarter_scores.len(), 1);
        assert_eq!(record.quarter_scores[0].home_points, 14);
    }

    #[test]
    fn test_delete_removes_persisted_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GameStore::with_data_dir(dir.path()).expect("store");
        let id = store
            .create_game(Uuid::new_v4(), &sample_payload())
            .expect("create");
        store.delete_game(Uuid::new_v4(), id).expect("delete");

        let reopened = GameStore::with_data_dir(dir.path()).expect("reopen");
        assert!(reopened.get(id).is_none());
    }
}
