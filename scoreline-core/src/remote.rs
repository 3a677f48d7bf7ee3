//! Remote game store seam.
//!
//! The sync engine talks to the hosted game store through the
//! [`RemoteGameStore`] trait. Every call carries the queued action's stable
//! local ID as an idempotency key, so a duplicate delivery (for example a
//! response lost after the server already applied the call) is detected
//! server-side and treated as a no-op success instead of creating a
//! duplicate entity.
//!
//! [`MemoryGameStore`] is the reference implementation used by tests and
//! local development; the HTTP implementation lives in `scoreline-server`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use crate::game::{GameEventPayload, GameId, GamePayload, QuarterScorePayload};

/// Errors returned by a remote game store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// The store could not be reached; safe to retry with backoff.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
    /// The call exceeded its deadline; safe to retry with backoff.
    #[error("remote call timed out")]
    Timeout,
    /// The server rejected the mutation (validation or conflict). Not
    /// retried automatically.
    #[error("rejected by server: {0}")]
    Rejected(String),
    /// The target entity does not exist on the server. Not retried
    /// automatically.
    #[error("entity not found: {0}")]
    NotFound(String),
}

impl RemoteError {
    /// Whether the sync engine should retry this failure with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

/// Logical operations of the hosted game store.
///
/// `idempotency_key` is the client-generated stable identifier for the
/// mutation; implementations must return the originally recorded result for
/// a replayed key rather than applying the mutation twice.
#[async_trait]
pub trait RemoteGameStore: Send + Sync {
    /// Create a game, returning its server-assigned ID.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the store cannot be reached or rejects
    /// the payload.
    async fn create_game(
        &self,
        idempotency_key: Uuid,
        payload: &GamePayload,
    ) -> Result<GameId, RemoteError>;

    /// Apply a JSON merge object to an existing game.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotFound`] for an unknown game, or another
    /// [`RemoteError`] for transport and validation failures.
    async fn update_game(
        &self,
        idempotency_key: Uuid,
        game_id: GameId,
        changes: &serde_json::Value,
    ) -> Result<(), RemoteError>;

    /// Delete a game.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotFound`] for an unknown game, or another
    /// [`RemoteError`] for transport failures.
    async fn delete_game(&self, idempotency_key: Uuid, game_id: GameId)
        -> Result<(), RemoteError>;

    /// Append an in-game event, returning its server-assigned ID.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotFound`] for an unknown game, or another
    /// [`RemoteError`] for transport and validation failures.
    async fn append_game_event(
        &self,
        idempotency_key: Uuid,
        game_id: GameId,
        payload: &GameEventPayload,
    ) -> Result<Uuid, RemoteError>;

    /// Append an end-of-quarter score.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotFound`] for an unknown game, or another
    /// [`RemoteError`] for transport and validation failures.
    async fn append_quarter_score(
        &self,
        idempotency_key: Uuid,
        game_id: GameId,
        payload: &QuarterScorePayload,
    ) -> Result<(), RemoteError>;
}

/// The result a store recorded for an idempotency key.
#[derive(Debug, Clone)]
enum Applied {
    /// A creation, with the assigned game ID.
    Created(GameId),
    /// An event append, with the assigned event ID.
    Event(Uuid),
    /// Any other mutation.
    Done,
}

/// A game held by [`MemoryGameStore`].
#[derive(Debug, Clone, Default)]
struct StoredGame {
    fields: serde_json::Value,
    events: Vec<(Uuid, GameEventPayload)>,
    quarter_scores: Vec<QuarterScorePayload>,
}

#[derive(Default)]
struct Inner {
    games: HashMap<GameId, StoredGame>,
    applied: HashMap<Uuid, Applied>,
    queued_failures: VecDeque<RemoteError>,
    keyed_failures: HashMap<Uuid, RemoteError>,
}

/// In-memory [`RemoteGameStore`] with idempotency tracking and fault
/// injection, for tests and offline development.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryGameStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryGameStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure returned by the next call (first in, first out).
    ///
    /// Replays of already-applied idempotency keys do not consume queued
    /// failures, mirroring a server that dedups before executing.
    pub fn inject_failure(&self, error: RemoteError) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.queued_failures.push_back(error);
    }

    /// Make every call carrying the given idempotency key fail.
    pub fn fail_key(&self, idempotency_key: Uuid, error: RemoteError) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.keyed_failures.insert(idempotency_key, error);
    }

    /// Number of games currently in the store.
    #[must_use]
    pub fn game_count(&self) -> usize {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.games.len()
    }

    /// IDs of all games in the store.
    #[must_use]
    pub fn game_ids(&self) -> Vec<GameId> {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.games.keys().copied().collect()
    }

    /// The merged field set of a game, if it exists.
    #[must_use]
    pub fn game_fields(&self, game_id: GameId) -> Option<serde_json::Value> {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.games.get(&game_id).map(|g| g.fields.clone())
    }

    /// Events appended to a game, in order.
    #[must_use]
    pub fn events_for(&self, game_id: GameId) -> Vec<GameEventPayload> {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner
            .games
            .get(&game_id)
            .map(|g| g.events.iter().map(|(_, e)| e.clone()).collect())
            .unwrap_or_default()
    }

    /// Quarter scores appended to a game, in order.
    #[must_use]
    pub fn quarter_scores_for(&self, game_id: GameId) -> Vec<QuarterScorePayload> {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner
            .games
            .get(&game_id)
            .map(|g| g.quarter_scores.clone())
            .unwrap_or_default()
    }

    /// Check injected failures for this key/call. Must be called after the
    /// idempotency replay check.
    fn take_failure(inner: &mut Inner, idempotency_key: Uuid) -> Option<RemoteError> {
        if let Some(error) = inner.keyed_failures.get(&idempotency_key) {
            return Some(error.clone());
        }
        inner.queued_failures.pop_front()
    }
}

#[async_trait]
impl RemoteGameStore for MemoryGameStore {
    async fn create_game(
        &self,
        idempotency_key: Uuid,
        payload: &GamePayload,
    ) -> Result<GameId, RemoteError> {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(Applied::Created(id)) = inner.applied.get(&idempotency_key) {
            tracing::debug!(key = %idempotency_key, "Replayed create_game, returning recorded ID");
            return Ok(*id);
        }
        if let Some(error) = Self::take_failure(&mut inner, idempotency_key) {
            return Err(error);
        }
        let id = GameId::new();
        let fields = serde_json::to_value(payload)
            .map_err(|e| RemoteError::Rejected(e.to_string()))?;
        inner.games.insert(
            id,
            StoredGame {
                fields,
                ..StoredGame::default()
            },
        );
        inner.applied.insert(idempotency_key, Applied::Created(id));
        Ok(id)
    }

    async fn update_game(
        &self,
        idempotency_key: Uuid,
        game_id: GameId,
        changes: &serde_json::Value,
    ) -> Result<(), RemoteError> {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if inner.applied.contains_key(&idempotency_key) {
            return Ok(());
        }
        if let Some(error) = Self::take_failure(&mut inner, idempotency_key) {
            return Err(error);
        }
        let game = inner
            .games
            .get_mut(&game_id)
            .ok_or_else(|| RemoteError::NotFound(game_id.to_string()))?;
        if let (Some(fields), Some(changes)) = (game.fields.as_object_mut(), changes.as_object()) {
            for (key, value) in changes {
                fields.insert(key.clone(), value.clone());
            }
        }
        inner.applied.insert(idempotency_key, Applied::Done);
        Ok(())
    }

    async fn delete_game(
        &self,
        idempotency_key: Uuid,
        game_id: GameId,
    ) -> Result<(), RemoteError> {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if inner.applied.contains_key(&idempotency_key) {
            return Ok(());
        }
        if let Some(error) = Self::take_failure(&mut inner, idempotency_key) {
            return Err(error);
        }
        if inner.games.remove(&game_id).is_none() {
            return Err(RemoteError::NotFound(game_id.to_string()));
        }
        inner.applied.insert(idempotency_key, Applied::Done);
        Ok(())
    }

    async fn append_game_event(
        &self,
        idempotency_key: Uuid,
        game_id: GameId,
        payload: &GameEventPayload,
    ) -> Result<Uuid, RemoteError> {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(Applied::Event(id)) = inner.applied.get(&idempotency_key) {
            tracing::debug!(key = %idempotency_key, "Replayed append_game_event, no-op");
            return Ok(*id);
        }
        if let Some(error) = Self::take_failure(&mut inner, idempotency_key) {
            return Err(error);
        }
        let game = inner
            .games
            .get_mut(&game_id)
            .ok_or_else(|| RemoteError::NotFound(game_id.to_string()))?;
        let event_id = Uuid::new_v4();
        game.events.push((event_id, payload.clone()));
        inner
            .applied
            .insert(idempotency_key, Applied::Event(event_id));
        Ok(event_id)
    }

    async fn append_quarter_score(
        &self,
        idempotency_key: Uuid,
        game_id: GameId,
        payload: &QuarterScorePayload,
    ) -> Result<(), RemoteError> {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if inner.applied.contains_key(&idempotency_key) {
            return Ok(());
        }
        if let Some(error) = Self::take_failure(&mut inner, idempotency_key) {
            return Err(error);
        }
        let game = inner
            .games
            .get_mut(&game_id)
            .ok_or_else(|| RemoteError::NotFound(game_id.to_string()))?;
        game.quarter_scores.push(*payload);
        inner.applied.insert(idempotency_key, Applied::Done);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryGameStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGameStore")
            .field("games", &self.game_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::TeamSide;

    fn event(kind: &str) -> GameEventPayload {
        GameEventPayload {
            quarter: 1,
            clock_seconds: 30,
            team: TeamSide::Home,
            player: None,
            kind: kind.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_read_back() {
        let store = MemoryGameStore::new();
        let id = store
            .create_game(Uuid::new_v4(), &GamePayload::new("A", "B"))
            .await
            .expect("create");
        assert_eq!(store.game_count(), 1);
        let fields = store.game_fields(id).expect("fields");
        assert_eq!(fields["home_team"], "A");
    }

    #[tokio::test]
    async fn test_replayed_create_returns_same_id() {
        let store = MemoryGameStore::new();
        let key = Uuid::new_v4();
        let payload = GamePayload::new("A", "B");
        let first = store.create_game(key, &payload).await.expect("create");
        let second = store.create_game(key, &payload).await.expect("replay");
        assert_eq!(first, second);
        assert_eq!(store.game_count(), 1);
    }

    #[tokio::test]
    async fn test_replayed_event_append_is_noop() {
        let store = MemoryGameStore::new();
        let game = store
            .create_game(Uuid::new_v4(), &GamePayload::new("A", "B"))
            .await
            .expect("create");
        let key = Uuid::new_v4();
        let payload = event("goal");
        store
            .append_game_event(key, game, &payload)
            .await
            .expect("append");
        store
            .append_game_event(key, game, &payload)
            .await
            .expect("replay");
        assert_eq!(store.events_for(game).len(), 1);
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryGameStore::new();
        let game = store
            .create_game(Uuid::new_v4(), &GamePayload::new("A", "B"))
            .await
            .expect("create");
        store
            .update_game(
                Uuid::new_v4(),
                game,
                &serde_json::json!({"venue": "Memorial Oval"}),
            )
            .await
            .expect("update");
        let fields = store.game_fields(game).expect("fields");
        assert_eq!(fields["venue"], "Memorial Oval");
        assert_eq!(fields["home_team"], "A");
    }

    #[tokio::test]
    async fn test_update_missing_game_is_not_found() {
        let store = MemoryGameStore::new();
        let result = store
            .update_game(Uuid::new_v4(), GameId::new(), &serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(RemoteError::NotFound(_))));
        assert!(!result.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_injected_failure_consumed_once() {
        let store = MemoryGameStore::new();
        store.inject_failure(RemoteError::Unavailable("down".into()));
        let payload = GamePayload::new("A", "B");
        let key = Uuid::new_v4();
        let first = store.create_game(key, &payload).await;
        assert!(matches!(first, Err(RemoteError::Unavailable(_))));
        let second = store.create_game(key, &payload).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_keyed_failure_is_sticky() {
        let store = MemoryGameStore::new();
        let key = Uuid::new_v4();
        store.fail_key(key, RemoteError::Rejected("bad quarter".into()));
        let payload = GamePayload::new("A", "B");
        for _ in 0..2 {
            let result = store.create_game(key, &payload).await;
            assert!(matches!(result, Err(RemoteError::Rejected(_))));
        }
        // Other keys are unaffected.
        assert!(store.create_game(Uuid::new_v4(), &payload).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_game() {
        let store = MemoryGameStore::new();
        let game = store
            .create_game(Uuid::new_v4(), &GamePayload::new("A", "B"))
            .await
            .expect("create");
        store
            .delete_game(Uuid::new_v4(), game)
            .await
            .expect("delete");
        assert_eq!(store.game_count(), 0);
    }
}
