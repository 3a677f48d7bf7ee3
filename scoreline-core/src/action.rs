//! Queued actions - the pending mutations held by the local action log.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{GameEventPayload, GameId, GamePayload, LocalId, QuarterScorePayload};

/// The mutation a queued action carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Create a new game.
    CreateGame(GamePayload),
    /// Update an existing game with a JSON merge object.
    UpdateGame(serde_json::Value),
    /// Append an in-game event.
    AppendEvent(GameEventPayload),
    /// Append an end-of-quarter score.
    AppendQuarterScore(QuarterScorePayload),
    /// Delete a game.
    DeleteGame,
}

impl ActionKind {
    /// Short name for logging and metrics labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateGame(_) => "create_game",
            Self::UpdateGame(_) => "update_game",
            Self::AppendEvent(_) => "append_event",
            Self::AppendQuarterScore(_) => "append_quarter_score",
            Self::DeleteGame => "delete_game",
        }
    }
}

/// Lifecycle state of a queued action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Waiting to be sent.
    Pending,
    /// Currently being sent to the remote store.
    InFlight,
    /// Failed with a retryable error; will be retried after backoff.
    Failed,
    /// Failed with a non-retryable error; requires manual retry or discard.
    TerminalFailed,
    /// Acknowledged by the remote store.
    Done,
}

impl ActionStatus {
    /// Whether a transition from `self` to `next` is allowed.
    ///
    /// The lifecycle is `pending -> in_flight -> {done | failed | terminal_failed}`,
    /// with `failed -> pending` for automatic retry and
    /// `{failed, terminal_failed} -> pending` for a manual retry.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InFlight)
                | (Self::InFlight, Self::Done)
                | (Self::InFlight, Self::Failed)
                | (Self::InFlight, Self::TerminalFailed)
                | (Self::Failed, Self::Pending)
                | (Self::Failed, Self::TerminalFailed)
                | (Self::TerminalFailed, Self::Pending)
        )
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Failed => "failed",
            Self::TerminalFailed => "terminal_failed",
            Self::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// Grouping key for the logical game an action belongs to.
///
/// Actions for the same key must reach the remote store in enqueue order;
/// actions for different keys are independent. Games born offline are keyed
/// by their `create_game` action's local ID until the server assigns a real
/// [`GameId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
#[serde(rename_all = "snake_case")]
pub enum EntityKey {
    /// Keyed by the create action's local ID (server ID not yet known).
    Local(LocalId),
    /// Keyed by the server-assigned game ID.
    Remote(GameId),
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(id) => write!(f, "local:{id}"),
            Self::Remote(id) => write!(f, "game:{id}"),
        }
    }
}

/// One pending mutation in the local action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    /// Locally generated unique identifier, stable across retries.
    ///
    /// Sent to the remote store as the idempotency key on every attempt.
    pub id: LocalId,
    /// The mutation itself.
    pub kind: ActionKind,
    /// The logical game this action belongs to.
    pub entity: EntityKey,
    /// Remote game ID, once known. `None` for actions targeting a game whose
    /// creation has not yet been acknowledged.
    pub target_id: Option<GameId>,
    /// Local enqueue timestamp (ms since epoch), used for ordering.
    pub created_at: u64,
    /// Number of sync attempts so far.
    pub attempt_count: u32,
    /// Current lifecycle state.
    pub status: ActionStatus,
    /// Earliest time (ms since epoch) the next attempt may run.
    ///
    /// Zero means "immediately"; set by the sync engine after a retryable
    /// failure according to the backoff curve.
    #[serde(default)]
    pub next_attempt_at: u64,
    /// Human-readable reason for the last failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedAction {
    /// Create a pending action for a game that already has a server ID.
    #[must_use]
    pub fn for_game(kind: ActionKind, game_id: GameId, created_at: u64) -> Self {
        Self {
            id: LocalId::new(),
            kind,
            entity: EntityKey::Remote(game_id),
            target_id: Some(game_id),
            created_at,
            attempt_count: 0,
            status: ActionStatus::Pending,
            next_attempt_at: 0,
            last_error: None,
        }
    }

    /// Create a pending `create_game` action. The action's own local ID
    /// becomes the entity key for dependents enqueued before the server
    /// acknowledges the creation.
    #[must_use]
    pub fn create_game(payload: GamePayload, created_at: u64) -> Self {
        let id = LocalId::new();
        Self {
            id,
            kind: ActionKind::CreateGame(payload),
            entity: EntityKey::Local(id),
            target_id: None,
            created_at,
            attempt_count: 0,
            status: ActionStatus::Pending,
            next_attempt_at: 0,
            last_error: None,
        }
    }

    /// Create a pending action targeting a game created offline (identified
    /// by its create action's local ID).
    #[must_use]
    pub fn for_local_game(kind: ActionKind, local_game: LocalId, created_at: u64) -> Self {
        Self {
            id: LocalId::new(),
            kind,
            entity: EntityKey::Local(local_game),
            target_id: None,
            created_at,
            attempt_count: 0,
            status: ActionStatus::Pending,
            next_attempt_at: 0,
            last_error: None,
        }
    }

    /// The idempotency key sent with this action's remote call.
    #[must_use]
    pub fn idempotency_key(&self) -> Uuid {
        self.id.as_uuid()
    }

    /// Whether this action is finished with a non-retryable error.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status == ActionStatus::TerminalFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_lifecycle_allowed() {
        use ActionStatus::{Done, Failed, InFlight, Pending, TerminalFailed};
        assert!(Pending.can_transition_to(InFlight));
        assert!(InFlight.can_transition_to(Done));
        assert!(InFlight.can_transition_to(Failed));
        assert!(InFlight.can_transition_to(TerminalFailed));
        assert!(Failed.can_transition_to(Pending));
        assert!(Failed.can_transition_to(TerminalFailed));
        assert!(TerminalFailed.can_transition_to(Pending));
    }

    #[test]
    fn test_status_lifecycle_rejected() {
        use ActionStatus::{Done, Failed, InFlight, Pending};
        // Done is final: never replayed
        assert!(!Done.can_transition_to(Pending));
        assert!(!Done.can_transition_to(InFlight));
        assert!(!Done.can_transition_to(Failed));
        // Cannot skip in_flight
        assert!(!Pending.can_transition_to(Done));
        assert!(!Pending.can_transition_to(Failed));
        // Failed actions go back through pending
        assert!(!Failed.can_transition_to(InFlight));
    }

    #[test]
    fn test_create_game_keys_entity_by_own_id() {
        let action = QueuedAction::create_game(GamePayload::new("A", "B"), 100);
        assert_eq!(action.entity, EntityKey::Local(action.id));
        assert!(action.target_id.is_none());
        assert_eq!(action.status, ActionStatus::Pending);
    }

    #[test]
    fn test_for_game_carries_target() {
        let game_id = GameId::new();
        let action = QueuedAction::for_game(ActionKind::DeleteGame, game_id, 100);
        assert_eq!(action.target_id, Some(game_id));
        assert_eq!(action.entity, EntityKey::Remote(game_id));
    }

    #[test]
    fn test_idempotency_key_stable() {
        let action = QueuedAction::create_game(GamePayload::new("A", "B"), 100);
        assert_eq!(action.idempotency_key(), action.id.as_uuid());
    }

    #[test]
    fn test_action_round_trips_through_json() {
        let action = QueuedAction::for_local_game(
            ActionKind::AppendQuarterScore(QuarterScorePayload {
                quarter: 2,
                home_points: 34,
                away_points: 28,
            }),
            LocalId::new(),
            42,
        );
        let json = serde_json::to_string(&action).expect("serialize");
        let restored: QueuedAction = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, action);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ActionKind::DeleteGame.name(), "delete_game");
        assert_eq!(
            ActionKind::CreateGame(GamePayload::new("A", "B")).name(),
            "create_game"
        );
    }
}
