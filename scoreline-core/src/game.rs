//! Game domain types - the payloads that flow through the sync queue.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Server-assigned identifier for a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameId(Uuid);

impl GameId {
    /// Create a new unique game ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for GameId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-generated identifier for a queued action.
///
/// Stable across retries, so it doubles as the idempotency key sent with
/// every remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalId(Uuid);

impl LocalId {
    /// Create a new unique local ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the scoreboard an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamSide {
    /// The home team.
    Home,
    /// The away team.
    Away,
}

/// Fields for creating a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamePayload {
    /// Home team name.
    pub home_team: String,
    /// Away team name.
    pub away_team: String,
    /// Where the game is played, if known.
    pub venue: Option<String>,
    /// Scheduled start time (ms since epoch), if known.
    pub scheduled_at: Option<u64>,
}

impl GamePayload {
    /// Create a payload with just the two team names.
    #[must_use]
    pub fn new(home_team: impl Into<String>, away_team: impl Into<String>) -> Self {
        Self {
            home_team: home_team.into(),
            away_team: away_team.into(),
            venue: None,
            scheduled_at: None,
        }
    }
}

/// A single in-game event (goal, point, foul, substitution, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEventPayload {
    /// Quarter the event occurred in (1-based).
    pub quarter: u8,
    /// Game clock at the event, in seconds from the start of the quarter.
    pub clock_seconds: u32,
    /// Which team the event is credited to.
    pub team: TeamSide,
    /// Player name or number, if recorded.
    pub player: Option<String>,
    /// Event kind identifier (e.g. "goal", "behind", "foul").
    ///
    /// Kept as a string so community leagues can use their own vocabularies.
    pub kind: String,
}

/// End-of-quarter running score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterScorePayload {
    /// Quarter the score closes (1-based).
    pub quarter: u8,
    /// Home side total points at the end of the quarter.
    pub home_points: u32,
    /// Away side total points at the end of the quarter.
    pub away_points: u32,
}

/// Get the current Unix timestamp in milliseconds.
#[must_use]
pub fn timestamp_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| {
        // Timestamp will not exceed u64 max for millennia
        #[allow(clippy::cast_possible_truncation)]
        {
            d.as_millis() as u64
        }
    })
}
