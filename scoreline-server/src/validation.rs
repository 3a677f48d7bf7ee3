//! Input validation for untrusted data.
//!
//! All user-supplied input MUST be validated before use.
//! This module provides validators for the game API payloads.

use thiserror::Error;
use uuid::Uuid;

/// Maximum length for team names.
pub const MAX_TEAM_NAME_LEN: usize = 100;
/// Maximum length for venue names.
pub const MAX_VENUE_LEN: usize = 200;
/// Maximum length for player names.
pub const MAX_PLAYER_NAME_LEN: usize = 100;
/// Maximum length for event kinds.
pub const MAX_EVENT_KIND_LEN: usize = 32;
/// Maximum quarter number (allows for overtime periods).
pub const MAX_QUARTER: u8 = 12;
/// Maximum points recorded in a single quarter.
pub const MAX_QUARTER_POINTS: u32 = 500;
/// Maximum game clock value in seconds (covers long halves with stoppage).
pub const MAX_CLOCK_SECONDS: u32 = 7_200;

/// Validation error types.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Team name is empty or exceeds maximum length.
    #[error("team name must be 1-{MAX_TEAM_NAME_LEN} chars")]
    InvalidTeamName,
    /// Venue exceeds maximum length.
    #[error("venue too long (max {MAX_VENUE_LEN} chars)")]
    VenueTooLong,
    /// Player name exceeds maximum length.
    #[error("player name too long (max {MAX_PLAYER_NAME_LEN} chars)")]
    PlayerNameTooLong,
    /// Event kind is empty, too long, or contains invalid characters.
    #[error("event kind must be 1-{MAX_EVENT_KIND_LEN} chars (alphanumeric, hyphen, underscore)")]
    InvalidEventKind,
    /// Quarter number out of range.
    #[error("quarter must be 1-{MAX_QUARTER}")]
    InvalidQuarter,
    /// Quarter points out of range.
    #[error("quarter points exceed {MAX_QUARTER_POINTS}")]
    PointsOutOfRange,
    /// Game clock out of range.
    #[error("clock exceeds {MAX_CLOCK_SECONDS} seconds")]
    ClockOutOfRange,
    /// The idempotency key header is missing or not a UUID.
    #[error("x-idempotency-key must be a UUID")]
    InvalidIdempotencyKey,
}

/// Check if a character is valid for event kinds (alphanumeric, hyphen, or underscore).
fn is_valid_kind_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

/// Validate a team name.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidTeamName`] if the name is empty or
/// exceeds 100 characters.
pub fn validate_team_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.len() > MAX_TEAM_NAME_LEN {
        return Err(ValidationError::InvalidTeamName);
    }
    Ok(())
}

/// Validate an optional venue name.
///
/// # Errors
///
/// Returns [`ValidationError::VenueTooLong`] if the venue exceeds 200 characters.
pub fn validate_venue(venue: Option<&str>) -> Result<(), ValidationError> {
    if venue.is_some_and(|v| v.len() > MAX_VENUE_LEN) {
        return Err(ValidationError::VenueTooLong);
    }
    Ok(())
}

/// Validate an optional player name.
///
/// # Errors
///
/// Returns [`ValidationError::PlayerNameTooLong`] if the name exceeds 100 characters.
pub fn validate_player(player: Option<&str>) -> Result<(), ValidationError> {
    if player.is_some_and(|p| p.len() > MAX_PLAYER_NAME_LEN) {
        return Err(ValidationError::PlayerNameTooLong);
    }
    Ok(())
}

/// Validate an event kind.
///
/// Valid kinds:
/// - 1-32 characters
/// - Alphanumeric, hyphen, underscore only ("goal", "free_kick", "yellow-card")
///
/// # Errors
///
/// Returns [`ValidationError::InvalidEventKind`] otherwise.
pub fn validate_event_kind(kind: &str) -> Result<(), ValidationError> {
    if kind.is_empty() || kind.len() > MAX_EVENT_KIND_LEN || !kind.chars().all(is_valid_kind_char) {
        return Err(ValidationError::InvalidEventKind);
    }
    Ok(())
}

/// Validate a quarter number.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidQuarter`] if the quarter is 0 or greater
/// than 12.
pub fn validate_quarter(quarter: u8) -> Result<(), ValidationError> {
    if quarter == 0 || quarter > MAX_QUARTER {
        return Err(ValidationError::InvalidQuarter);
    }
    Ok(())
}

/// Validate quarter points.
///
/// # Errors
///
/// Returns [`ValidationError::PointsOutOfRange`] if either side exceeds 500.
pub fn validate_points(home: u32, away: u32) -> Result<(), ValidationError> {
    if home > MAX_QUARTER_POINTS || away > MAX_QUARTER_POINTS {
        return Err(ValidationError::PointsOutOfRange);
    }
    Ok(())
}

/// Validate a game clock value.
///
/// # Errors
///
/// Returns [`ValidationError::ClockOutOfRange`] if the clock exceeds 2 hours.
pub fn validate_clock(clock_seconds: u32) -> Result<(), ValidationError> {
    if clock_seconds > MAX_CLOCK_SECONDS {
        return Err(ValidationError::ClockOutOfRange);
    }
    Ok(())
}

/// Parse and validate an idempotency key header value.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidIdempotencyKey`] if the value is not a UUID.
pub fn parse_idempotency_key(value: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(value.trim()).map_err(|_| ValidationError::InvalidIdempotencyKey)
}
