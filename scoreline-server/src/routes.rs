//! API route handlers.
//!
//! Every mutation requires an `x-idempotency-key` header carrying the
//! client's local action id. Replays of an already applied key return the
//! original outcome with `200 OK` instead of applying twice, which is what
//! lets offline clients retry blindly after a lost acknowledgement.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use scoreline_core::{GameEventPayload, GameId, GamePayload, QuarterScorePayload};

use crate::store::StoreError;
use crate::validation::{self, ValidationError};
use crate::{metrics, AppState};

/// Header carrying the client's idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";

/// API error with its HTTP mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Store-level failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::GameNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::InvalidPayload(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the `/api` routes.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/games", get(list_games).post(create_game))
        .route(
            "/api/games/{id}",
            get(get_game).put(update_game).delete(delete_game),
        )
        .route("/api/games/{id}/events", axum::routing::post(append_event))
        .route(
            "/api/games/{id}/quarter-scores",
            axum::routing::post(append_quarter_score),
        )
}

/// Extract and validate the idempotency key header.
fn idempotency_key(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let value = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ValidationError::InvalidIdempotencyKey)?;
    Ok(validation::parse_idempotency_key(value)?)
}

fn check_game_payload(payload: &GamePayload) -> Result<(), ValidationError> {
    validation::validate_team_name(&payload.home_team)?;
    validation::validate_team_name(&payload.away_team)?;
    validation::validate_venue(payload.venue.as_deref())?;
    Ok(())
}

fn check_event_payload(payload: &GameEventPayload) -> Result<(), ValidationError> {
    validation::validate_quarter(payload.quarter)?;
    validation::validate_clock(payload.clock_seconds)?;
    validation::validate_event_kind(&payload.kind)?;
    validation::validate_player(payload.player.as_deref())?;
    Ok(())
}

/// Create a game.
#[tracing::instrument(name = "create_game", skip(state, headers, payload))]
async fn create_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<GamePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let key = idempotency_key(&headers)?;
    if let Err(e) = check_game_payload(&payload) {
        metrics::record_validation_failure("game");
        return Err(e.into());
    }
    let id = state.games.create_game(key, &payload)?;
    metrics::record_mutation("create_game", true);
    metrics::set_games_stored(state.games.game_count());
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// List all games.
#[tracing::instrument(name = "list_games", skip(state))]
async fn list_games(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.games.list())
}

/// Get a single game with its events and quarter scores.
#[tracing::instrument(name = "get_game", skip(state))]
async fn get_game(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let game_id = GameId::from_uuid(id);
    let record = state
        .games
        .get(game_id)
        .ok_or(StoreError::GameNotFound(game_id))?;
    Ok(Json(record))
}

/// Merge a partial update into a game.
#[tracing::instrument(name = "update_game", skip(state, headers, changes))]
async fn update_game(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(changes): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    let key = idempotency_key(&headers)?;
    if let Some(home) = changes.get("home_team").and_then(|v| v.as_str()) {
        validation::validate_team_name(home)?;
    }
    if let Some(away) = changes.get("away_team").and_then(|v| v.as_str()) {
        validation::validate_team_name(away)?;
    }
    if let Some(venue) = changes.get("venue").and_then(|v| v.as_str()) {
        validation::validate_venue(Some(venue))?;
    }
    state.games.update_game(key, GameId::from_uuid(id), &changes)?;
    metrics::record_mutation("update_game", true);
    Ok(Json(json!({ "status": "ok" })))
}

/// Delete a game.
#[tracing::instrument(name = "delete_game", skip(state, headers))]
async fn delete_game(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let key = idempotency_key(&headers)?;
    state.games.delete_game(key, GameId::from_uuid(id))?;
    metrics::record_mutation("delete_game", true);
    metrics::set_games_stored(state.games.game_count());
    Ok(Json(json!({ "status": "ok" })))
}

/// Append a scoring event to a game.
#[tracing::instrument(name = "append_event", skip(state, headers, payload))]
async fn append_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<GameEventPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let key = idempotency_key(&headers)?;
    if let Err(e) = check_event_payload(&payload) {
        metrics::record_validation_failure("event");
        return Err(e.into());
    }
    let event_id = state
        .games
        .append_event(key, GameId::from_uuid(id), &payload)?;
    metrics::record_mutation("append_event", true);
    Ok((StatusCode::CREATED, Json(json!({ "event_id": event_id }))))
}

/// Append a quarter score to a game.
#[tracing::instrument(name = "append_quarter_score", skip(state, headers, payload))]
async fn append_quarter_score(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<QuarterScorePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let key = idempotency_key(&headers)?;
    if let Err(e) = validation::validate_quarter(payload.quarter)
        .and_then(|()| validation::validate_points(payload.home_points, payload.away_points))
    {
        metrics::record_validation_failure("quarter_score");
        return Err(e.into());
    }
    state
        .games
        .append_quarter_score(key, GameId::from_uuid(id), &payload)?;
    metrics::record_mutation("append_quarter_score", true);
    Ok((StatusCode::CREATED, Json(json!({ "status": "ok" }))))
}
