//! End-to-end sync tests over real HTTP.
//!
//! An [`OfflineClient`] backed by [`HttpGameStore`] drains its action log
//! against a live Axum server on a random port, exercising the same path a
//! scoreboard tablet takes at the field: record while offline, reconnect,
//! flush, verify the server state.

mod common {
    pub mod server;
}

use std::sync::Arc;

use common::server::TestServer;
use scoreline_core::{
    ActionLog, ConnectivityMonitor, DebounceConfig, GameEventPayload, GamePayload, OfflineClient,
    QuarterScorePayload, QueueConfig, RemoteGameStore, RetryConfig, TeamSide,
};
use scoreline_core::log::MemoryStorage;
use scoreline_server::HttpGameStore;

fn offline_client(server: &TestServer) -> OfflineClient {
    let (log, _) = ActionLog::open(Arc::new(MemoryStorage::new()), &QueueConfig::default())
        .expect("open log");
    let remote = HttpGameStore::new(server.base_url()).expect("client");
    let monitor = ConnectivityMonitor::with_initial_state(false, DebounceConfig { window_ms: 0 });
    OfflineClient::new(
        log,
        Arc::new(remote) as Arc<dyn RemoteGameStore>,
        monitor,
        RetryConfig::immediate(),
    )
}

fn sample_game() -> GamePayload {
    GamePayload {
        home_team: "Harbour Hawks".into(),
        away_team: "North End Gulls".into(),
        venue: Some("Memorial Park".into()),
        scheduled_at: None,
    }
}

fn goal(quarter: u8, clock_seconds: u32) -> GameEventPayload {
    GameEventPayload {
        quarter,
        clock_seconds,
        team: TeamSide::Home,
        player: Some("J. Okafor".into()),
        kind: "goal".into(),
    }
}

// ===========================================================================
// Test 1: Record a whole game offline, then sync everything on reconnect
// ===========================================================================

#[tokio::test]
async fn test_offline_game_syncs_on_reconnect() {
    let server = TestServer::start().await;
    let client = offline_client(&server);

    // Entered at the field with no signal: a game, two goals, a quarter score.
    let (local_game, _) = client.record_create_game(sample_game()).expect("create");
    client
        .record_event_local(local_game, goal(1, 65))
        .expect("goal 1");
    client
        .record_event_local(local_game, goal(1, 410))
        .expect("goal 2");
    client
        .record_quarter_score_local(
            local_game,
            QuarterScorePayload {
                quarter: 1,
                home_points: 12,
                away_points: 3,
            },
        )
        .expect("quarter score");
    assert_eq!(client.status().pending_count, 4);
    assert_eq!(server.games().game_count(), 0);

    // Back in coverage.
    client.monitor().set_online();
    let report = client.sync_now().await;
    assert!(report.ran);
    assert_eq!(report.completed, 4);
    assert_eq!(client.status().pending_count, 0);

    // Everything landed, in order, under the server-assigned id.
    let games = server.games().list();
    assert_eq!(games.len(), 1);
    let game = &games[0];
    assert_eq!(game.home_team, "Harbour Hawks");
    assert_eq!(game.events.len(), 2);
    assert_eq!(game.events[0].payload.clock_seconds, 65);
    assert_eq!(game.events[1].payload.clock_seconds, 410);
    assert_eq!(game.quarter_scores.len(), 1);

    server.shutdown().await;
}

// ===========================================================================
// Test 2: Replaying an acknowledged action never applies it twice
// ===========================================================================

#[tokio::test]
async fn test_idempotent_replay_over_http() {
    let server = TestServer::start().await;

    let remote = HttpGameStore::new(server.base_url()).expect("client");
    let key = uuid::Uuid::new_v4();

    let first = remote.create_game(key, &sample_game()).await.expect("create");
    // Same key again, as if the ack was lost and the client retried.
    let second = remote.create_game(key, &sample_game()).await.expect("replay");

    assert_eq!(first, second);
    assert_eq!(server.games().game_count(), 1);

    // Same for event appends.
    let event_key = uuid::Uuid::new_v4();
    let e1 = remote
        .append_game_event(event_key, first, &goal(2, 30))
        .await
        .expect("event");
    let e2 = remote
        .append_game_event(event_key, first, &goal(2, 30))
        .await
        .expect("event replay");
    assert_eq!(e1, e2);
    assert_eq!(
        server.games().get(first).expect("game").events.len(),
        1
    );

    server.shutdown().await;
}

// ===========================================================================
// Test 3: A terminally rejected action surfaces but does not block
//         actions for other games
// ===========================================================================

#[tokio::test]
async fn test_rejected_action_does_not_block_other_games() {
    let server = TestServer::start().await;
    let client = offline_client(&server);
    client.monitor().set_online();

    // Deleting a game the server has never seen fails with 404, which the
    // engine treats as terminal.
    client
        .record_delete_game(scoreline_core::GameId::new())
        .expect("record delete");
    // A valid create for an unrelated game queued after it.
    let (_, _) = client.record_create_game(sample_game()).expect("create");

    client.sync_now().await;

    let status = client.status();
    assert!(status.has_terminal_failures);
    assert_eq!(server.games().game_count(), 1, "unrelated game still synced");

    server.shutdown().await;
}

// ===========================================================================
// Test 4: Invalid payloads are rejected with a 4xx the engine treats
//         as terminal rather than retrying forever
// ===========================================================================

#[tokio::test]
async fn test_validation_failure_is_terminal() {
    let server = TestServer::start().await;
    let client = offline_client(&server);
    client.monitor().set_online();

    // Empty team name fails server-side validation.
    client
        .record_create_game(GamePayload::new("", "North End Gulls"))
        .expect("record");
    let report = client.sync_now().await;

    assert_eq!(report.terminal, 1);
    assert_eq!(report.retried, 0, "4xx must not be retried");
    assert!(client.status().has_terminal_failures);
    assert_eq!(server.games().game_count(), 0);

    server.shutdown().await;
}

// ===========================================================================
// Test 5: Mutations without an idempotency key are rejected
// ===========================================================================

#[tokio::test]
async fn test_missing_idempotency_key_rejected() {
    let server = TestServer::start().await;

    let http = reqwest::Client::new();
    let response = http
        .post(format!("{}/api/games", server.base_url()))
        .json(&sample_game())
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(server.games().game_count(), 0);

    server.shutdown().await;
}

// ===========================================================================
// Test 6: Reads are served without an idempotency key
// ===========================================================================

#[tokio::test]
async fn test_read_api_round_trip() {
    let server = TestServer::start().await;
    let client = offline_client(&server);
    client.monitor().set_online();

    client.record_create_game(sample_game()).expect("create");
    client.sync_now().await;

    let http = reqwest::Client::new();
    let games: serde_json::Value = http
        .get(format!("{}/api/games", server.base_url()))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    let list = games.as_array().expect("array");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["home_team"], "Harbour Hawks");

    let id = list[0]["id"].as_str().expect("id");
    let game: serde_json::Value = http
        .get(format!("{}/api/games/{id}", server.base_url()))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(game["venue"], "Memorial Park");

    server.shutdown().await;
}
