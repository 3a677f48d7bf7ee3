//! HTTP client for the game API.
//!
//! [`HttpGameStore`] is the server-backed implementation of
//! [`RemoteGameStore`] used by real deployments; the core's sync engine
//! drains the local action log through it. Every request carries the
//! action's idempotency key, and HTTP failures are folded into the
//! retryable/terminal split the engine keys its backoff on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use scoreline_core::{
    GameEventPayload, GameId, GamePayload, QuarterScorePayload, RemoteError, RemoteGameStore,
};

use crate::routes::IDEMPOTENCY_HEADER;

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while constructing the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The base URL is malformed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// HTTP client failed to build.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Game API client backed by reqwest.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct HttpGameStore {
    inner: Arc<InnerClient>,
}

struct InnerClient {
    http: Client,
    base_url: Url,
}

impl HttpGameStore {
    /// Create a client for the given server base URL (e.g.
    /// `http://127.0.0.1:7267`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if the URL is malformed and
    /// [`ClientError::Http`] if the HTTP client fails to build.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if the URL is malformed and
    /// [`ClientError::Http`] if the HTTP client fails to build.
    pub fn with_timeout(
        base_url: impl AsRef<str>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let base_url =
            Url::parse(base_url.as_ref()).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        let http = Client::builder()
            .user_agent(format!("scoreline/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            inner: Arc::new(InnerClient { http, base_url }),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| RemoteError::Rejected(e.to_string()))
    }

    /// Map transport errors onto the engine's retryable/terminal split.
    fn transport_error(e: &reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout
        } else {
            RemoteError::Unavailable(e.to_string())
        }
    }

    /// Map a non-success status onto the engine's retryable/terminal split.
    /// Server errors are worth retrying; client errors never will be.
    async fn status_error(response: Response) -> RemoteError {
        let status = response.status();
        let detail = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("error").and_then(Value::as_str).map(String::from))
            .unwrap_or_else(|| status.to_string());
        match status {
            StatusCode::NOT_FOUND => RemoteError::NotFound(detail),
            s if s.is_server_error() => RemoteError::Unavailable(detail),
            _ => RemoteError::Rejected(detail),
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        idempotency_key: Uuid,
    ) -> Result<Response, RemoteError> {
        let response = request
            .header(IDEMPOTENCY_HEADER, idempotency_key.to_string())
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::status_error(response).await)
        }
    }
}

#[async_trait]
impl RemoteGameStore for HttpGameStore {
    async fn create_game(
        &self,
        idempotency_key: Uuid,
        payload: &GamePayload,
    ) -> Result<GameId, RemoteError> {
        let url = self.endpoint("/api/games")?;
        let response = self
            .send(self.inner.http.post(url).json(payload), idempotency_key)
            .await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| RemoteError::Rejected("create response missing game id".into()))?;
        Ok(GameId::from_uuid(id))
    }

    async fn update_game(
        &self,
        idempotency_key: Uuid,
        game_id: GameId,
        changes: &Value,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&format!("/api/games/{game_id}"))?;
        self.send(self.inner.http.put(url).json(changes), idempotency_key)
            .await?;
        Ok(())
    }

    async fn delete_game(
        &self,
        idempotency_key: Uuid,
        game_id: GameId,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&format!("/api/games/{game_id}"))?;
        self.send(self.inner.http.delete(url), idempotency_key)
            .await?;
        Ok(())
    }

    async fn append_game_event(
        &self,
        idempotency_key: Uuid,
        game_id: GameId,
        payload: &GameEventPayload,
    ) -> Result<Uuid, RemoteError> {
        let url = self.endpoint(&format!("/api/games/{game_id}/events"))?;
        let response = self
            .send(self.inner.http.post(url).json(payload), idempotency_key)
            .await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        body.get("event_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| RemoteError::Rejected("event response missing event id".into()))
    }

    async fn append_quarter_score(
        &self,
        idempotency_key: Uuid,
        game_id: GameId,
        payload: &QuarterScorePayload,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&format!("/api/games/{game_id}/quarter-scores"))?;
        self.send(self.inner.http.post(url).json(payload), idempotency_key)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for HttpGameStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGameStore")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_base_url() {
        assert!(matches!(
            HttpGameStore::new("not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_accepts_localhost_url() {
        let client = HttpGameStore::new("http://127.0.0.1:7267").expect("client");
        let url = client.endpoint("/api/games").expect("endpoint");
        assert_eq!(url.as_str(), "http://127.0.0.1:7267/api/games");
    }
}
