//! Message dispatch to the remote assistant service
//!
//! One request/response exchange per user turn, strictly serialized: a
//! send attempted while a request is in flight is rejected, never queued.
//! Failures are classified so the widget can substitute a fitting apology
//! for the reply. Nothing here retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Config;
use crate::events::{EngineEvent, EventSink};
use crate::history::Turn;

/// Request body sent to the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub message: String,
    pub session_id: String,
    pub history: Vec<Turn>,
}

#[derive(Deserialize)]
struct ReplyBody {
    response: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Failure class of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchErrorKind {
    /// Another request is still in flight
    Busy,
    /// Quota exhausted or rate limited
    RateLimited,
    /// Credentials rejected
    Authentication,
    /// Service-side failure
    Server,
    /// Service unreachable
    Network,
    /// Anything else
    Other,
}

impl DispatchErrorKind {
    /// User-facing text substituted for the assistant reply
    #[must_use]
    pub const fn apology(self) -> &'static str {
        match self {
            Self::Busy => "I'm still working on your previous message. One moment please.",
            Self::RateLimited => {
                "I'm receiving too many requests right now. Please wait a moment and try again."
            }
            Self::Authentication => {
                "I couldn't verify access to the assistant service. Please check the widget configuration."
            }
            Self::Server => {
                "The assistant service is having trouble right now. Please try again shortly."
            }
            Self::Network => {
                "I couldn't reach the assistant service. Please check your connection and try again."
            }
            Self::Other => "Sorry, something went wrong while getting a reply. Please try again.",
        }
    }
}

/// A classified dispatch failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DispatchError {
    pub kind: DispatchErrorKind,
    pub message: String,
}

impl DispatchError {
    #[must_use]
    pub fn new(kind: DispatchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn busy() -> Self {
        Self::new(DispatchErrorKind::Busy, "a request is already in flight")
    }

    /// Classify a non-2xx response
    ///
    /// `body_error` is the `error` field of the response body when it
    /// parsed; otherwise the message falls back to `API error: <status>`.
    #[must_use]
    pub fn from_status(status: u16, body_error: Option<String>) -> Self {
        let message = body_error.unwrap_or_else(|| format!("API error: {status}"));
        let lower = message.to_lowercase();

        let kind = if status == 429 || lower.contains("quota") || lower.contains("rate limit") {
            DispatchErrorKind::RateLimited
        } else if status == 401 || status == 403 {
            DispatchErrorKind::Authentication
        } else if (500..600).contains(&status) {
            DispatchErrorKind::Server
        } else {
            DispatchErrorKind::Other
        };

        Self::new(kind, message)
    }

    #[must_use]
    pub const fn apology(&self) -> &'static str {
        self.kind.apology()
    }
}

/// Remote message service contract
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Exchange one message for one reply
    ///
    /// # Errors
    ///
    /// Returns a classified error for any failed exchange
    async fn send(&self, request: &DispatchRequest) -> Result<String, DispatchError>;
}

/// Upper bound on one exchange; a stalled service must not hold the
/// in-flight slot forever
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// JSON-over-HTTP remote service
pub struct HttpRemoteService {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl HttpRemoteService {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            client: http_client(REQUEST_TIMEOUT),
            endpoint: endpoint.into(),
            api_key,
        }
    }

    /// Replace the default request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_endpoint.clone(), config.api_key.clone())
    }
}

#[async_trait]
impl RemoteService for HttpRemoteService {
    async fn send(&self, request: &DispatchRequest) -> Result<String, DispatchError> {
        tracing::debug!(
            endpoint = %self.endpoint,
            history = request.history.len(),
            "sending message"
        );

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key.expose_secret()));
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(error = %e, timed_out = e.is_timeout(), "assistant request failed");
            let message = if e.is_timeout() {
                "assistant service timed out".to_string()
            } else {
                e.to_string()
            };
            DispatchError::new(DispatchErrorKind::Network, message)
        })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body_error = serde_json::from_str::<ErrorBody>(&body).ok().map(|b| b.error);
            let err = DispatchError::from_status(status.as_u16(), body_error);
            tracing::error!(status = %status, kind = ?err.kind, error = %err, "assistant API error");
            return Err(err);
        }

        let reply: ReplyBody = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse assistant response");
            DispatchError::new(DispatchErrorKind::Other, format!("invalid response: {e}"))
        })?;

        Ok(reply.response)
    }
}

/// Serializes exchanges with the remote service
///
/// The in-flight flag is checked and set in the same synchronous call that
/// spawns the request, so two sends can never overlap. Completion comes
/// back as [`EngineEvent::DispatchFinished`]; the orchestrator then calls
/// [`MessageDispatcher::complete`].
pub struct MessageDispatcher {
    remote: Arc<dyn RemoteService>,
    session_id: String,
    events: EventSink,
    in_flight: bool,
}

impl MessageDispatcher {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteService>, session_id: String, events: EventSink) -> Self {
        Self {
            remote,
            session_id,
            events,
            in_flight: false,
        }
    }

    /// Start one exchange for `message`
    ///
    /// `history` is only called once the exchange has been accepted, so a
    /// rejected send leaves the caller's conversation untouched.
    ///
    /// # Errors
    ///
    /// Returns a `Busy` error, without sending anything, while a previous
    /// exchange is pending
    pub fn send(
        &mut self,
        message: &str,
        history: impl FnOnce() -> Vec<Turn>,
    ) -> Result<(), DispatchError> {
        if self.in_flight {
            tracing::debug!("dispatch rejected, request already in flight");
            return Err(DispatchError::busy());
        }
        self.in_flight = true;

        let request = DispatchRequest {
            message: message.to_string(),
            session_id: self.session_id.clone(),
            history: history(),
        };
        let remote = Arc::clone(&self.remote);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = remote.send(&request).await;
            events.emit(EngineEvent::DispatchFinished(result));
        });
        Ok(())
    }

    /// Clear the in-flight flag once the result has been handled
    pub const fn complete(&mut self) {
        self.in_flight = false;
    }

    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        let err = DispatchError::from_status(429, None);
        assert_eq!(err.kind, DispatchErrorKind::RateLimited);
        assert_eq!(err.message, "API error: 429");
    }

    #[test]
    fn test_classify_quota_message() {
        let err = DispatchError::from_status(400, Some("Monthly quota exceeded".to_string()));
        assert_eq!(err.kind, DispatchErrorKind::RateLimited);
        assert_eq!(err.message, "Monthly quota exceeded");
    }

    #[test]
    fn test_classify_auth() {
        assert_eq!(
            DispatchError::from_status(401, None).kind,
            DispatchErrorKind::Authentication
        );
        assert_eq!(
            DispatchError::from_status(403, None).kind,
            DispatchErrorKind::Authentication
        );
    }

    #[test]
    fn test_classify_server() {
        assert_eq!(DispatchError::from_status(500, None).kind, DispatchErrorKind::Server);
        assert_eq!(DispatchError::from_status(503, None).kind, DispatchErrorKind::Server);
    }

    #[test]
    fn test_classify_other() {
        assert_eq!(DispatchError::from_status(404, None).kind, DispatchErrorKind::Other);
    }

    #[test]
    fn test_apologies_are_distinct() {
        let kinds = [
            DispatchErrorKind::RateLimited,
            DispatchErrorKind::Authentication,
            DispatchErrorKind::Server,
            DispatchErrorKind::Network,
            DispatchErrorKind::Other,
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a.apology(), b.apology(), "{a:?} and {b:?} share an apology");
            }
        }
    }

    #[test]
    fn test_request_wire_format() {
        let request = DispatchRequest {
            message: "hello".to_string(),
            session_id: "web_abc".to_string(),
            history: vec![Turn::user("earlier"), Turn::assistant("reply")],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "message": "hello",
                "sessionId": "web_abc",
                "history": [
                    {"role": "user", "content": "earlier"},
                    {"role": "assistant", "content": "reply"}
                ]
            })
        );
    }
}
