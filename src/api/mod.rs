//! Back-office API client
//!
//! [`ChatClient`] wraps an [`AuthGateway`] with the typed calls the question
//! bank uses: sign-in, chat sessions, session history, and streamed turns.

mod error;
mod types;

pub use error::ApiError;
pub use types::{
    ChatSessionEvent, ChatSessionEvents, ChatSessionResponse, CreateChatSessionRequest,
    SendChatMessageRequest, SignInRequest, SignInResponse,
};

use crate::auth::{ApiRequest, AuthGateway, AuthSession, SessionStore};
use crate::config::{Config, StreamConfig};
use crate::stream::{ChatCallback, TurnError, TurnStream};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use types::ChatSessionEventsPayload;

pub struct ChatClient {
    gateway: Arc<AuthGateway>,
    idle_timeout: Duration,
}

impl ChatClient {
    pub fn new(gateway: Arc<AuthGateway>, stream: &StreamConfig) -> Self {
        Self {
            gateway,
            idle_timeout: Duration::from_secs(stream.idle_timeout_secs),
        }
    }

    /// Build a client (and its gateway) from configuration
    pub async fn from_config(config: &Config, store: Arc<dyn SessionStore>) -> anyhow::Result<Self> {
        let gateway = AuthGateway::connect(config, store).await?;
        Ok(Self::new(Arc::new(gateway), &config.stream))
    }

    pub fn gateway(&self) -> &Arc<AuthGateway> {
        &self.gateway
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignInResponse, ApiError> {
        let body = serde_json::to_value(SignInRequest { email, password })
            .map_err(|e| ApiError::Other(e.into()))?;
        let response: SignInResponse = self
            .json(ApiRequest::post("/user-sessions").json(body))
            .await?;

        let mut session = AuthSession::new(response.token.clone()).with_expires_at(response.expires_at);
        session.refresh_token = response.refresh_token.clone();
        self.gateway.set_session(session).await?;

        tracing::info!(target: "auth", expires_at = %response.expires_at, "Signed in");
        Ok(response)
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        self.gateway.clear_session().await?;
        tracing::info!(target: "auth", "Signed out");
        Ok(())
    }

    pub async fn create_chat_session(
        &self,
        request: &CreateChatSessionRequest,
    ) -> Result<ChatSessionResponse, ApiError> {
        let body = serde_json::to_value(request).map_err(|e| ApiError::Other(e.into()))?;
        self.json(ApiRequest::post("/chat-sessions").json(body)).await
    }

    pub async fn get_chat_session(&self, session_id: &str) -> Result<ChatSessionResponse, ApiError> {
        self.json(ApiRequest::get(format!("/chat-sessions/{}", session_id)))
            .await
    }

    /// Stored history of a session, oldest first
    pub async fn get_chat_session_events(
        &self,
        session_id: &str,
    ) -> Result<ChatSessionEvents, ApiError> {
        let payload: ChatSessionEventsPayload = self
            .json(ApiRequest::get(format!("/chat-sessions/{}/events", session_id)))
            .await?;
        let mut events = payload.into_events(session_id);
        events.events.sort_by_key(ChatSessionEvent::order);
        tracing::debug!(target: "chat", session_id, count = events.events.len(), "Loaded session events");
        Ok(events)
    }

    /// Start a chat turn
    ///
    /// Never fails: a stream that cannot be opened yields a single
    /// [`ChatEvent::Error`](crate::stream::ChatEvent::Error).
    pub async fn send_message(
        &self,
        session_id: &str,
        message: &str,
        image_file_ids: &[String],
    ) -> TurnStream {
        let body = match serde_json::to_value(SendChatMessageRequest {
            message,
            image_file_ids,
        }) {
            Ok(body) => body,
            Err(e) => return TurnStream::failed(TurnError::Api(ApiError::Other(e.into()))),
        };

        let request = ApiRequest::post(format!("/chat-sessions/{}/response", session_id))
            .json(body)
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .streaming();

        tracing::debug!(
            target: "chat",
            session_id,
            images = image_file_ids.len(),
            "Sending chat message"
        );
        match self.gateway.execute(request).await {
            Ok(response) => TurnStream::from_body(response.bytes_stream(), self.idle_timeout),
            Err(e) => TurnStream::failed(TurnError::Api(e)),
        }
    }

    /// Run a chat turn to completion, delivering every event to `callback`
    pub async fn send_message_with(
        &self,
        session_id: &str,
        message: &str,
        image_file_ids: &[String],
        callback: ChatCallback,
    ) {
        self.send_message(session_id, message, image_file_ids)
            .await
            .run(callback)
            .await
    }

    async fn json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.gateway.execute(request).await?;
        response.json::<T>().await.map_err(ApiError::from_network_error)
    }
}
