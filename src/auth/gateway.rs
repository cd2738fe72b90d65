//! Bearer-token gateway with single-flight refresh
//!
//! Every API call goes through [`AuthGateway::execute`]. A 401 moves the
//! gateway from `Idle` to `Refreshing`; requests that hit 401 while a
//! refresh is running queue behind it and are replayed with the new token
//! instead of starting their own refresh.

use super::{AuthSession, SessionStore};
use crate::api::ApiError;
use crate::config::Config;
use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;

/// Replayable description of an API call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL (or an absolute URL)
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    streaming: bool,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            streaming: false,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Long-lived response body: no overall request timeout is applied
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// True once this request has been replayed after a refresh
    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

/// Refresh state of one gateway
#[derive(Debug, Default)]
pub enum RefreshState {
    #[default]
    Idle,
    /// A refresh call is in flight; each waiter receives the new access
    /// token, or `None` when the refresh failed
    Refreshing {
        waiters: Vec<oneshot::Sender<Option<String>>>,
    },
}

impl RefreshState {
    pub fn is_refreshing(&self) -> bool {
        matches!(self, RefreshState::Refreshing { .. })
    }

    fn take_waiters(&mut self) -> Vec<oneshot::Sender<Option<String>>> {
        match std::mem::take(self) {
            RefreshState::Idle => Vec::new(),
            RefreshState::Refreshing { waiters } => waiters,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    session: AuthSession,
    refresh: RefreshState,
}

/// Refresh endpoint response
#[derive(Debug, Deserialize)]
struct RefreshEnvelope {
    data: RefreshData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshData {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

enum RefreshRole {
    /// Token already rotated since the request was sent
    Current(String),
    Leader,
    Follower(oneshot::Receiver<Option<String>>),
}

type ExpiredHook = Box<dyn Fn() + Send + Sync>;

pub struct AuthGateway {
    client: reqwest::Client,
    base_url: String,
    public_endpoints: Vec<String>,
    refresh_path: String,
    request_timeout: Duration,
    token_ttl: chrono::Duration,
    store: Arc<dyn SessionStore>,
    inner: Mutex<Inner>,
    on_expired: Option<ExpiredHook>,
}

impl AuthGateway {
    /// Create a gateway and load the stored session
    pub async fn connect(config: &Config, store: Arc<dyn SessionStore>) -> anyhow::Result<Self> {
        let session = store.load().await?.unwrap_or_default();
        tracing::debug!(
            target: "auth",
            signed_in = session.is_signed_in(),
            "Loaded session"
        );

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.api.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            public_endpoints: config.api.public_endpoints.clone(),
            refresh_path: config.auth.refresh_path.clone(),
            request_timeout: Duration::from_secs(config.api.request_timeout_secs),
            token_ttl: chrono::Duration::seconds(config.auth.token_ttl_secs as i64),
            store,
            inner: Mutex::new(Inner {
                session,
                refresh: RefreshState::Idle,
            }),
            on_expired: None,
        })
    }

    /// Register the consumer's reaction to a lost session (e.g. go to login)
    ///
    /// Called once per failed refresh, never for public endpoints.
    pub fn on_session_expired(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_expired = Some(Box::new(hook));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Snapshot of the current session
    pub fn session(&self) -> AuthSession {
        self.lock().session.clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().refresh.is_refreshing()
    }

    /// Replace the session (after sign-in) and persist it
    pub async fn set_session(&self, session: AuthSession) -> Result<(), ApiError> {
        self.store.save(&session).await?;
        self.lock().session = session;
        Ok(())
    }

    /// Drop every token, in memory and in the store
    pub async fn clear_session(&self) -> Result<(), ApiError> {
        self.lock().session = AuthSession::default();
        self.store.clear().await?;
        Ok(())
    }

    /// True when a 401 from `path` must not touch the session
    pub fn is_public(&self, path: &str) -> bool {
        self.public_endpoints
            .iter()
            .any(|endpoint| path.contains(endpoint.as_str()))
    }

    /// Send an authenticated request
    ///
    /// Returns the response only for 2xx statuses. A 401 is answered with one
    /// refresh-and-replay; other statuses map through
    /// [`ApiError::from_http_status`].
    pub async fn execute(&self, request: ApiRequest) -> Result<reqwest::Response, ApiError> {
        let mut request = request;
        let mut token = self.token_for(&mut request).await?;

        loop {
            let response = self.send(&request, token.as_deref()).await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            if status != StatusCode::UNAUTHORIZED {
                return Err(ApiError::from_http_status(status, body));
            }

            if self.is_public(&request.path) {
                tracing::warn!(target: "auth", path = %request.path, "401 from public endpoint");
                return Err(ApiError::Unauthorized(body));
            }
            if request.retried || request.path.contains(self.refresh_path.as_str()) {
                return Err(ApiError::Unauthorized(body));
            }

            request.retried = true;
            let fresh = self.refreshed_token(token.as_deref()).await?;
            tracing::debug!(target: "auth", path = %request.path, "Replaying request with refreshed token");
            token = Some(fresh);
        }
    }

    /// Token to attach, refreshing first when the session is known expired
    async fn token_for(&self, request: &mut ApiRequest) -> Result<Option<String>, ApiError> {
        let session = self.session();
        if self.is_public(&request.path) || !session.is_expired(Utc::now()) {
            return Ok(session.access_token);
        }

        if session.refresh_token.is_none() {
            tracing::info!(target: "auth", "Access token expired and no refresh token is stored");
            self.expire_session().await;
            return Err(ApiError::SessionExpired("access token expired".to_string()));
        }

        tracing::info!(target: "auth", "Access token expired, refreshing before request");
        request.retried = true;
        let token = self.refreshed_token(session.access_token.as_deref()).await?;
        Ok(Some(token))
    }

    /// Single-flight refresh
    ///
    /// `stale` is the token the failed request carried.
    async fn refreshed_token(&self, stale: Option<&str>) -> Result<String, ApiError> {
        let role = {
            let mut inner = self.lock();
            let now = Utc::now();
            match inner.session.access_token.clone() {
                Some(current)
                    if Some(current.as_str()) != stale
                        && !inner.refresh.is_refreshing()
                        && !inner.session.is_expired(now) =>
                {
                    RefreshRole::Current(current)
                }
                _ if inner.refresh.is_refreshing() => {
                    let (tx, rx) = oneshot::channel();
                    if let RefreshState::Refreshing { waiters } = &mut inner.refresh {
                        waiters.push(tx);
                    }
                    RefreshRole::Follower(rx)
                }
                _ => {
                    inner.refresh = RefreshState::Refreshing {
                        waiters: Vec::new(),
                    };
                    RefreshRole::Leader
                }
            }
        };

        match role {
            RefreshRole::Current(token) => Ok(token),
            RefreshRole::Follower(rx) => {
                tracing::debug!(target: "auth", "Waiting for in-flight token refresh");
                match rx.await {
                    Ok(Some(token)) => Ok(token),
                    Ok(None) => Err(ApiError::SessionExpired("token refresh failed".to_string())),
                    Err(_) => Err(ApiError::Other(anyhow::anyhow!(
                        "token refresh was cancelled"
                    ))),
                }
            }
            RefreshRole::Leader => self.lead_refresh().await,
        }
    }

    async fn lead_refresh(&self) -> Result<String, ApiError> {
        let guard = RefreshGuard {
            gateway: self,
            armed: true,
        };
        tracing::info!(target: "auth", "Refreshing access token");

        match self.call_refresh().await {
            Ok(session) => {
                if let Err(e) = self.store.save(&session).await {
                    tracing::warn!(target: "auth", "Failed to persist refreshed session: {}", e);
                }
                let token = session.access_token.clone().unwrap_or_default();
                let waiters = {
                    let mut inner = self.lock();
                    inner.session = session;
                    inner.refresh.take_waiters()
                };
                guard.disarm();

                tracing::info!(
                    target: "auth",
                    queued = waiters.len(),
                    "Token refreshed, replaying queued requests"
                );
                for waiter in waiters {
                    let _ = waiter.send(Some(token.clone()));
                }
                Ok(token)
            }
            Err(e) => {
                tracing::warn!(target: "auth", error = %e, "Token refresh failed, clearing session");
                let waiters = {
                    let mut inner = self.lock();
                    inner.session = AuthSession::default();
                    inner.refresh.take_waiters()
                };
                guard.disarm();

                for waiter in waiters {
                    let _ = waiter.send(None);
                }
                if let Err(e) = self.store.clear().await {
                    tracing::warn!(target: "auth", "Failed to clear stored session: {}", e);
                }
                self.notify_expired();
                let reason = match e {
                    ApiError::SessionExpired(reason) => reason,
                    other => other.to_string(),
                };
                Err(ApiError::SessionExpired(reason))
            }
        }
    }

    async fn call_refresh(&self) -> Result<AuthSession, ApiError> {
        let refresh_token = self
            .lock()
            .session
            .refresh_token
            .clone()
            .ok_or_else(|| ApiError::SessionExpired("no refresh token".to_string()))?;

        let response = self
            .client
            .get(self.url(&self.refresh_path))
            .header("refreshToken", format!("Bearer {}", refresh_token))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(ApiError::from_network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_http_status(status, text));
        }

        let envelope: RefreshEnvelope = response
            .json()
            .await
            .map_err(ApiError::from_network_error)?;

        Ok(AuthSession {
            access_token: Some(envelope.data.access_token),
            // keep the old refresh token when the server does not rotate it
            refresh_token: Some(envelope.data.refresh_token.unwrap_or(refresh_token)),
            expires_at: Some(Utc::now() + self.token_ttl),
        })
    }

    async fn expire_session(&self) {
        self.lock().session = AuthSession::default();
        if let Err(e) = self.store.clear().await {
            tracing::warn!(target: "auth", "Failed to clear stored session: {}", e);
        }
        self.notify_expired();
    }

    fn notify_expired(&self) {
        if let Some(hook) = &self.on_expired {
            hook();
        }
    }

    async fn send(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path));

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if !request.streaming {
            builder = builder.timeout(self.request_timeout);
        }

        tracing::debug!(
            target: "auth",
            method = %request.method,
            path = %request.path,
            retried = request.retried,
            "Sending request"
        );
        builder.send().await.map_err(ApiError::from_network_error)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Returns the gateway to `Idle` if the refreshing future is dropped
struct RefreshGuard<'a> {
    gateway: &'a AuthGateway,
    armed: bool,
}

impl RefreshGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(target: "auth", "Token refresh abandoned");
            // dropping the senders fails every queued request
            let _ = self.gateway.lock().refresh.take_waiters();
        }
    }
}
