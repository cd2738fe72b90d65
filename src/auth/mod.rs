//! Login session and authenticated request handling
//!
//! [`AuthGateway`] attaches the bearer token to every API call and runs the
//! single-flight refresh when the server answers 401. Token persistence is
//! behind the [`SessionStore`] trait.

mod gateway;
mod token_store;

pub use gateway::{ApiRequest, AuthGateway, RefreshState};
pub use token_store::FileSessionStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Tokens for the signed-in user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// When the access token stops being accepted, if known
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            ..Default::default()
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// True when an expiry is known and has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    pub fn is_signed_in(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Persistence for [`AuthSession`]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stored session, `None` when signed out
    async fn load(&self) -> Result<Option<AuthSession>>;

    async fn save(&self, session: &AuthSession) -> Result<()>;

    /// Remove every stored token
    async fn clear(&self) -> Result<()>;
}

/// Process-local store, nothing survives a restart
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<AuthSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: AuthSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }

    /// Current contents, for inspection
    pub fn snapshot(&self) -> Option<AuthSession> {
        self.session.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<AuthSession>> {
        Ok(self.snapshot())
    }

    async fn save(&self, session: &AuthSession) -> Result<()> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("session store lock poisoned"))?;
        *guard = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("session store lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}
