//! qbank: chat client for the question-bank back office
//!
//! This library provides:
//! - Streaming chat turns decoded from SSE into typed events
//! - Task tracking and generated-question payload normalisation
//! - An authenticated request gateway with single-flight token refresh
//! - Typed calls for sign-in and chat sessions

pub mod api;
pub mod auth;
pub mod config;
pub mod stream;
pub mod transport;

pub use api::{ApiError, ChatClient};
pub use auth::{AuthGateway, AuthSession};
pub use config::Config;
pub use stream::{ChatEvent, TurnStream};
