//! Request and response bodies of the back-office API

use crate::stream::{Speaker, TaskPhase, ThreadMessageContent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct SignInRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatSessionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_question_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_solution_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selections: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionResponse {
    pub id: String,
    #[serde(default)]
    pub event_count: u64,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub html_question_content: Option<String>,
    #[serde(default)]
    pub html_solution_content: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub selections: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of a chat turn request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendChatMessageRequest<'a> {
    pub message: &'a str,
    pub image_file_ids: &'a [String],
}

/// Stored history entry of a chat session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatSessionEvent {
    #[serde(rename_all = "camelCase")]
    Message {
        id: String,
        #[serde(default)]
        order: i64,
        created_at: DateTime<Utc>,
        speaker: Speaker,
        #[serde(default)]
        contents: Vec<ThreadMessageContent>,
    },
    #[serde(rename_all = "camelCase")]
    Task {
        id: String,
        #[serde(default)]
        order: i64,
        created_at: DateTime<Utc>,
        task_id: String,
        task_type: String,
        task_phase: TaskPhase,
    },
}

impl ChatSessionEvent {
    pub fn order(&self) -> i64 {
        match self {
            ChatSessionEvent::Message { order, .. } | ChatSessionEvent::Task { order, .. } => *order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionEvents {
    pub events: Vec<ChatSessionEvent>,
    pub session_id: String,
}

/// The events endpoint answers either shape
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ChatSessionEventsPayload {
    Wrapped(ChatSessionEvents),
    Bare(Vec<ChatSessionEvent>),
}

impl ChatSessionEventsPayload {
    pub(crate) fn into_events(self, session_id: &str) -> ChatSessionEvents {
        match self {
            ChatSessionEventsPayload::Wrapped(events) => events,
            ChatSessionEventsPayload::Bare(events) => ChatSessionEvents {
                events,
                session_id: session_id.to_string(),
            },
        }
    }
}
