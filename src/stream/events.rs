//! Wire types for the chat turn event stream
//!
//! Every frame of `POST /chat-sessions/{id}/response` carries one JSON object
//! tagged by `type`. Task events keep their task-specific fields in `extra`
//! because the set differs per `taskType`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Decoded event from the turn stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ThreadEvent {
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: Value,
    },
    #[serde(rename = "task")]
    Task(TaskEvent),
    #[serde(rename = "assistant-chat-partial-content", rename_all = "camelCase")]
    PartialContent { partial_content: String },
    #[serde(rename = "assistant-chat-complete")]
    Complete { message: ThreadMessage },
    #[serde(rename = "turn-end")]
    TurnEnd,
}

/// Phase of a server-side task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    Pre,
    Post,
    Error,
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPhase::Pre => "pre",
            TaskPhase::Post => "post",
            TaskPhase::Error => "error",
        }
    }
}

/// `task` frame: a named unit of server work with a phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    #[serde(default)]
    pub id: String,
    pub task_type: String,
    pub phase: TaskPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Task-type-specific fields (e.g. generated question content)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskEvent {
    pub fn state(&self) -> TaskState {
        TaskState {
            task_type: self.task_type.clone(),
            phase: self.phase,
        }
    }

    /// True for the `generate-question`/`post` event that carries a payload
    pub fn is_question_generated(&self) -> bool {
        self.task_type == GENERATE_QUESTION && self.phase == TaskPhase::Post
    }
}

pub const PROCESSING: &str = "processing";
pub const GENERATE_QUESTION: &str = "generate-question";
pub const READ_QUESTION: &str = "read-question";

/// Latest known task for a turn
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskState {
    pub task_type: String,
    pub phase: TaskPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// A persisted chat message as the server reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessage {
    pub id: String,
    #[serde(default)]
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub speaker: Speaker,
    #[serde(default)]
    pub contents: Vec<ThreadMessageContent>,
}

impl ThreadMessage {
    /// Concatenated text parts, images skipped
    pub fn text(&self) -> String {
        self.contents
            .iter()
            .filter_map(|c| match c {
                ThreadMessageContent::Text { text } => Some(text.as_str()),
                ThreadMessageContent::Image { .. } => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ThreadMessageContent {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        image_url: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_task_with_extra_fields() {
        let json = r#"{"type":"task","id":"t1","taskType":"generate-question","phase":"post","answer":"4","generatedSelections":null}"#;
        let event: ThreadEvent = serde_json::from_str(json).unwrap();
        let ThreadEvent::Task(task) = event else {
            panic!("expected task event");
        };
        assert_eq!(task.id, "t1");
        assert!(task.is_question_generated());
        assert_eq!(task.extra.get("answer"), Some(&Value::from("4")));
        assert_eq!(task.extra.get("generatedSelections"), Some(&Value::Null));
    }

    #[test]
    fn test_parse_partial_and_turn_end() {
        let event: ThreadEvent = serde_json::from_str(
            r#"{"type":"assistant-chat-partial-content","partialContent":"Here is"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ThreadEvent::PartialContent {
                partial_content: "Here is".to_string()
            }
        );

        let event: ThreadEvent = serde_json::from_str(r#"{"type":"turn-end"}"#).unwrap();
        assert_eq!(event, ThreadEvent::TurnEnd);
    }

    #[test]
    fn test_parse_complete_message() {
        let json = r#"{"type":"assistant-chat-complete","message":{"id":"m1","order":3,"createdAt":"2024-01-01T00:00:00Z","type":"message","speaker":"assistant","contents":[{"type":"text","text":"Here is"},{"type":"image","imageUrl":"https://x/y.png"},{"type":"text","text":" the answer."}]}}"#;
        let ThreadEvent::Complete { message } = serde_json::from_str(json).unwrap() else {
            panic!("expected complete event");
        };
        assert_eq!(message.speaker, Speaker::Assistant);
        assert_eq!(message.order, 3);
        assert_eq!(message.text(), "Here is the answer.");
    }

    #[test]
    fn test_unknown_phase_is_rejected() {
        let json = r#"{"type":"task","id":"t1","taskType":"processing","phase":"during"}"#;
        assert!(serde_json::from_str::<ThreadEvent>(json).is_err());
    }
}
