//! Frame classification and routing for one chat turn
//!
//! The dispatcher is synchronous: it is fed raw body bytes and returns the
//! [`ChatEvent`]s they produce, in arrival order. The async read loop lives
//! in [`super::turn`].

use super::accumulator::PartialContentAccumulator;
use super::decoder::{Frame, SseDecoder, ERROR_PREFIX};
use super::events::{TaskEvent, TaskState, ThreadEvent, ThreadMessage};
use super::question::GeneratedQuestion;
use super::tracker::TaskTracker;
use super::TurnError;
use serde_json::Value;

/// Event delivered to the consumer of a turn
#[derive(Debug)]
pub enum ChatEvent {
    /// Text delta (not the accumulated total)
    PartialContent(String),
    TaskUpdate(TaskEvent),
    QuestionGenerated(GeneratedQuestion),
    /// Final assistant message; the turn may still continue until turn-end
    Complete(ThreadMessage),
    /// Terminal failure, always the last event of a turn
    Error(TurnError),
}

const KNOWN_TYPES: &[&str] = &[
    "error",
    "task",
    "assistant-chat-partial-content",
    "assistant-chat-complete",
    "turn-end",
];

#[derive(Debug, Default)]
pub struct SessionEventDispatcher {
    decoder: SseDecoder,
    tracker: TaskTracker,
    content: PartialContentAccumulator,
    finished: bool,
    skipped_frames: usize,
}

impl SessionEventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a body chunk and dispatch the frames it completes
    ///
    /// Nothing is dispatched once the turn has finished, even if the chunk
    /// holds more frames.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<ChatEvent> {
        if self.finished {
            return Vec::new();
        }
        let frames = self.decoder.push(bytes);
        self.dispatch_all(frames)
    }

    /// The body ended: flush the decoder and finish the turn
    pub fn finish(&mut self) -> Vec<ChatEvent> {
        if self.finished {
            return Vec::new();
        }
        let frames = self.decoder.finish();
        let events = self.dispatch_all(frames);
        if !self.finished {
            tracing::debug!(target: "chat", "Stream closed without turn-end");
            self.complete();
        }
        events
    }

    /// End the turn with a transport-level failure
    pub fn fail(&mut self, error: TurnError) -> ChatEvent {
        tracing::warn!(target: "chat", error = %error, "Turn failed");
        self.tracker.clear();
        self.finished = true;
        ChatEvent::Error(error)
    }

    /// Stop dispatching without reporting an error
    pub fn cancel(&mut self) {
        if !self.finished {
            tracing::debug!(target: "chat", "Turn cancelled");
            self.complete();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn current_task(&self) -> Option<&TaskState> {
        self.tracker.current()
    }

    /// Text accumulated from partial-content deltas so far
    pub fn content(&self) -> &str {
        self.content.as_str()
    }

    /// Frames dropped because they could not be parsed
    pub fn skipped_frames(&self) -> usize {
        self.skipped_frames
    }

    fn dispatch_all(&mut self, frames: Vec<Frame>) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        for frame in frames {
            if self.finished {
                break;
            }
            self.dispatch(frame, &mut events);
        }
        events
    }

    fn dispatch(&mut self, frame: Frame, out: &mut Vec<ChatEvent>) {
        let payload = match frame {
            Frame::Done => {
                tracing::debug!(target: "chat", "Received [DONE]");
                self.complete();
                return;
            }
            Frame::ErrorLine(line) => {
                tracing::error!(target: "chat", line = %line, "Server error line");
                out.push(self.fail(TurnError::ErrorLine(line)));
                return;
            }
            Frame::Data(payload) => payload,
        };

        tracing::trace!(target: "chat", payload = %payload, "Frame");

        let value: Value = match serde_json::from_str(&payload) {
            Ok(value) => value,
            Err(e) => {
                self.skip(&payload, &e);
                return;
            }
        };

        let event_type = value.get("type").and_then(Value::as_str).unwrap_or_default();
        if !KNOWN_TYPES.contains(&event_type) {
            tracing::debug!(target: "chat", event_type, "Ignoring unknown event type");
            return;
        }

        match serde_json::from_value::<ThreadEvent>(value.clone()) {
            Ok(event) => self.route(event, &value, out),
            Err(e) => self.skip(&payload, &e),
        }
    }

    fn route(&mut self, event: ThreadEvent, raw: &Value, out: &mut Vec<ChatEvent>) {
        match event {
            ThreadEvent::PartialContent { partial_content } => {
                self.content.push(&partial_content);
                out.push(ChatEvent::PartialContent(partial_content));
            }
            ThreadEvent::Task(task) => {
                self.tracker.update(&task);
                let question = GeneratedQuestion::from_task(&task);
                out.push(ChatEvent::TaskUpdate(task));
                if let Some(question) = question {
                    tracing::info!(target: "chat", "Question generated");
                    out.push(ChatEvent::QuestionGenerated(question));
                }
            }
            ThreadEvent::Complete { message } => {
                tracing::debug!(target: "chat", message_id = %message.id, "Assistant message complete");
                out.push(ChatEvent::Complete(message));
            }
            ThreadEvent::TurnEnd => {
                tracing::debug!(
                    target: "chat",
                    chars = self.content.as_str().len(),
                    "Turn end"
                );
                self.complete();
            }
            ThreadEvent::Error { error } => {
                let message = match error.as_str() {
                    Some(text) if text.contains(ERROR_PREFIX) => text.to_string(),
                    _ => format!("Server error: {}", raw),
                };
                out.push(self.fail(TurnError::Server(message)));
            }
        }
    }

    fn skip(&mut self, payload: &str, error: &serde_json::Error) {
        self.skipped_frames += 1;
        tracing::warn!(
            target: "chat",
            error = %error,
            payload = %payload,
            "Skipping malformed frame"
        );
    }

    fn complete(&mut self) {
        self.finished = true;
        self.tracker.clear();
    }
}
