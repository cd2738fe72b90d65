//! Chat turn streaming
//!
//! A turn is one `POST /chat-sessions/{id}/response` whose chunked body
//! carries SSE frames:
//!
//! ```text
//! bytes -> SseDecoder -> Frame -> SessionEventDispatcher -> ChatEvent
//!                                   |- TaskTracker
//!                                   |- PartialContentAccumulator
//!                                   `- GeneratedQuestion::from_task
//! ```
//!
//! [`TurnStream`] owns the read loop and hands the events to the caller.

mod accumulator;
mod decoder;
mod dispatcher;
mod error;
mod events;
mod question;
mod tracker;
mod turn;

pub use accumulator::PartialContentAccumulator;
pub use decoder::{Frame, SseDecoder, DONE_SENTINEL, ERROR_PREFIX};
pub use dispatcher::{ChatEvent, SessionEventDispatcher};
pub use error::TurnError;
pub use events::{
    Speaker, TaskEvent, TaskPhase, TaskState, ThreadEvent, ThreadMessage, ThreadMessageContent,
    GENERATE_QUESTION, PROCESSING, READ_QUESTION,
};
pub use question::GeneratedQuestion;
pub use tracker::TaskTracker;
pub use turn::{ChatCallback, TurnStream};
