//! Current-task tracking for a chat turn

use super::events::{TaskEvent, TaskPhase, TaskState, GENERATE_QUESTION, PROCESSING, READ_QUESTION};

impl TaskState {
    /// Progress text for the known `(taskType, phase)` pairs
    ///
    /// Returns `None` for anything else; renderers show nothing in that case.
    pub fn status_text(&self) -> Option<&'static str> {
        let text = match (self.task_type.as_str(), self.phase) {
            (PROCESSING, TaskPhase::Pre) => "Processing...",
            (PROCESSING, TaskPhase::Post) => "Finishing up...",
            (GENERATE_QUESTION, TaskPhase::Pre) => "Generating question...",
            (GENERATE_QUESTION, TaskPhase::Post) => "Finalizing generated question...",
            (READ_QUESTION, TaskPhase::Pre) => "Reading question...",
            (READ_QUESTION, TaskPhase::Post) => "Finishing question read...",
            _ => return None,
        };
        Some(text)
    }
}

/// Holds the one in-flight task of a turn
///
/// Overwritten by every `task` event, cleared when the turn completes or
/// fails.
#[derive(Debug, Default, Clone)]
pub struct TaskTracker {
    current: Option<TaskState>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, task: &TaskEvent) {
        let state = task.state();
        tracing::debug!(
            target: "chat",
            task_id = %task.id,
            task_type = %state.task_type,
            phase = state.phase.as_str(),
            "Task update"
        );
        self.current = Some(state);
    }

    pub fn current(&self) -> Option<&TaskState> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
