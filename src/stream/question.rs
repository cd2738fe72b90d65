//! Generated-question payload carried by `generate-question`/`post` tasks
//!
//! The backend has used two field sets for the same payload and may send a
//! mix of both while it migrates. Each field prefers the current name and
//! falls back to the legacy one independently.

use super::events::TaskEvent;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Canonical generated question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    /// Question body (HTML)
    pub question: String,
    pub answer: String,
    /// Worked solution (HTML)
    pub solution: String,
    /// Multiple-choice options, normally five; `None` for free response
    pub selections: Option<Vec<String>>,
}

/// Current field names
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentFields {
    #[serde(default, deserialize_with = "non_empty_text")]
    html_question_content: Option<String>,
    #[serde(default, deserialize_with = "non_empty_text")]
    answer: Option<String>,
    #[serde(default, deserialize_with = "non_empty_text")]
    html_solution_content: Option<String>,
    #[serde(default, deserialize_with = "selections")]
    generated_selections: Option<Vec<String>>,
}

impl CurrentFields {
    fn is_complete(&self) -> bool {
        self.html_question_content.is_some()
            && self.answer.is_some()
            && self.html_solution_content.is_some()
    }
}

/// Legacy field names
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyFields {
    #[serde(default, deserialize_with = "non_empty_text")]
    generated_question: Option<String>,
    #[serde(default, deserialize_with = "non_empty_text")]
    generated_answer: Option<String>,
    #[serde(default, deserialize_with = "non_empty_text")]
    generated_solution: Option<String>,
}

impl LegacyFields {
    fn is_complete(&self) -> bool {
        self.generated_question.is_some()
            && self.generated_answer.is_some()
            && self.generated_solution.is_some()
    }
}

/// Strings count only when non-empty; other JSON types count as absent
fn non_empty_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    })
}

fn selections<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value::<Vec<String>>(value).ok())
}

fn coalesce(current: Option<String>, legacy: Option<String>) -> String {
    current.or(legacy).unwrap_or_default()
}

impl GeneratedQuestion {
    /// Build the canonical payload from a task event
    ///
    /// Returns `None` unless this is a `generate-question`/`post` event and at
    /// least one of the two field sets is complete.
    pub fn from_task(task: &TaskEvent) -> Option<Self> {
        if !task.is_question_generated() {
            return None;
        }

        let fields = Value::Object(task.extra.clone());
        let current: CurrentFields = serde_json::from_value(fields.clone()).unwrap_or_default();
        let legacy: LegacyFields = serde_json::from_value(fields).unwrap_or_default();

        if !current.is_complete() && !legacy.is_complete() {
            tracing::warn!(
                target: "chat",
                task_id = %task.id,
                "generate-question task finished without question data"
            );
            return None;
        }

        Some(Self {
            question: coalesce(current.html_question_content, legacy.generated_question),
            answer: coalesce(current.answer, legacy.generated_answer),
            solution: coalesce(current.html_solution_content, legacy.generated_solution),
            selections: current.generated_selections,
        })
    }
}
