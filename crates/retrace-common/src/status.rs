use serde::{Deserialize, Serialize};

/// Push notifications about a replay run, consumed by an external observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusEvent {
    Started,
    Step {
        index: usize,
        #[serde(rename = "stepType")]
        step_type: String,
    },
    Done,
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        message: String,
    },
}
