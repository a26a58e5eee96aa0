use crate::snapshot::PageSnapshot;
use serde::{Deserialize, Serialize};

/// Requests evaluated by the injected page script (`window.__retrace.process`).
///
/// Elements are addressed by the key they carry in the latest snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PageAction {
    Snapshot(SnapshotRequest),
    ScrollIntoView(TargetRequest),
    Highlight(HighlightRequest),
    Focus(TargetRequest),
    ClickAt(ClickAtRequest),
    Activate(TargetRequest),
    InsertText(TextRequest),
    AppendValue(TextRequest),
    PressKey(PressKeyRequest),
    ScrollWindow(ScrollWindowRequest),
}

impl PageAction {
    pub fn name(&self) -> &'static str {
        match self {
            PageAction::Snapshot(_) => "snapshot",
            PageAction::ScrollIntoView(_) => "scroll_into_view",
            PageAction::Highlight(_) => "highlight",
            PageAction::Focus(_) => "focus",
            PageAction::ClickAt(_) => "click_at",
            PageAction::Activate(_) => "activate",
            PageAction::InsertText(_) => "insert_text",
            PageAction::AppendValue(_) => "append_value",
            PageAction::PressKey(_) => "press_key",
            PageAction::ScrollWindow(_) => "scroll_window",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRequest {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRequest {
    pub key: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightRequest {
    pub key: u64,
    pub duration_ms: u64,
}

/// Pointer sequence at an offset inside the target's box; the offset is already clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickAtRequest {
    pub key: u64,
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRequest {
    pub key: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressKeyRequest {
    pub key: u64,
    pub key_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollWindowRequest {
    pub x: i64,
    pub y: i64,
}

/// Responses returned by the page script.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionResponse {
    Ok {
        #[serde(flatten)]
        data: Box<ActionData>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionData {
    Snapshot(Box<SnapshotResult>),
    Action(ActionResult),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResult {
    pub snapshot: PageSnapshot,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionResponse {
    pub fn done() -> Self {
        ActionResponse::Ok {
            data: Box::new(ActionData::Action(ActionResult {
                success: true,
                message: None,
            })),
        }
    }

    pub fn snapshot(snapshot: PageSnapshot) -> Self {
        ActionResponse::Ok {
            data: Box::new(ActionData::Snapshot(Box::new(SnapshotResult { snapshot }))),
        }
    }
}
