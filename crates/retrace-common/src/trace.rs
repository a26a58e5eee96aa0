use serde::{Deserialize, Serialize};
use std::fmt;

/// The single trace schema version this workspace reads and writes.
pub const TRACE_VERSION: u32 = 1;

/// A recorded session: versioned, ordered steps plus capture metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub version: u32,
    #[serde(default)]
    pub meta: TraceMeta,
    pub steps: Vec<Step>,
}

impl Trace {
    pub fn new(meta: TraceMeta, steps: Vec<Step>) -> Self {
        Self {
            version: TRACE_VERSION,
            meta,
            steps,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn has_navigate(&self) -> bool {
        self.steps.iter().any(|s| s.kind() == StepKind::Navigate)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceMeta {
    #[serde(rename = "userAgent", default)]
    pub user_agent: String,
    #[serde(default)]
    pub viewport: Viewport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Pixel offset of a click relative to the target's bounding box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    pub x: i64,
    pub y: i64,
}

/// One timestamped action of a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Step {
    Navigate(NavigateStep),
    Click(ClickStep),
    Type(TypeStep),
    Key(KeyStep),
    Scroll(ScrollStep),
    WaitVisible(WaitVisibleStep),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigateStep {
    pub url: String,
    pub ts: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickStep {
    pub selector: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<Offset>,
    pub ts: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeStep {
    pub selector: String,
    pub text: String,
    pub ts: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyStep {
    pub selector: String,
    #[serde(default = "default_key")]
    pub key: String,
    pub ts: f64,
}

fn default_key() -> String {
    "Enter".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollTarget {
    #[default]
    Window,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollStep {
    #[serde(default)]
    pub target: ScrollTarget,
    pub x: i64,
    pub y: i64,
    pub ts: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitVisibleStep {
    pub selector: String,
    /// Milliseconds.
    pub timeout: u64,
    pub ts: f64,
}

/// Fieldless mirror of [`Step`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Navigate,
    Click,
    Type,
    Key,
    Scroll,
    WaitVisible,
}

impl StepKind {
    pub const ALL: [StepKind; 6] = [
        StepKind::Navigate,
        StepKind::Click,
        StepKind::Type,
        StepKind::Key,
        StepKind::Scroll,
        StepKind::WaitVisible,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Navigate => "navigate",
            StepKind::Click => "click",
            StepKind::Type => "type",
            StepKind::Key => "key",
            StepKind::Scroll => "scroll",
            StepKind::WaitVisible => "waitVisible",
        }
    }

    pub fn from_tag(tag: &str) -> Option<StepKind> {
        Self::ALL.into_iter().find(|k| k.as_str() == tag)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Navigate(_) => StepKind::Navigate,
            Step::Click(_) => StepKind::Click,
            Step::Type(_) => StepKind::Type,
            Step::Key(_) => StepKind::Key,
            Step::Scroll(_) => StepKind::Scroll,
            Step::WaitVisible(_) => StepKind::WaitVisible,
        }
    }

    pub fn ts(&self) -> f64 {
        match self {
            Step::Navigate(s) => s.ts,
            Step::Click(s) => s.ts,
            Step::Type(s) => s.ts,
            Step::Key(s) => s.ts,
            Step::Scroll(s) => s.ts,
            Step::WaitVisible(s) => s.ts,
        }
    }

    pub fn set_ts(&mut self, ts: f64) {
        match self {
            Step::Navigate(s) => s.ts = ts,
            Step::Click(s) => s.ts = ts,
            Step::Type(s) => s.ts = ts,
            Step::Key(s) => s.ts = ts,
            Step::Scroll(s) => s.ts = ts,
            Step::WaitVisible(s) => s.ts = ts,
        }
    }

    /// The primary selector, for steps that target an element.
    pub fn selector(&self) -> Option<&str> {
        match self {
            Step::Click(s) => Some(&s.selector),
            Step::Type(s) => Some(&s.selector),
            Step::Key(s) => Some(&s.selector),
            Step::WaitVisible(s) => Some(&s.selector),
            Step::Navigate(_) | Step::Scroll(_) => None,
        }
    }
}
