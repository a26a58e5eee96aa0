//! Serialized view of a page, as produced by the injected page script.
//!
//! A snapshot is the only view of the DOM the Rust side has: selector building,
//! selector matching and element resolution all operate on it.

use crate::trace::Viewport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    /// Generated once per loaded document; element keys are only meaningful within it.
    #[serde(rename = "documentId", default)]
    pub document_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "userAgent", default)]
    pub user_agent: String,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub scroll: ScrollPosition,
    pub root: SnapshotNode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// One element of the snapshot tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    /// Page-stable identity; when absent the document assigns one above every explicit key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<u64>,
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    /// Concatenated direct text children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Current value of form fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub editable: bool,
    /// Computed `display: none` or `visibility: hidden`.
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub rect: Rect,
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

impl SnapshotNode {
    /// A laid-out element with a 100x20 box at the origin.
    pub fn new(tag: &str) -> Self {
        Self {
            key: None,
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            text: None,
            value: None,
            editable: false,
            hidden: false,
            rect: Rect::new(0.0, 0.0, 100.0, 20.0),
            children: Vec::new(),
        }
    }

    pub fn key(mut self, key: u64) -> Self {
        self.key = Some(key);
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = Rect::new(x, y, width, height);
        self
    }

    pub fn child(mut self, child: SnapshotNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = SnapshotNode>) -> Self {
        self.children.extend(children);
        self
    }
}

impl PageSnapshot {
    pub fn new(url: &str, root: SnapshotNode) -> Self {
        Self {
            url: url.to_string(),
            document_id: String::new(),
            title: String::new(),
            user_agent: String::new(),
            viewport: Viewport {
                width: 1280,
                height: 720,
            },
            scroll: ScrollPosition::default(),
            root,
        }
    }

    pub fn with_document_id(mut self, id: &str) -> Self {
        self.document_id = id.to_string();
        self
    }
}
