//! Arena-backed document built from a [`PageSnapshot`].
//!
//! Nodes are stored in document (pre-)order, so iterating the arena is the
//! same walk `querySelectorAll` does.

use crate::selector::{self, SelectorList};
use retrace_common::SelectorError;
use retrace_common::snapshot::{PageSnapshot, Rect, ScrollPosition, SnapshotNode};
use retrace_common::trace::Viewport;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Page-stable element identity, shared between snapshots of the same page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementKey(pub u64);

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub key: ElementKey,
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub text: Option<String>,
    pub value: Option<String>,
    pub editable: bool,
    pub hidden: bool,
    pub rect: Rect,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|id| !id.is_empty())
    }

    pub fn role(&self) -> Option<&str> {
        self.attr("role").filter(|r| !r.is_empty())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class")
            .unwrap_or_default()
            .split_whitespace()
    }

    /// `input`, `textarea`, or a contenteditable region.
    pub fn is_editable(&self) -> bool {
        self.tag == "input" || self.tag == "textarea" || self.editable
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    by_key: HashMap<ElementKey, NodeId>,
    next_key: u64,
    pub url: String,
    pub document_id: String,
    pub title: String,
    pub user_agent: String,
    pub viewport: Viewport,
    pub scroll: ScrollPosition,
}

impl Document {
    pub fn from_snapshot(snapshot: PageSnapshot) -> Self {
        let mut doc = Document {
            nodes: Vec::new(),
            by_key: HashMap::new(),
            next_key: max_key(&snapshot.root) + 1,
            url: snapshot.url,
            document_id: snapshot.document_id,
            title: snapshot.title,
            user_agent: snapshot.user_agent,
            viewport: snapshot.viewport,
            scroll: snapshot.scroll,
        };
        doc.push_node(snapshot.root, None);
        doc
    }

    fn push_node(&mut self, node: SnapshotNode, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let key = match node.key {
            Some(key) => ElementKey(key),
            None => {
                self.next_key += 1;
                ElementKey(self.next_key - 1)
            }
        };
        self.nodes.push(Node {
            key,
            tag: node.tag.to_ascii_lowercase(),
            attrs: node.attrs,
            text: node.text,
            value: node.value,
            editable: node.editable,
            hidden: node.hidden,
            rect: node.rect,
            parent,
            children: Vec::new(),
        });
        self.by_key.entry(key).or_insert(id);

        for child in node.children {
            let child_id = self.push_node(child, Some(id));
            self.nodes[id.0].children.push(child_id);
        }
        id
    }

    /// Identity of the loaded document; falls back to the URL for snapshots without one.
    pub fn identity(&self) -> &str {
        if self.document_id.is_empty() {
            &self.url
        } else {
            &self.document_id
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn by_key(&self, key: ElementKey) -> Option<NodeId> {
        self.by_key.get(&key).copied()
    }

    pub fn key_of(&self, id: NodeId) -> Option<ElementKey> {
        self.node(id).map(|n| n.key)
    }

    /// All node ids in document order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.parent(id),
        }
    }

    /// Descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    pub fn contains(&self, ancestor: NodeId, id: NodeId) -> bool {
        ancestor == id || self.ancestors(id).any(|a| a == ancestor)
    }

    /// Same-tag siblings of `id`, including itself, in order.
    pub fn siblings_of_type(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        match node.parent {
            Some(parent) => self
                .children(parent)
                .iter()
                .copied()
                .filter(|c| self.nodes[c.0].tag == node.tag)
                .collect(),
            None => vec![id],
        }
    }

    /// 1-based position among same-tag siblings.
    pub fn nth_of_type(&self, id: NodeId) -> usize {
        self.siblings_of_type(id)
            .iter()
            .position(|s| *s == id)
            .map(|p| p + 1)
            .unwrap_or(1)
    }

    /// `textContent`: own text followed by the text of every descendant.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        if let Some(text) = &node.text {
            if !out.is_empty() && !text.is_empty() && !out.ends_with(char::is_whitespace) {
                out.push(' ');
            }
            out.push_str(text);
        }
        for child in &node.children {
            self.collect_text(*child, out);
        }
    }

    /// Current editable value: the field value, or the text of a contenteditable region.
    pub fn current_value(&self, id: NodeId) -> String {
        match self.node(id) {
            Some(node) if node.editable && node.tag != "input" && node.tag != "textarea" => {
                self.text_content(id)
            }
            Some(node) => node.value.clone().unwrap_or_default(),
            None => String::new(),
        }
    }

    /// Rendered: not hidden by computed style (on itself or an ancestor) and a non-empty box.
    pub fn is_visible(&self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        if node.hidden || !node.rect.has_area() {
            return false;
        }
        !self
            .ancestors(id)
            .any(|a| self.nodes[a.0].hidden)
    }

    pub fn matches(&self, id: NodeId, selectors: &SelectorList) -> bool {
        selector::matches(self, id, selectors)
    }

    /// `Element.closest`: `id` itself or its nearest matching ancestor.
    pub fn closest(&self, id: NodeId, selectors: &SelectorList) -> Option<NodeId> {
        if self.matches(id, selectors) {
            return Some(id);
        }
        self.ancestors(id).find(|a| self.matches(*a, selectors))
    }

    pub fn select_all(&self, selectors: &SelectorList) -> Vec<NodeId> {
        self.ids().filter(|id| self.matches(*id, selectors)).collect()
    }

    pub fn select_within(&self, scope: NodeId, selectors: &SelectorList) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|id| self.matches(*id, selectors))
            .collect()
    }

    /// `document.querySelectorAll`.
    pub fn query_all(&self, selectors: &str) -> Result<Vec<NodeId>, SelectorError> {
        let list = SelectorList::parse(selectors)?;
        Ok(self.select_all(&list))
    }

    /// `document.querySelector`.
    pub fn query(&self, selectors: &str) -> Result<Option<NodeId>, SelectorError> {
        let list = SelectorList::parse(selectors)?;
        Ok(self.ids().find(|id| self.matches(*id, &list)))
    }
}

pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.doc.parent(current);
        Some(current)
    }
}
