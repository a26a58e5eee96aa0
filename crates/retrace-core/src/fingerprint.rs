//! Locator derivation for recorded elements.
//!
//! [`SelectorBuilder`] turns an element of a [`Document`] into a primary
//! selector plus ordered fallbacks, trying stability signals in a fixed
//! precedence: role+label, data attributes, ARIA attributes, stable id, and
//! finally a short structural path.

use crate::dom::{Document, ElementKey, NodeId};
use crate::selector::{attr_selector, escape_ident};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

/// Test-id-like attributes, tried before any other `data-*` attribute.
pub const PREFERRED_DATA_ATTRS: &[&str] = &[
    "data-testid",
    "data-test-id",
    "data-test",
    "data-qa",
    "data-cy",
    "data-automation-id",
];

pub const ARIA_ATTRS: &[&str] = &[
    "aria-label",
    "aria-controls",
    "aria-haspopup",
    "aria-expanded",
    "aria-selected",
    "aria-current",
];

const LABELLED_ROLES: &[&str] = &["menuitem", "button", "option"];

/// Marker carried by the recorder's own UI; never a locator.
pub const RECORDER_UI_ATTR: &str = "data-recorder-ui";

pub const MAX_PATH_DEPTH: usize = 4;
const MAX_ID_LEN: usize = 24;
const MAX_ID_DIGIT_RATIO: f64 = 0.35;
const MAX_PATH_CLASSES: usize = 2;

static ID_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());
static HEX_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9a-fA-F]{6,}").unwrap());
static UUID_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}|[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}").unwrap()
});
static GENERATED_ID_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(radix-|headlessui-|mui-|react-|rc-|downshift-|ember\d|ext-gen|yui_|aria-|:r)")
        .unwrap()
});
static CLASS_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]{2,23}$").unwrap());
static HEX_CLASS_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9a-fA-F]{5,}").unwrap());
static UTILITY_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(css|sc|jsx|emotion)-|^-?(m|mx|my|mt|mb|ml|mr|p|px|py|pt|pb|pl|pr|w|h|min-w|min-h|max-w|max-h|gap|space|text|bg|flex|grid)-",
    )
    .unwrap()
});

/// Primary locator plus ordered alternates for one element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint {
    pub primary: String,
    pub fallbacks: Vec<String>,
}

/// Session-scoped builder; results are cached per element key.
#[derive(Debug, Default)]
pub struct SelectorBuilder {
    cache: HashMap<ElementKey, Fingerprint>,
}

impl SelectorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn cached(&self, key: ElementKey) -> Option<&Fingerprint> {
        self.cache.get(&key)
    }

    pub fn build(&mut self, doc: &Document, id: NodeId) -> Fingerprint {
        let Some(key) = doc.key_of(id) else {
            return Fingerprint::default();
        };
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }
        let fingerprint = fingerprint(doc, id);
        debug!(key = %key, selector = %fingerprint.primary, "built selector");
        self.cache.insert(key, fingerprint.clone());
        fingerprint
    }

    pub fn selector(&mut self, doc: &Document, id: NodeId) -> String {
        self.build(doc, id).primary
    }
}

/// Uncached fingerprint of `id`. Never fails: a missing node yields an empty primary.
pub fn fingerprint(doc: &Document, id: NodeId) -> Fingerprint {
    if doc.node(id).is_none() {
        return Fingerprint::default();
    }

    let strategies: [fn(&Document, NodeId) -> Option<String>; 4] =
        [by_role_label, by_data_attr, by_aria_attr, by_stable_id];
    let mut found: Vec<String> = Vec::new();
    for strategy in strategies {
        if let Some(selector) = strategy(doc, id)
            && !found.contains(&selector)
        {
            found.push(selector);
        }
    }

    let (path, path_unique) = structural_path(doc, id);
    if found.is_empty() {
        return Fingerprint {
            primary: path,
            fallbacks: Vec::new(),
        };
    }

    let primary = found.remove(0);
    let mut fallbacks = found;
    if path_unique && path != primary && !fallbacks.contains(&path) {
        fallbacks.push(path);
    }
    Fingerprint { primary, fallbacks }
}

/// Whether `selector` matches `id` and nothing else.
pub fn is_unique_for(doc: &Document, selector: &str, id: NodeId) -> bool {
    matches!(doc.query_all(selector).as_deref(), Ok([only]) if *only == id)
}

fn first_unique(
    doc: &Document,
    id: NodeId,
    candidates: impl IntoIterator<Item = String>,
) -> Option<String> {
    candidates
        .into_iter()
        .find(|candidate| is_unique_for(doc, candidate, id))
}

fn by_role_label(doc: &Document, id: NodeId) -> Option<String> {
    let node = doc.node(id)?;
    let role = node.role().filter(|r| LABELLED_ROLES.contains(r))?;
    let label = node.attr("aria-label").filter(|l| !l.trim().is_empty())?;
    let candidate = format!(
        "{}{}{}",
        node.tag,
        attr_selector("role", role),
        attr_selector("aria-label", label)
    );
    first_unique(doc, id, [candidate])
}

fn by_data_attr(doc: &Document, id: NodeId) -> Option<String> {
    let node = doc.node(id)?;
    let preferred = PREFERRED_DATA_ATTRS
        .iter()
        .filter_map(|name| node.attr(name).map(|value| (*name, value)));
    let others = node.attrs.iter().filter_map(|(name, value)| {
        let other = name.starts_with("data-")
            && name != RECORDER_UI_ATTR
            && !PREFERRED_DATA_ATTRS.contains(&name.as_str());
        other.then_some((name.as_str(), value.as_str()))
    });
    let candidates = preferred
        .chain(others)
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| attr_selector(name, value));
    first_unique(doc, id, candidates)
}

fn by_aria_attr(doc: &Document, id: NodeId) -> Option<String> {
    let node = doc.node(id)?;
    let role = node.role();
    let mut candidates = Vec::new();
    for name in ARIA_ATTRS {
        let Some(value) = node.attr(name).filter(|v| !v.is_empty()) else {
            continue;
        };
        let alone = attr_selector(name, value);
        if let Some(role) = role {
            candidates.push(alone.clone());
            candidates.push(format!("{}{}", attr_selector("role", role), alone));
        } else {
            candidates.push(alone);
        }
    }
    first_unique(doc, id, candidates)
}

fn by_stable_id(doc: &Document, id: NodeId) -> Option<String> {
    let element_id = doc.node(id)?.id()?;
    if !is_stable_id(element_id) {
        return None;
    }
    let candidate = if element_id.starts_with(|c: char| c.is_ascii_digit()) {
        attr_selector("id", element_id)
    } else {
        format!("#{}", escape_ident(element_id))
    };
    first_unique(doc, id, [candidate])
}

/// Heuristic for ids written by people rather than generated by frameworks.
pub fn is_stable_id(id: &str) -> bool {
    if id.is_empty() || id.len() > MAX_ID_LEN || !ID_CHARS.is_match(id) {
        return false;
    }
    if GENERATED_ID_PREFIX.is_match(id) || UUID_LIKE.is_match(id) {
        return false;
    }
    if HEX_RUN
        .find_iter(id)
        .any(|m| m.as_str().chars().any(|c| c.is_ascii_digit()))
    {
        return false;
    }

    let digits = id.chars().filter(char::is_ascii_digit).count();
    let has_lower = id.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = id.chars().any(|c| c.is_ascii_uppercase());
    if digits > 0 && has_lower && has_upper {
        return false;
    }
    (digits as f64 / id.len() as f64) <= MAX_ID_DIGIT_RATIO
}

/// Class names worth keeping in a structural segment.
pub fn is_stable_class(class: &str) -> bool {
    if !CLASS_SHAPE.is_match(class) || UTILITY_CLASS.is_match(class) {
        return false;
    }
    !HEX_CLASS_RUN
        .find_iter(class)
        .any(|m| m.as_str().chars().any(|c| c.is_ascii_digit()))
}

fn path_segment(doc: &Document, id: NodeId) -> String {
    let Some(node) = doc.node(id) else {
        return String::new();
    };
    let mut segment = node.tag.clone();
    for class in node
        .classes()
        .filter(|c| is_stable_class(c))
        .take(MAX_PATH_CLASSES)
    {
        segment.push('.');
        segment.push_str(&escape_ident(class));
    }
    if doc.siblings_of_type(id).len() > 1 {
        segment.push_str(&format!(":nth-of-type({})", doc.nth_of_type(id)));
    }
    segment
}

/// Shortest unique ancestor chain up to [`MAX_PATH_DEPTH`] levels, or the full chain as a best effort.
pub fn structural_path(doc: &Document, id: NodeId) -> (String, bool) {
    let mut segments: Vec<String> = Vec::new();
    let mut current = Some(id);
    let mut path = String::new();

    while let Some(node) = current
        && segments.len() < MAX_PATH_DEPTH
    {
        segments.insert(0, path_segment(doc, node));
        path = segments.join(" > ");
        if is_unique_for(doc, &path, id) {
            return (path, true);
        }
        current = doc.parent(node);
    }
    (path, false)
}
