//! Single-pass element resolution over one snapshot.
//!
//! Strategies run in order and the first hit wins: semantic match inside the
//! visible menu scopes, name-only match across the document, then the recorded
//! locators. Polling against a deadline is the caller's job.

use crate::dom::{Document, ElementKey, NodeId};
use crate::selector::SelectorList;
use retrace_common::trace::Step;
use std::fmt;
use tracing::{debug, warn};

pub const MENU_SCOPES: &str = r#"[role="menu"],[role="listbox"]"#;
pub const PORTAL_ROLES: &str = "[data-radix-portal] [role], [data-portal] [role]";
pub const SEMANTIC_CANDIDATES: &str = r#"[role],[data-testid],button,[role="button"]"#;
pub const CLICKABLE: &str = r#"[role^="menuitem"],[role="option"],button,[role="button"],a[href]"#;

/// What a step says about the element it targets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Target {
    pub selector: String,
    pub fallbacks: Vec<String>,
    pub role: Option<String>,
    pub name: Option<String>,
}

impl Target {
    pub fn from_selector(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            ..Self::default()
        }
    }

    /// `None` for steps that do not address an element.
    pub fn from_step(step: &Step) -> Option<Self> {
        match step {
            Step::Click(click) => Some(Self {
                selector: click.selector.clone(),
                fallbacks: click.fallbacks.clone(),
                role: click.role.clone().filter(|r| !r.is_empty()),
                name: click.name.clone().filter(|n| !n.trim().is_empty()),
            }),
            other => other.selector().map(Self::from_selector),
        }
    }

    pub fn selectors(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.selector.as_str())
            .chain(self.fallbacks.iter().map(String::as_str))
            .filter(|s| !s.is_empty())
    }

    /// Everything that was tried, for the not-found report.
    pub fn describe_attempts(&self) -> Vec<String> {
        let mut attempts: Vec<String> = self.selectors().map(str::to_string).collect();
        if let Some(role) = &self.role {
            attempts.push(format!("role={}", role));
        }
        if let Some(name) = &self.name {
            attempts.push(format!("name={:?}", name));
        }
        attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Semantic,
    NameOnly,
    Locator,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Semantic => "semantic",
            Strategy::NameOnly => "name",
            Strategy::Locator => "locator",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub node: NodeId,
    pub key: ElementKey,
    pub strategy: Strategy,
    /// The locator that matched, for [`Strategy::Locator`].
    pub selector: Option<String>,
}

/// One resolution attempt against the current snapshot.
pub fn resolve_once(doc: &Document, target: &Target) -> Option<Resolution> {
    let found = find_by_semantics(doc, target)
        .map(|node| (node, Strategy::Semantic, None))
        .or_else(|| find_by_name(doc, target).map(|node| (node, Strategy::NameOnly, None)))
        .or_else(|| {
            find_by_locators(doc, target)
                .map(|(node, selector)| (node, Strategy::Locator, Some(selector)))
        })?;

    let (node, strategy, selector) = found;
    let key = doc.key_of(node)?;
    debug!(%strategy, key = %key, "resolved element");
    Some(Resolution {
        node,
        key,
        strategy,
        selector,
    })
}

/// Collapse whitespace, trim, lowercase.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `aria-label`, else the element's text, normalized.
pub fn element_label(doc: &Document, id: NodeId) -> String {
    let Some(node) = doc.node(id) else {
        return String::new();
    };
    match node.attr("aria-label").filter(|l| !l.is_empty()) {
        Some(label) => normalize_text(label),
        None => normalize_text(&doc.text_content(id)),
    }
}

/// `option` and every `menuitem*` role are one class.
pub fn canonical_role(role: &str) -> &str {
    if role == "option" || role.starts_with("menuitem") {
        "menuitem"
    } else {
        role
    }
}

/// A missing expected role accepts anything.
pub fn roles_match(actual: Option<&str>, expected: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => canonical_role(actual.unwrap_or_default()) == canonical_role(expected),
    }
}

fn label_matches(label: &str, expected: &str) -> bool {
    !label.is_empty() && label.contains(expected)
}

fn parse_known(selectors: &str) -> SelectorList {
    // Only called with the constant selector lists of this module.
    SelectorList::parse(selectors).unwrap_or(SelectorList {
        selectors: Vec::new(),
    })
}

/// Nearest menu item, option, button or link at or above `id`.
pub fn clickable_target(doc: &Document, id: NodeId) -> NodeId {
    doc.closest(id, &parse_known(CLICKABLE)).unwrap_or(id)
}

/// Visible menus and listboxes, including those opened through portals.
/// Empty when no menu is open, meaning the whole document is in scope.
pub fn visible_scopes(doc: &Document) -> Vec<NodeId> {
    let menus = parse_known(MENU_SCOPES);
    let mut scopes: Vec<NodeId> = doc
        .select_all(&menus)
        .into_iter()
        .filter(|id| doc.is_visible(*id))
        .collect();

    for portal_child in doc.select_all(&parse_known(PORTAL_ROLES)) {
        if let Some(menu) = doc.closest(portal_child, &menus)
            && doc.is_visible(menu)
            && !scopes.contains(&menu)
        {
            scopes.push(menu);
        }
    }
    scopes
}

pub fn find_by_semantics(doc: &Document, target: &Target) -> Option<NodeId> {
    let expected = normalize_text(target.name.as_deref()?);
    let candidates = parse_known(SEMANTIC_CANDIDATES);
    let scopes = visible_scopes(doc);

    let pools: Vec<Vec<NodeId>> = if scopes.is_empty() {
        vec![doc.select_all(&candidates)]
    } else {
        scopes
            .iter()
            .map(|scope| doc.select_within(*scope, &candidates))
            .collect()
    };

    pools.into_iter().flatten().find_map(|id| {
        let node = doc.node(id)?;
        if !roles_match(node.role(), target.role.as_deref()) {
            return None;
        }
        if !label_matches(&element_label(doc, id), &expected) {
            return None;
        }
        let clickable = clickable_target(doc, id);
        doc.is_visible(clickable).then_some(clickable)
    })
}

/// Label match on any element, preferring the innermost: an element with a
/// visible matching descendant defers to that descendant.
pub fn find_by_name(doc: &Document, target: &Target) -> Option<NodeId> {
    let expected = normalize_text(target.name.as_deref()?);
    let matching: Vec<NodeId> = doc
        .ids()
        .filter(|id| label_matches(&element_label(doc, *id), &expected))
        .collect();

    matching
        .iter()
        .copied()
        .filter(|id| {
            !matching
                .iter()
                .any(|other| other != id && doc.contains(*id, *other) && doc.is_visible(*other))
        })
        .find_map(|id| {
            let clickable = clickable_target(doc, id);
            doc.is_visible(clickable).then_some(clickable)
        })
}

/// Primary selector then fallbacks. Only used for steps without a role or name hint.
pub fn find_by_locators(doc: &Document, target: &Target) -> Option<(NodeId, String)> {
    if target.name.is_some() || target.role.is_some() {
        return None;
    }
    for selector in target.selectors() {
        let list = match SelectorList::parse(selector) {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "skipping unusable selector");
                continue;
            }
        };
        if let Some(first) = doc.ids().find(|id| doc.matches(*id, &list))
            && doc.is_visible(first)
        {
            return Some((clickable_target(doc, first), selector.to_string()));
        }
    }
    None
}
