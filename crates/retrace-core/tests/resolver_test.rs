use retrace_common::snapshot::{PageSnapshot, SnapshotNode};
use retrace_common::trace::{ClickStep, Step, TypeStep};
use retrace_core::dom::{Document, ElementKey};
use retrace_core::resolver::{
    canonical_role, element_label, normalize_text, resolve_once, roles_match, visible_scopes,
    Strategy, Target,
};

fn doc(body: Vec<SnapshotNode>) -> Document {
    let root = SnapshotNode::new("html").child(SnapshotNode::new("body").children(body));
    Document::from_snapshot(PageSnapshot::new("https://example.com", root))
}

fn target(selector: &str, fallbacks: &[&str]) -> Target {
    Target {
        selector: selector.into(),
        fallbacks: fallbacks.iter().map(|s| s.to_string()).collect(),
        role: None,
        name: None,
    }
}

#[test]
fn test_fallback_used_when_primary_misses() {
    let page = doc(vec![
        SnapshotNode::new("button").key(10).attr("data-testid", "send").text("Send"),
        SnapshotNode::new("button").key(11).attr("id", "other").text("Other"),
    ]);
    let t = target("#gone", &[r#"[data-testid="send"]"#, "#other"]);
    let resolved = resolve_once(&page, &t).unwrap();
    assert_eq!(resolved.key, ElementKey(10));
    assert_eq!(resolved.strategy, Strategy::Locator);
    assert_eq!(resolved.selector.as_deref(), Some(r#"[data-testid="send"]"#));
}

#[test]
fn test_hidden_matches_are_skipped() {
    let page = doc(vec![
        SnapshotNode::new("button").key(10).attr("id", "a").hidden(),
        SnapshotNode::new("button").key(11).attr("id", "b").rect(0.0, 0.0, 0.0, 0.0),
        SnapshotNode::new("button").key(12).attr("id", "c"),
    ]);
    let resolved = resolve_once(&page, &target("#a", &["#b", "#c"])).unwrap();
    assert_eq!(resolved.key, ElementKey(12));
    assert!(resolve_once(&page, &target("#a", &["#b"])).is_none());
}

#[test]
fn test_invalid_selector_is_skipped() {
    let page = doc(vec![SnapshotNode::new("input").key(10).attr("id", "ok")]);
    let resolved = resolve_once(&page, &target("div[", &["#ok"])).unwrap();
    assert_eq!(resolved.key, ElementKey(10));
}

#[test]
fn test_locator_hit_is_retargeted_to_clickable_ancestor() {
    let page = doc(vec![
        SnapshotNode::new("a")
            .key(10)
            .attr("href", "/home")
            .child(SnapshotNode::new("span").key(11).attr("class", "label")),
    ]);
    let resolved = resolve_once(&page, &target("span.label", &[])).unwrap();
    assert_eq!(resolved.key, ElementKey(10));
}

#[test]
fn test_semantic_match_wins_over_locator() {
    let page = doc(vec![
        SnapshotNode::new("button").key(5).attr("id", "stale").text("Settings"),
        SnapshotNode::new("div").attr("role", "menu").children([
            SnapshotNode::new("div")
                .key(10)
                .attr("role", "menuitem")
                .attr("aria-label", "Profile"),
            SnapshotNode::new("div")
                .key(11)
                .attr("role", "menuitem")
                .child(SnapshotNode::new("span").text("  Settings ")),
        ]),
    ]);
    let step = Step::Click(ClickStep {
        selector: "#missing".into(),
        fallbacks: vec![],
        role: Some("menuitem".into()),
        name: Some("Settings".into()),
        offset: None,
        ts: 1.0,
    });
    let t = Target::from_step(&step).unwrap();
    let resolved = resolve_once(&page, &t).unwrap();
    assert_eq!(resolved.strategy, Strategy::Semantic);
    assert_eq!(resolved.key, ElementKey(11));
}

#[test]
fn test_semantic_roles_are_canonical() {
    let page = doc(vec![
        SnapshotNode::new("ul").attr("role", "listbox").child(
            SnapshotNode::new("li")
                .key(10)
                .attr("role", "option")
                .attr("aria-label", "Compact view"),
        ),
    ]);
    let t = Target {
        role: Some("menuitemradio".into()),
        name: Some("compact".into()),
        ..Target::default()
    };
    let resolved = resolve_once(&page, &t).unwrap();
    assert_eq!(resolved.strategy, Strategy::Semantic);
    assert_eq!(resolved.key, ElementKey(10));
}

#[test]
fn test_hidden_menus_are_not_scopes() {
    let page = doc(vec![
        SnapshotNode::new("div").attr("role", "menu").hidden(),
        SnapshotNode::new("div").key(10).attr("data-radix-portal", "").child(
            SnapshotNode::new("div")
                .key(11)
                .attr("role", "menu")
                .child(SnapshotNode::new("div").attr("role", "menuitem")),
        ),
    ]);
    let scopes = visible_scopes(&page);
    assert_eq!(scopes.len(), 1);
    assert_eq!(page.key_of(scopes[0]), Some(ElementKey(11)));
}

#[test]
fn test_name_only_prefers_innermost_element() {
    let page = doc(vec![
        SnapshotNode::new("nav").child(
            SnapshotNode::new("a")
                .key(10)
                .attr("href", "/docs")
                .child(SnapshotNode::new("span").key(11).text("Docs")),
        ),
        SnapshotNode::new("p").text("Read the docs"),
    ]);
    let t = Target {
        selector: "#nope".into(),
        role: Some("menuitem".into()),
        name: Some("Docs".into()),
        ..Target::default()
    };
    let resolved = resolve_once(&page, &t).unwrap();
    assert_eq!(resolved.strategy, Strategy::NameOnly);
    assert_eq!(resolved.key, ElementKey(10));
}

#[test]
fn test_named_step_does_not_fall_back_to_locators() {
    let page = doc(vec![SnapshotNode::new("button").key(10).attr("id", "ok").text("Save")]);
    let t = Target {
        selector: "#ok".into(),
        name: Some("Delete".into()),
        ..Target::default()
    };
    assert!(resolve_once(&page, &t).is_none());
    assert_eq!(
        t.describe_attempts(),
        vec!["#ok".to_string(), "name=\"Delete\"".to_string()]
    );
}

#[test]
fn test_role_only_step_does_not_fall_back_to_locators() {
    let page = doc(vec![SnapshotNode::new("button").key(10).attr("id", "go").text("Go")]);
    let t = Target {
        selector: "#go".into(),
        role: Some("button".into()),
        ..Target::default()
    };
    assert!(resolve_once(&page, &t).is_none());
    assert_eq!(
        t.describe_attempts(),
        vec!["#go".to_string(), "role=button".to_string()]
    );
}

#[test]
fn test_type_step_target_has_no_hints() {
    let step = Step::Type(TypeStep {
        selector: "#box".into(),
        text: "x".into(),
        ts: 0.0,
    });
    let t = Target::from_step(&step).unwrap();
    assert_eq!(t, Target::from_selector("#box"));
    assert!(Target::from_step(&Step::Navigate(retrace_common::trace::NavigateStep {
        url: "https://a".into(),
        ts: 0.0
    }))
    .is_none());
}

#[test]
fn test_label_helpers() {
    assert_eq!(normalize_text("  Hello \n  World "), "hello world");
    assert_eq!(canonical_role("option"), "menuitem");
    assert_eq!(canonical_role("menuitemcheckbox"), "menuitem");
    assert_eq!(canonical_role("button"), "button");
    assert!(roles_match(Some("option"), Some("menuitem")));
    assert!(roles_match(None, None));
    assert!(!roles_match(None, Some("button")));

    let page = doc(vec![
        SnapshotNode::new("button").key(10).attr("aria-label", "Close dialog").text("×"),
    ]);
    let id = page.by_key(ElementKey(10)).unwrap();
    assert_eq!(element_label(&page, id), "close dialog");
}
