use retrace_common::snapshot::{PageSnapshot, ScrollPosition, SnapshotNode};
use retrace_common::trace::{Offset, Step, StepKind};
use retrace_core::capture::{CaptureEngine, ManualClock, PageEvent};
use retrace_core::config::CaptureConfig;
use retrace_core::dom::{Document, ElementKey};

const SUBMIT: ElementKey = ElementKey(10);
const BOX: ElementKey = ElementKey(11);
const PASSWORD: ElementKey = ElementKey(12);
const CARD: ElementKey = ElementKey(13);
const SECRET_NOTE: ElementKey = ElementKey(14);
const STOP: ElementKey = ElementKey(20);
const DARK_MODE: ElementKey = ElementKey(30);
const DARK_MODE_ICON: ElementKey = ElementKey(31);
const PLACEHOLDER: ElementKey = ElementKey(40);
const PROMPT: ElementKey = ElementKey(41);

fn page() -> Document {
    let root = SnapshotNode::new("html").child(
        SnapshotNode::new("body").children([
            SnapshotNode::new("button")
                .key(SUBMIT.0)
                .attr("id", "submit")
                .text("Submit")
                .rect(100.0, 50.0, 80.0, 30.0),
            SnapshotNode::new("input").key(BOX.0).attr("id", "box"),
            SnapshotNode::new("input")
                .key(PASSWORD.0)
                .attr("id", "pw")
                .attr("type", "password"),
            SnapshotNode::new("input")
                .key(CARD.0)
                .attr("id", "card")
                .attr("autocomplete", "cc-number"),
            SnapshotNode::new("div")
                .attr("data-private", "")
                .child(SnapshotNode::new("textarea").key(SECRET_NOTE.0).attr("id", "note")),
            SnapshotNode::new("div")
                .attr("role", "menu")
                .child(
                    SnapshotNode::new("div")
                        .key(DARK_MODE.0)
                        .attr("role", "menuitemcheckbox")
                        .attr("aria-label", "Dark mode")
                        .child(SnapshotNode::new("span").key(DARK_MODE_ICON.0).text("☾")),
                ),
            SnapshotNode::new("form").children([
                SnapshotNode::new("div")
                    .key(PLACEHOLDER.0)
                    .attr("data-placeholder", "Ask anything"),
                SnapshotNode::new("textarea").key(PROMPT.0).attr("id", "prompt"),
            ]),
            SnapshotNode::new("div")
                .attr("data-recorder-ui", "true")
                .child(SnapshotNode::new("button").key(STOP.0).attr("id", "rec-stop").text("Stop")),
        ]),
    );
    Document::from_snapshot(PageSnapshot::new("https://example.com", root))
}

fn engine() -> (CaptureEngine, ManualClock) {
    let clock = ManualClock::new();
    let engine = CaptureEngine::with_clock(CaptureConfig::default(), Box::new(clock.clone()));
    (engine, clock)
}

fn input(target: ElementKey, data: &str) -> PageEvent {
    PageEvent::Input {
        target,
        data: Some(data.to_string()),
    }
}

fn kinds(steps: &[Step]) -> Vec<StepKind> {
    steps.iter().map(Step::kind).collect()
}

#[test]
fn test_scenario_click_then_typing_merges() {
    let doc = page();
    let (mut engine, clock) = engine();
    assert!(engine.start(&doc));

    clock.advance_ms(500);
    engine.handle(
        &doc,
        PageEvent::PointerDown {
            target: SUBMIT,
            client_x: 110.0,
            client_y: 55.0,
        },
    );
    clock.advance_ms(20);
    engine.handle(
        &doc,
        PageEvent::Click {
            target: SUBMIT,
            client_x: 110.0,
            client_y: 55.0,
        },
    );

    clock.advance_ms(480);
    engine.handle(&doc, input(BOX, "hi"));
    clock.advance_ms(500);
    engine.handle(&doc, input(BOX, "hi"));
    clock.advance_ms(300);
    assert_eq!(engine.fire_due_timers(), 1);

    let trace = engine.trace();
    assert_eq!(trace.version, 1);
    assert_eq!(
        kinds(&trace.steps),
        vec![StepKind::Navigate, StepKind::Click, StepKind::Type]
    );

    match &trace.steps[0] {
        Step::Navigate(nav) => {
            assert_eq!(nav.url, "https://example.com");
            assert_eq!(nav.ts, 0.0);
        }
        other => panic!("unexpected {:?}", other),
    }
    match &trace.steps[1] {
        Step::Click(click) => {
            assert_eq!(click.selector, "#submit");
            assert_eq!(click.offset, Some(Offset { x: 10, y: 5 }));
            assert_eq!(click.ts, 0.5);
        }
        other => panic!("unexpected {:?}", other),
    }
    match &trace.steps[2] {
        Step::Type(typed) => {
            assert_eq!(typed.selector, "#box");
            assert_eq!(typed.text, "hihi");
            assert_eq!(typed.ts, 1.2);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_timestamps_are_non_decreasing() {
    let doc = page();
    let (mut engine, clock) = engine();
    engine.start(&doc);
    for i in 0..5 {
        clock.advance_ms(90);
        engine.handle(&doc, input(BOX, "x"));
        engine.handle(&doc, PageEvent::Scroll { x: 0, y: i * 100 + 100 });
        clock.advance_ms(400);
        engine.fire_due_timers();
    }
    let trace = engine.trace();
    assert!(trace.steps.windows(2).all(|w| w[0].ts() <= w[1].ts()));
    assert!(trace.steps.iter().all(|s| s.ts() >= 0.0));
}

#[test]
fn test_private_fields_are_never_buffered() {
    let doc = page();
    let (mut engine, clock) = engine();
    engine.start(&doc);
    for target in [PASSWORD, CARD, SECRET_NOTE] {
        engine.handle(&doc, input(target, "secret"));
        engine.handle(&doc, PageEvent::Blur { target });
    }
    clock.advance_ms(1000);
    engine.fire_due_timers();
    engine.stop();
    assert!(engine.steps().iter().all(|s| s.kind() != StepKind::Type));
}

#[test]
fn test_click_after_pointerdown_is_deduplicated() {
    let doc = page();
    let (mut engine, clock) = engine();
    engine.start(&doc);
    let down = PageEvent::PointerDown {
        target: SUBMIT,
        client_x: 120.0,
        client_y: 60.0,
    };
    let click = PageEvent::Click {
        target: SUBMIT,
        client_x: 120.0,
        client_y: 60.0,
    };

    engine.handle(&doc, down);
    clock.advance_ms(249);
    engine.handle(&doc, click.clone());
    assert_eq!(engine.steps().len(), 2);

    clock.advance_ms(100);
    engine.handle(&doc, click);
    assert_eq!(engine.steps().len(), 3);
}

#[test]
fn test_menu_click_records_semantics_and_assertion() {
    let doc = page();
    let (mut engine, _clock) = engine();
    engine.start(&doc);
    engine.handle(
        &doc,
        PageEvent::PointerDown {
            target: DARK_MODE_ICON,
            client_x: 5.0,
            client_y: 5.0,
        },
    );

    let steps = engine.steps();
    assert_eq!(
        kinds(steps),
        vec![StepKind::Navigate, StepKind::Click, StepKind::WaitVisible]
    );
    let Step::Click(click) = &steps[1] else {
        panic!("expected click");
    };
    assert_eq!(click.role.as_deref(), Some("menuitemcheckbox"));
    assert_eq!(click.name.as_deref(), Some("Dark mode"));
    assert_eq!(click.selector, r#"[aria-label="Dark mode"]"#);
    assert!(click
        .fallbacks
        .contains(&r#"[role="menuitemcheckbox"][aria-label="Dark mode"]"#.to_string()));

    let Step::WaitVisible(wait) = &steps[2] else {
        panic!("expected waitVisible");
    };
    assert_eq!(
        wait.selector,
        r#"[role^="menuitem"][aria-label="Dark mode"][aria-checked="true"]"#
    );
    assert_eq!(wait.timeout, 3000);
}

#[test]
fn test_placeholder_click_targets_real_input() {
    let doc = page();
    let (mut engine, _clock) = engine();
    engine.start(&doc);
    engine.handle(
        &doc,
        PageEvent::Click {
            target: PLACEHOLDER,
            client_x: 3.0,
            client_y: 3.0,
        },
    );
    let Step::Click(click) = &engine.steps()[1] else {
        panic!("expected click");
    };
    assert_eq!(click.selector, "#prompt");
    assert_eq!(click.role, None);
}

#[test]
fn test_enter_flushes_and_records_key() {
    let doc = page();
    let (mut engine, clock) = engine();
    engine.start(&doc);
    engine.handle(&doc, input(BOX, "query"));
    clock.advance_ms(50);
    engine.handle(
        &doc,
        PageEvent::KeyDown {
            target: BOX,
            key: "Enter".into(),
        },
    );
    engine.handle(
        &doc,
        PageEvent::KeyDown {
            target: BOX,
            key: "a".into(),
        },
    );
    assert_eq!(
        kinds(engine.steps()),
        vec![StepKind::Navigate, StepKind::Type, StepKind::Key]
    );
    assert_eq!(engine.next_deadline(), None);
}

#[test]
fn test_delta_from_value_when_event_has_no_data() {
    let (mut engine, clock) = engine();
    let with_value = |value: &str| {
        let root = SnapshotNode::new("html").child(
            SnapshotNode::new("body")
                .child(SnapshotNode::new("input").key(BOX.0).attr("id", "box").value(value)),
        );
        Document::from_snapshot(PageSnapshot::new("https://example.com", root))
    };
    engine.start(&with_value(""));
    for value in ["h", "he", "hey"] {
        engine.handle(
            &with_value(value),
            PageEvent::Input {
                target: BOX,
                data: None,
            },
        );
        clock.advance_ms(50);
    }
    engine.handle(&with_value("hey"), PageEvent::Blur { target: BOX });
    let Step::Type(typed) = &engine.steps()[1] else {
        panic!("expected type");
    };
    assert_eq!(typed.text, "hey");
}

#[test]
fn test_scroll_is_debounced_and_deduplicated() {
    let mut doc = page();
    doc.scroll = ScrollPosition { x: 0, y: 0 };
    let (mut engine, clock) = engine();
    engine.start(&doc);

    engine.handle(&doc, PageEvent::Scroll { x: 0, y: 300 });
    clock.advance_ms(50);
    engine.handle(&doc, PageEvent::Scroll { x: 0, y: 400 });
    clock.advance_ms(100);
    assert_eq!(engine.fire_due_timers(), 0);
    clock.advance_ms(50);
    assert_eq!(engine.fire_due_timers(), 1);

    engine.handle(&doc, PageEvent::Scroll { x: 0, y: 400 });
    clock.advance_ms(200);
    engine.fire_due_timers();

    let scrolls: Vec<_> = engine
        .steps()
        .iter()
        .filter_map(|s| match s {
            Step::Scroll(scroll) => Some((scroll.x, scroll.y)),
            _ => None,
        })
        .collect();
    assert_eq!(scrolls, vec![(0, 400)]);
}

#[test]
fn test_stop_flushes_and_cancels_timers() {
    let doc = page();
    let (mut engine, clock) = engine();
    engine.start(&doc);
    engine.handle(&doc, input(BOX, "pending"));
    engine.handle(&doc, PageEvent::Scroll { x: 0, y: 900 });
    assert!(engine.next_deadline().is_some());

    assert!(engine.stop());
    assert!(!engine.is_recording());
    let after_stop = engine.steps().len();
    assert_eq!(
        kinds(engine.steps()),
        vec![StepKind::Navigate, StepKind::Type]
    );

    clock.advance_ms(5000);
    assert_eq!(engine.fire_due_timers(), 0);
    engine.handle(&doc, input(BOX, "late"));
    assert_eq!(engine.steps().len(), after_stop);
    assert_eq!(engine.next_deadline(), None);
    assert!(!engine.stop());
}

#[test]
fn test_recorder_ui_and_unknown_targets_are_ignored() {
    let doc = page();
    let (mut engine, _clock) = engine();
    engine.start(&doc);
    engine.handle(
        &doc,
        PageEvent::PointerDown {
            target: STOP,
            client_x: 1.0,
            client_y: 1.0,
        },
    );
    engine.handle(
        &doc,
        PageEvent::Click {
            target: ElementKey(9999),
            client_x: 1.0,
            client_y: 1.0,
        },
    );
    assert_eq!(engine.steps().len(), 1);
}

#[test]
fn test_start_is_noop_while_recording() {
    let doc = page();
    let (mut engine, clock) = engine();
    assert!(engine.start(&doc));
    clock.advance_ms(100);
    engine.handle(&doc, input(BOX, "a"));
    assert!(!engine.start(&doc));
    assert!(engine.next_deadline().is_some());
}

#[test]
fn test_reused_keys_after_navigation_get_fresh_selectors() {
    const SHARED: ElementKey = ElementKey(5);
    let first = Document::from_snapshot(
        PageSnapshot::new(
            "https://example.com/a",
            SnapshotNode::new("html").child(SnapshotNode::new("body").children([
                SnapshotNode::new("a")
                    .key(SHARED.0)
                    .attr("id", "next")
                    .attr("href", "/b"),
                SnapshotNode::new("input").key(6).attr("id", "search"),
            ])),
        )
        .with_document_id("doc-a"),
    );
    let second = Document::from_snapshot(
        PageSnapshot::new(
            "https://example.com/b",
            SnapshotNode::new("html").child(SnapshotNode::new("body").children([
                SnapshotNode::new("button").key(SHARED.0).attr("id", "buy"),
                SnapshotNode::new("input").key(6).attr("id", "qty"),
            ])),
        )
        .with_document_id("doc-b"),
    );

    let (mut engine, clock) = engine();
    engine.start(&first);
    engine.handle(&first, input(ElementKey(6), "shoes"));
    clock.advance_ms(50);
    engine.handle(
        &first,
        PageEvent::PointerDown {
            target: SHARED,
            client_x: 1.0,
            client_y: 1.0,
        },
    );
    clock.advance_ms(1000);
    engine.handle(
        &second,
        PageEvent::PointerDown {
            target: SHARED,
            client_x: 1.0,
            client_y: 1.0,
        },
    );
    engine.handle(&second, input(ElementKey(6), "2"));
    engine.stop();

    let selectors: Vec<(StepKind, String)> = engine
        .steps()
        .iter()
        .filter_map(|s| s.selector().map(|sel| (s.kind(), sel.to_string())))
        .collect();
    assert_eq!(
        selectors,
        vec![
            (StepKind::Click, "#next".to_string()),
            (StepKind::Type, "#search".to_string()),
            (StepKind::Click, "#buy".to_string()),
            (StepKind::Type, "#qty".to_string()),
        ]
    );
}
