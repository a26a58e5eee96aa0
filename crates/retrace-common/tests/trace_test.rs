use retrace_common::protocol::{ActionData, ActionResponse, PageAction, PressKeyRequest};
use retrace_common::snapshot::PageSnapshot;
use retrace_common::status::StatusEvent;
use retrace_common::trace::{ClickStep, ScrollTarget, Step, StepKind, Trace};
use serde_json::json;

#[test]
fn test_step_tags_and_optional_fields() {
    let step = Step::Click(ClickStep {
        selector: "#go".into(),
        fallbacks: vec![],
        role: None,
        name: None,
        offset: None,
        ts: 0.25,
    });
    let value = serde_json::to_value(&step).unwrap();
    assert_eq!(value, json!({"type": "click", "selector": "#go", "ts": 0.25}));

    let wait: Step = serde_json::from_value(json!({
        "type": "waitVisible", "selector": "#x", "timeout": 3000, "ts": 1.0
    }))
    .unwrap();
    assert_eq!(wait.kind(), StepKind::WaitVisible);
    assert_eq!(wait.selector(), Some("#x"));
}

#[test]
fn test_defaults_for_key_and_scroll() {
    let key: Step = serde_json::from_value(json!({"type": "key", "selector": "#q", "ts": 0})).unwrap();
    match key {
        Step::Key(k) => assert_eq!(k.key, "Enter"),
        other => panic!("unexpected {:?}", other),
    }
    let scroll: Step = serde_json::from_value(json!({"type": "scroll", "x": 0, "y": 10, "ts": 0})).unwrap();
    match scroll {
        Step::Scroll(s) => assert_eq!(s.target, ScrollTarget::Window),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_trace_document_shape() {
    let trace: Trace = serde_json::from_value(json!({
        "version": 1,
        "meta": {"userAgent": "UA", "viewport": {"width": 800, "height": 600}},
        "steps": [{"type": "navigate", "url": "https://example.com", "ts": 0}]
    }))
    .unwrap();
    assert!(trace.has_navigate());
    assert_eq!(trace.meta.user_agent, "UA");
    let back = serde_json::to_value(&trace).unwrap();
    assert_eq!(back["meta"]["userAgent"], "UA");
    assert_eq!(back["steps"][0]["type"], "navigate");
}

#[test]
fn test_step_kind_tags() {
    for kind in StepKind::ALL {
        assert_eq!(StepKind::from_tag(kind.as_str()), Some(kind));
    }
    assert_eq!(StepKind::from_tag("hover"), None);
}

#[test]
fn test_page_action_wire_format() {
    let action = PageAction::PressKey(PressKeyRequest {
        key: 7,
        key_name: "Enter".into(),
    });
    assert_eq!(
        serde_json::to_value(&action).unwrap(),
        json!({"action": "press_key", "key": 7, "key_name": "Enter"})
    );

    let ok: ActionResponse = serde_json::from_value(json!({"status": "ok", "success": true})).unwrap();
    assert!(matches!(ok, ActionResponse::Ok { ref data } if matches!(**data, ActionData::Action(_))));

    let err: ActionResponse =
        serde_json::from_value(json!({"status": "error", "message": "no such element"})).unwrap();
    assert!(matches!(err, ActionResponse::Error { message } if message == "no such element"));
}

#[test]
fn test_status_event_wire_format() {
    let step = StatusEvent::Step {
        index: 2,
        step_type: "click".into(),
    };
    assert_eq!(
        serde_json::to_value(&step).unwrap(),
        json!({"status": "step", "index": 2, "stepType": "click"})
    );
    assert_eq!(
        serde_json::to_value(StatusEvent::Error {
            index: None,
            message: "bad".into()
        })
        .unwrap(),
        json!({"status": "error", "message": "bad"})
    );
}

#[test]
fn test_snapshot_minimal_payload() {
    let snapshot: PageSnapshot = serde_json::from_value(json!({
        "url": "https://example.com",
        "root": {"tag": "html", "children": [{"key": 3, "tag": "body"}]}
    }))
    .unwrap();
    assert_eq!(snapshot.document_id, "");
    assert_eq!(snapshot.root.children[0].key, Some(3));

    let tagged: PageSnapshot = serde_json::from_value(json!({
        "url": "https://example.com", "documentId": "d1", "root": {"tag": "html"}
    }))
    .unwrap();
    assert_eq!(tagged.document_id, "d1");
}
