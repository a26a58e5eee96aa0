use retrace_common::trace::{ClickStep, Offset, Step, TraceMeta, TypeStep, Viewport};
use retrace_core::assembler::{assemble, merge_consecutive_types};

fn typed(selector: &str, text: &str, ts: f64) -> Step {
    Step::Type(TypeStep {
        selector: selector.into(),
        text: text.into(),
        ts,
    })
}

fn click(selector: &str, ts: f64) -> Step {
    Step::Click(ClickStep {
        selector: selector.into(),
        fallbacks: vec![],
        role: None,
        name: None,
        offset: Some(Offset { x: 1, y: 1 }),
        ts,
    })
}

fn texts(steps: &[Step]) -> Vec<String> {
    steps
        .iter()
        .filter_map(|s| match s {
            Step::Type(t) => Some(t.text.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_merge_within_gap() {
    let merged = merge_consecutive_types(
        vec![typed("#q", "hel", 1.0), typed("#q", "lo", 2.0)],
        1.0,
    );
    assert_eq!(merged, vec![typed("#q", "hello", 1.0)]);
}

#[test]
fn test_no_merge_across_gap_selector_or_other_step() {
    let steps = vec![
        typed("#q", "a", 0.0),
        typed("#q", "b", 1.5),
        typed("#other", "c", 1.6),
        click("#go", 1.7),
        typed("#other", "d", 1.8),
    ];
    let merged = merge_consecutive_types(steps, 1.0);
    assert_eq!(texts(&merged), vec!["a", "b", "c", "d"]);
}

#[test]
fn test_gap_is_measured_from_group_start() {
    let steps = vec![
        typed("#q", "a", 0.0),
        typed("#q", "b", 0.6),
        typed("#q", "c", 1.2),
    ];
    let merged = merge_consecutive_types(steps, 1.0);
    assert_eq!(texts(&merged), vec!["ab", "c"]);
}

#[test]
fn test_merge_is_idempotent() {
    let steps = vec![
        typed("#q", "a", 0.0),
        typed("#q", "b", 0.6),
        typed("#q", "c", 1.2),
        typed("#q", "d", 1.9),
        click("#go", 2.0),
        typed("#q", "e", 2.1),
    ];
    let once = merge_consecutive_types(steps, 1.0);
    let twice = merge_consecutive_types(once.clone(), 1.0);
    assert_eq!(once, twice);
}

#[test]
fn test_assemble_filters_recorder_ui_and_rounds() {
    let meta = TraceMeta {
        user_agent: "test-agent".into(),
        viewport: Viewport {
            width: 800,
            height: 600,
        },
    };
    let steps = vec![
        click("#go", 0.123_456),
        click("#rec-stop", 0.5),
        click("[data-recorder-ui] > button", 0.6),
        typed("#q", "x", 0.700_4),
    ];
    let trace = assemble(meta.clone(), &steps, 1.0);
    assert_eq!(trace.version, 1);
    assert_eq!(trace.meta, meta);
    assert_eq!(trace.steps.len(), 2);
    assert_eq!(trace.steps[0].ts(), 0.123);
    assert_eq!(trace.steps[1].ts(), 0.7);
}
