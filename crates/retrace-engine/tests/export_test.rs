use retrace_common::trace::{NavigateStep, Step, TypeStep, Viewport};
use retrace_common::{Trace, TraceMeta, ValidationError};
use retrace_engine::export::{default_trace_filename, load_trace, save_trace, TraceFileError};

fn sample() -> Trace {
    Trace::new(
        TraceMeta {
            user_agent: "Mozilla/5.0".into(),
            viewport: Viewport {
                width: 1024,
                height: 768,
            },
        },
        vec![
            Step::Navigate(NavigateStep {
                url: "https://example.com".into(),
                ts: 0.0,
            }),
            Step::Type(TypeStep {
                selector: "#q".into(),
                text: "rust".into(),
                ts: 1.25,
            }),
        ],
    )
}

#[tokio::test]
async fn test_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(default_trace_filename());

    save_trace(&sample(), &path).await.unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\n  \"version\": 1"));

    let loaded = load_trace(&path).await.unwrap();
    assert_eq!(loaded, sample());
}

#[tokio::test]
async fn test_load_rejects_bad_files() {
    let dir = tempfile::tempdir().unwrap();

    let missing = load_trace(&dir.path().join("nope.json")).await;
    assert!(matches!(missing, Err(TraceFileError::Io { .. })));

    let garbage = dir.path().join("garbage.json");
    std::fs::write(&garbage, "{not json").unwrap();
    assert!(matches!(
        load_trace(&garbage).await,
        Err(TraceFileError::Invalid(ValidationError::Json(_)))
    ));

    let empty = dir.path().join("empty.json");
    std::fs::write(&empty, r#"{"version": 1, "steps": []}"#).unwrap();
    assert!(matches!(
        load_trace(&empty).await,
        Err(TraceFileError::Invalid(ValidationError::NoSteps))
    ));
}

#[test]
fn test_default_filename_shape() {
    let name = default_trace_filename();
    assert!(name.starts_with("trace-"));
    assert!(name.ends_with(".json"));
    let secs = &name["trace-".len()..name.len() - ".json".len()];
    assert!(secs.parse::<u64>().is_ok());
}
