use retrace_common::Trace;
use retrace_engine::artifacts::{ArtifactWriter, ERROR_LOG};
use retrace_engine::backend::{take_snapshot, Backend};
use retrace_engine::replay::{ReplayOptions, Replayer};
use retrace_h::HeadlessBackend;
use serde_json::json;
use serial_test::serial;

const PAGE: &str = "<html><head><title>Replay Page</title></head><body>\
<button id='go' onclick=\"document.getElementById('out').textContent='clicked'\">Go</button>\
<input id='q'><div id='out'></div></body></html>";

fn init_logging() {
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::INFO)
        .try_init()
        .ok();
}

async fn launch() -> Option<HeadlessBackend> {
    let mut backend = HeadlessBackend::new();
    match backend.launch().await {
        Ok(()) => Some(backend),
        Err(e) => {
            eprintln!("Failed to launch browser (is Chromium installed?): {}", e);
            None
        }
    }
}

#[tokio::test]
#[serial]
async fn test_driver_replays_trace_in_chromium() {
    init_logging();
    let Some(mut backend) = launch().await else {
        return;
    };
    let url = format!("data:text/html,{}", PAGE);
    let trace: Trace = serde_json::from_value(json!({
        "version": 1,
        "meta": {"userAgent": "test", "viewport": {"width": 1280, "height": 720}},
        "steps": [
            {"type": "navigate", "url": url, "ts": 0},
            {"type": "click", "selector": "#go", "offset": {"x": 5, "y": 5}, "ts": 0.5},
            {"type": "type", "selector": "#q", "text": "hello", "ts": 1.0},
            {"type": "key", "selector": "#q", "key": "Enter", "ts": 1.5}
        ]
    }))
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let report = Replayer::new(&mut backend, ReplayOptions::driver())
        .with_artifacts(ArtifactWriter::new(dir.path()))
        .run(&trace)
        .await
        .expect("replay failed");
    assert!(report.is_clean(), "failures: {:?}", report.failures);

    let doc = take_snapshot(&mut backend).await.expect("snapshot failed");
    assert_eq!(doc.title, "Replay Page");
    let out = doc.query("#out").unwrap().expect("#out missing");
    assert_eq!(doc.text_content(out), "clicked");
    let q = doc.query("#q").unwrap().expect("#q missing");
    assert_eq!(doc.current_value(q), "hello");
    assert!(!dir.path().join(ERROR_LOG).exists());

    backend.close().await.expect("Close failed");
}

#[tokio::test]
#[serial]
async fn test_missing_element_is_isolated_with_screenshot() {
    init_logging();
    let Some(mut backend) = launch().await else {
        return;
    };
    let url = format!("data:text/html,{}", PAGE);
    let trace: Trace = serde_json::from_value(json!({
        "version": 1,
        "meta": {"userAgent": "test", "viewport": {"width": 800, "height": 600}},
        "steps": [
            {"type": "navigate", "url": url, "ts": 0},
            {"type": "click", "selector": "#nope", "ts": 0.5},
            {"type": "type", "selector": "#q", "text": "still runs", "ts": 1.0}
        ]
    }))
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let mut options = ReplayOptions::driver();
    options.element_timeout = std::time::Duration::from_millis(300);
    let report = Replayer::new(&mut backend, options)
        .with_artifacts(ArtifactWriter::new(dir.path()))
        .run(&trace)
        .await
        .expect("replay failed");

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 1);
    let png = std::fs::read(dir.path().join("step-1-click.png")).unwrap();
    assert!(png.starts_with(b"\x89PNG"));

    let doc = take_snapshot(&mut backend).await.expect("snapshot failed");
    let q = doc.query("#q").unwrap().expect("#q missing");
    assert_eq!(doc.current_value(q), "still runs");

    backend.close().await.expect("Close failed");
}
