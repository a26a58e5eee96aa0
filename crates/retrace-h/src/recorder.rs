//! Bridges page-side capture listeners to the recorder task.
//!
//! The page script reports each interaction through a CDP binding together with
//! a fresh snapshot; the REC badge's Stop button reports `{"kind":"stop"}`.

use crate::cdp::{self, CdpResult};
use crate::inject;
use chromiumoxide::Page;
use futures::StreamExt;
use retrace_common::Trace;
use retrace_common::protocol::{ActionResponse, ActionData, PageAction, SnapshotRequest};
use retrace_common::snapshot::PageSnapshot;
use retrace_core::capture::PageEvent;
use retrace_core::config::CaptureConfig;
use retrace_core::ElementKey;
use retrace_engine::recorder::{spawn_recorder, CapturedEvent, RecorderHandle};
use retrace_scanner::{EMIT_BINDING, PAGE_SCRIPT};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const START_CAPTURE: &str = "if (document.readyState === 'loading') { \
    document.addEventListener('DOMContentLoaded', () => window.__retrace.startCapture()); \
    } else { window.__retrace.startCapture(); }";

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WireEvent {
    PointerDown {
        target: u64,
        client_x: f64,
        client_y: f64,
    },
    Click {
        target: u64,
        client_x: f64,
        client_y: f64,
    },
    Input {
        target: u64,
        #[serde(default)]
        data: Option<String>,
    },
    Blur {
        target: u64,
    },
    KeyDown {
        target: u64,
        key: String,
    },
    Scroll {
        x: i64,
        y: i64,
    },
}

impl From<WireEvent> for PageEvent {
    fn from(event: WireEvent) -> Self {
        match event {
            WireEvent::PointerDown {
                target,
                client_x,
                client_y,
            } => PageEvent::PointerDown {
                target: ElementKey(target),
                client_x,
                client_y,
            },
            WireEvent::Click {
                target,
                client_x,
                client_y,
            } => PageEvent::Click {
                target: ElementKey(target),
                client_x,
                client_y,
            },
            WireEvent::Input { target, data } => PageEvent::Input {
                target: ElementKey(target),
                data,
            },
            WireEvent::Blur { target } => PageEvent::Blur {
                target: ElementKey(target),
            },
            WireEvent::KeyDown { target, key } => PageEvent::KeyDown {
                target: ElementKey(target),
                key,
            },
            WireEvent::Scroll { x, y } => PageEvent::Scroll { x, y },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ControlKind {
    Stop,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BindingPayload {
    Captured {
        event: WireEvent,
        snapshot: PageSnapshot,
    },
    Control {
        kind: ControlKind,
    },
}

/// A decoded binding call.
#[derive(Debug)]
pub enum BridgeMessage {
    Event(Box<CapturedEvent>),
    Stop,
}

pub fn parse_payload(payload: &str) -> Result<BridgeMessage, serde_json::Error> {
    Ok(match serde_json::from_str(payload)? {
        BindingPayload::Captured { event, snapshot } => BridgeMessage::Event(Box::new(CapturedEvent {
            event: event.into(),
            snapshot,
        })),
        BindingPayload::Control {
            kind: ControlKind::Stop,
        } => BridgeMessage::Stop,
    })
}

async fn page_snapshot(page: &Page) -> CdpResult<PageSnapshot> {
    let request = serde_json::to_value(PageAction::Snapshot(SnapshotRequest::default()))?;
    let response: ActionResponse = serde_json::from_value(inject::process(page, &request).await?)?;
    match response {
        ActionResponse::Ok { data } => match *data {
            ActionData::Snapshot(result) => Ok(result.snapshot),
            ActionData::Action(_) => Err("page script returned no snapshot".into()),
        },
        ActionResponse::Error { message } => Err(message.into()),
    }
}

pub struct LiveRecorder {
    handle: RecorderHandle,
    actor: JoinHandle<()>,
    forwarder: JoinHandle<()>,
    stop_requested: Arc<Notify>,
}

impl LiveRecorder {
    /// Install the capture listeners and badge in `page` and start recording.
    pub async fn attach(page: &Page, config: CaptureConfig) -> CdpResult<Self> {
        let mut calls = cdp::expose_binding(page, EMIT_BINDING).await?;
        cdp::add_init_script(page, format!("{}\n{}", PAGE_SCRIPT, START_CAPTURE)).await?;

        let (handle, actor) = spawn_recorder(config);
        let stop_requested = Arc::new(Notify::new());

        let events = handle.event_sender();
        let notify = stop_requested.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(call) = calls.next().await {
                if call.name != EMIT_BINDING {
                    continue;
                }
                match parse_payload(&call.payload) {
                    Ok(BridgeMessage::Event(captured)) => {
                        if events.send(*captured).await.is_err() {
                            break;
                        }
                    }
                    Ok(BridgeMessage::Stop) => {
                        info!("Stop requested from the page");
                        notify.notify_one();
                    }
                    Err(e) => warn!("Ignoring malformed capture payload: {}", e),
                }
            }
            debug!("binding forwarder finished");
        });

        let snapshot = page_snapshot(page).await?;
        handle.start(snapshot).await?;
        inject::evaluate(page, "window.__retrace.startCapture()").await?;
        info!("Recording; click Stop in the page badge or press Ctrl-C to finish");

        Ok(Self {
            handle,
            actor,
            forwarder,
            stop_requested,
        })
    }

    pub fn handle(&self) -> &RecorderHandle {
        &self.handle
    }

    /// Resolves once the page's Stop button is clicked.
    pub async fn stopped_from_page(&self) {
        self.stop_requested.notified().await;
    }

    /// Remove the listeners and badge and return the assembled trace.
    pub async fn finish(self, page: &Page) -> CdpResult<Trace> {
        if let Err(e) = inject::evaluate(page, "window.__retrace.stopCapture()").await {
            warn!("Could not detach capture listeners: {}", e);
        }
        let trace = self.handle.stop().await?;
        self.forwarder.abort();
        drop(self.handle);
        if let Err(e) = self.actor.await {
            debug!("recorder task ended abnormally: {}", e);
        }
        Ok(trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stop_payload() {
        assert!(matches!(
            parse_payload(r#"{"kind":"stop"}"#).unwrap(),
            BridgeMessage::Stop
        ));
    }

    #[test]
    fn test_parse_captured_event() {
        let payload = r#"{
            "event": {"kind": "input", "target": 7, "data": "h"},
            "snapshot": {"url": "https://example.com", "root": {"tag": "html"}}
        }"#;
        match parse_payload(payload).unwrap() {
            BridgeMessage::Event(captured) => {
                assert_eq!(
                    captured.event,
                    PageEvent::Input {
                        target: ElementKey(7),
                        data: Some("h".into())
                    }
                );
                assert_eq!(captured.snapshot.url, "https://example.com");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_scroll_and_keys() {
        let payload = r#"{"event": {"kind": "scroll", "x": 0, "y": 420},
            "snapshot": {"url": "u", "root": {"tag": "html"}}}"#;
        assert!(matches!(
            parse_payload(payload).unwrap(),
            BridgeMessage::Event(c) if c.event == PageEvent::Scroll { x: 0, y: 420 }
        ));
        assert!(parse_payload(r#"{"kind":"launch"}"#).is_err());
    }
}
