//! Live recording session.
//!
//! A single task owns the [`CaptureEngine`]. Control requests, page events and
//! debounce deadlines are multiplexed on that task, so the engine never needs
//! a lock and no timer can fire after `stop` has been answered.

use retrace_common::Trace;
use retrace_common::snapshot::PageSnapshot;
use retrace_core::capture::{CaptureEngine, PageEvent, RecorderState, SystemClock};
use retrace_core::config::CaptureConfig;
use retrace_core::Document;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessagingError {
    #[error("recorder did not respond within {0:?}")]
    NoResponse(Duration),
    #[error("recorder is not running")]
    Closed,
}

/// Control messages understood by the recorder task.
#[derive(Debug)]
pub enum RecorderRequest {
    /// Begin a session on the page the snapshot shows; replies whether it started.
    Start {
        snapshot: PageSnapshot,
        reply: oneshot::Sender<bool>,
    },
    /// End the session; replies with the assembled trace.
    Stop { reply: oneshot::Sender<Trace> },
    /// Assembled trace so far, without stopping.
    Dump { reply: oneshot::Sender<Trace> },
    QueryState { reply: oneshot::Sender<RecorderState> },
}

/// A page event together with the page as it was when the event fired.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub event: PageEvent,
    pub snapshot: PageSnapshot,
}

#[derive(Debug, Clone)]
pub struct RecorderHandle {
    requests: mpsc::Sender<RecorderRequest>,
    events: mpsc::Sender<CapturedEvent>,
    request_timeout: Duration,
}

impl RecorderHandle {
    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RecorderRequest,
    ) -> Result<T, MessagingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(build(reply_tx))
            .await
            .map_err(|_| MessagingError::Closed)?;
        match timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(MessagingError::Closed),
            Err(_) => Err(MessagingError::NoResponse(self.request_timeout)),
        }
    }

    pub async fn start(&self, snapshot: PageSnapshot) -> Result<bool, MessagingError> {
        self.call(|reply| RecorderRequest::Start { snapshot, reply })
            .await
    }

    pub async fn stop(&self) -> Result<Trace, MessagingError> {
        self.call(|reply| RecorderRequest::Stop { reply }).await
    }

    pub async fn dump(&self) -> Result<Trace, MessagingError> {
        self.call(|reply| RecorderRequest::Dump { reply }).await
    }

    pub async fn state(&self) -> Result<RecorderState, MessagingError> {
        self.call(|reply| RecorderRequest::QueryState { reply })
            .await
    }

    /// Queue a page event. Events are handled in the order they are sent.
    pub async fn send_event(&self, event: CapturedEvent) -> Result<(), MessagingError> {
        self.events
            .send(event)
            .await
            .map_err(|_| MessagingError::Closed)
    }

    /// A sender for event sources that outlive a borrow of the handle.
    pub fn event_sender(&self) -> mpsc::Sender<CapturedEvent> {
        self.events.clone()
    }
}

struct RecorderActor {
    engine: CaptureEngine,
    origin: Instant,
    requests: mpsc::Receiver<RecorderRequest>,
    events: mpsc::Receiver<CapturedEvent>,
}

impl RecorderActor {
    async fn run(mut self) {
        let mut events_open = true;
        loop {
            let deadline = self.engine.next_deadline().map(|d| self.origin + d);
            // Events queued before a request are handled before it.
            tokio::select! {
                biased;
                event = self.events.recv(), if events_open => match event {
                    Some(captured) => {
                        let doc = Document::from_snapshot(captured.snapshot);
                        self.engine.handle(&doc, captured.event);
                    }
                    None => events_open = false,
                },
                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let fired = self.engine.fire_due_timers();
                    debug!(fired, "debounce timers fired");
                }
            }
        }
        if self.engine.stop() {
            warn!("recorder handle dropped while recording");
        }
        debug!("recorder task finished");
    }

    fn handle_request(&mut self, request: RecorderRequest) {
        match request {
            RecorderRequest::Start { snapshot, reply } => {
                let doc = Document::from_snapshot(snapshot);
                let started = self.engine.start(&doc);
                if !started {
                    info!("recording already active");
                }
                let _ = reply.send(started);
            }
            RecorderRequest::Stop { reply } => {
                self.engine.stop();
                let _ = reply.send(self.engine.trace());
            }
            RecorderRequest::Dump { reply } => {
                let _ = reply.send(self.engine.trace());
            }
            RecorderRequest::QueryState { reply } => {
                let _ = reply.send(self.engine.state());
            }
        }
    }
}

/// Spawn the recorder task on the current runtime.
pub fn spawn_recorder(config: CaptureConfig) -> (RecorderHandle, JoinHandle<()>) {
    let (request_tx, request_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(256);

    let clock = SystemClock::new();
    let origin = Instant::from_std(clock.origin());
    let actor = RecorderActor {
        engine: CaptureEngine::with_clock(config, Box::new(clock)),
        origin,
        requests: request_rx,
        events: event_rx,
    };
    let task = tokio::spawn(actor.run());

    let handle = RecorderHandle {
        requests: request_tx,
        events: event_tx,
        request_timeout: DEFAULT_REQUEST_TIMEOUT,
    };
    (handle, task)
}
