use retrace_common::formatter::format_status;
use retrace_common::status::StatusEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

const DEFAULT_CAPACITY: usize = 64;

/// Fire-and-forget replay notifications. Sending with nobody listening is fine.
#[derive(Debug, Clone)]
pub struct StatusChannel {
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Log status events until the run finishes or the channel closes. Returns how many were logged.
pub async fn log_events(mut events: broadcast::Receiver<StatusEvent>) -> usize {
    let mut logged = 0;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "status logger fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        logged += 1;
        match &event {
            StatusEvent::Error { .. } => warn!("{}", format_status(&event)),
            _ => info!("{}", format_status(&event)),
        }
        if matches!(event, StatusEvent::Done | StatusEvent::Error { index: None, .. }) {
            break;
        }
    }
    logged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(index: usize) -> StatusEvent {
        StatusEvent::Step {
            index,
            step_type: "click".into(),
        }
    }

    #[tokio::test]
    async fn test_logger_survives_lag_and_stops_at_done() {
        let status = StatusChannel::new(2);
        let rx = status.subscribe();
        status.emit(StatusEvent::Started);
        for i in 0..5 {
            status.emit(step(i));
        }
        status.emit(StatusEvent::Done);
        // Only the last two events are still buffered.
        assert_eq!(log_events(rx).await, 2);
    }

    #[tokio::test]
    async fn test_logger_ends_when_channel_closes() {
        let status = StatusChannel::default();
        let rx = status.subscribe();
        status.emit(step(0));
        drop(status);
        assert_eq!(log_events(rx).await, 1);
    }
}
