//! Screencast capture: every frame Chromium pushes is written as a numbered JPEG.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::page::{
    EventScreencastFrame, ScreencastFrameAckParams, StartScreencastFormat, StartScreencastParams,
    StopScreencastParams,
};
use futures::StreamExt;
use retrace_common::BackendError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const JPEG_QUALITY: i64 = 80;

pub struct VideoRecorder {
    dir: PathBuf,
    frames: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

pub fn frame_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("frame-{:05}.jpg", index))
}

impl VideoRecorder {
    pub async fn start(page: &Page, dir: &Path) -> Result<Self, BackendError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| BackendError::Other(format!("Cannot create {}: {}", dir.display(), e)))?;

        let mut events = page
            .event_listener::<EventScreencastFrame>()
            .await
            .map_err(|e| BackendError::Other(format!("Failed to subscribe to screencast: {}", e)))?;

        let frames = Arc::new(AtomicUsize::new(0));
        let counter = frames.clone();
        let frame_dir = dir.to_path_buf();
        let ack_page = page.clone();
        let task = tokio::spawn(async move {
            while let Some(frame) = events.next().await {
                if let Err(e) = ack_page
                    .execute(ScreencastFrameAckParams::new(frame.session_id))
                    .await
                {
                    debug!("Screencast ack failed: {}", e);
                }
                let encoded: &str = frame.data.as_ref();
                let bytes = match STANDARD.decode(encoded) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("Dropping undecodable screencast frame: {}", e);
                        continue;
                    }
                };
                let index = counter.fetch_add(1, Ordering::SeqCst);
                if let Err(e) = tokio::fs::write(frame_path(&frame_dir, index), bytes).await {
                    warn!("Failed to write screencast frame {}: {}", index, e);
                }
            }
        });

        let params = StartScreencastParams::builder()
            .format(StartScreencastFormat::Jpeg)
            .quality(JPEG_QUALITY)
            .every_nth_frame(1)
            .build();
        page.execute(params)
            .await
            .map_err(|e| BackendError::Other(format!("Failed to start screencast: {}", e)))?;

        info!(dir = %dir.display(), "Recording video");
        Ok(Self {
            dir: dir.to_path_buf(),
            frames,
            task,
        })
    }

    /// Stop the screencast and return how many frames were written.
    pub async fn stop(self, page: &Page) -> Result<usize, BackendError> {
        let result = page
            .execute(StopScreencastParams::default())
            .await
            .map_err(|e| BackendError::Other(format!("Failed to stop screencast: {}", e)));
        self.task.abort();
        let frames = self.frames.load(Ordering::SeqCst);
        info!(frames, dir = %self.dir.display(), "Video stopped");
        result.map(|_| frames)
    }
}
