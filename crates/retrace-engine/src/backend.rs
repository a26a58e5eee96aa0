use async_trait::async_trait;
pub use retrace_common::BackendError;
use retrace_common::protocol::{
    ActionData, ActionResponse, ActionResult, PageAction, SnapshotRequest,
};
use retrace_common::trace::Viewport;
use retrace_core::Document;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub url: String,
    pub title: String,
}

/// A browser page the replayer and recorder can drive.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Start the browser (or connect to one).
    async fn launch(&mut self) -> Result<(), BackendError>;

    async fn close(&mut self) -> Result<(), BackendError>;

    async fn is_ready(&self) -> bool;

    /// Navigate and wait for the page to load.
    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError>;

    /// Run one action through the injected page script.
    async fn execute(&mut self, action: PageAction) -> Result<ActionResponse, BackendError>;

    /// PNG of the current viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>, BackendError>;

    async fn set_viewport(&mut self, _viewport: Viewport) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("set_viewport".into()))
    }

    /// Start writing screencast frames under `dir`.
    async fn start_video(&mut self, _dir: &Path) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("start_video".into()))
    }

    /// Stop the screencast; returns the number of frames written.
    async fn stop_video(&mut self) -> Result<usize, BackendError> {
        Err(BackendError::NotSupported("stop_video".into()))
    }
}

/// Snapshot the page into a [`Document`].
pub async fn take_snapshot<B: Backend + ?Sized>(backend: &mut B) -> Result<Document, BackendError> {
    match backend
        .execute(PageAction::Snapshot(SnapshotRequest::default()))
        .await?
    {
        ActionResponse::Ok { data } => match *data {
            ActionData::Snapshot(result) => Ok(Document::from_snapshot(result.snapshot)),
            ActionData::Action(_) => Err(BackendError::Other(
                "page script answered a snapshot request without a snapshot".into(),
            )),
        },
        ActionResponse::Error { message } => Err(BackendError::Script(message)),
    }
}

/// Run an action, turning a page-side error or an unsuccessful result into [`BackendError::Script`].
pub async fn perform<B: Backend + ?Sized>(
    backend: &mut B,
    action: PageAction,
) -> Result<ActionResult, BackendError> {
    let name = action.name();
    match backend.execute(action).await? {
        ActionResponse::Ok { data } => match *data {
            ActionData::Action(result) if result.success => Ok(result),
            ActionData::Action(result) => Err(BackendError::Script(format!(
                "{} failed: {}",
                name,
                result.message.unwrap_or_else(|| "no details".into())
            ))),
            ActionData::Snapshot(_) => Ok(ActionResult {
                success: true,
                message: None,
            }),
        },
        ActionResponse::Error { message } => Err(BackendError::Script(format!("{}: {}", name, message))),
    }
}
