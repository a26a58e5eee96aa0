use crate::cdp::CdpClient;
use crate::inject;
use crate::video::VideoRecorder;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::page::ScreenshotParams;
use retrace_common::protocol::{ActionResponse, PageAction};
use retrace_common::trace::Viewport;
use retrace_engine::backend::{Backend, BackendError, NavigationResult};
use std::path::Path;
use tracing::info;

pub struct HeadlessBackend {
    client: Option<CdpClient>,
    visible: bool,
    video: Option<VideoRecorder>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::new_with_visibility(false)
    }

    pub fn new_with_visibility(visible: bool) -> Self {
        Self {
            client: None,
            visible,
            video: None,
        }
    }

    pub fn get_client(&self) -> Option<&CdpClient> {
        self.client.as_ref()
    }

    fn page(&self) -> Result<&chromiumoxide::Page, BackendError> {
        match &self.client {
            None => Err(BackendError::NotReady),
            Some(client) if !client.is_connected() => Err(BackendError::ConnectionLost),
            Some(client) => Ok(&client.page),
        }
    }

    async fn navigation_result(
        page: &chromiumoxide::Page,
    ) -> Result<NavigationResult, BackendError> {
        let title = page
            .get_title()
            .await
            .unwrap_or_default()
            .unwrap_or_default();
        let url = page
            .url()
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?
            .unwrap_or_default();
        Ok(NavigationResult { url, title })
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for HeadlessBackend {
    async fn launch(&mut self) -> Result<(), BackendError> {
        info!("Launching headless backend (Chromium)...");
        let client = CdpClient::launch(self.visible)
            .await
            .map_err(|e| BackendError::Other(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        if self.video.is_some() {
            self.stop_video().await?;
        }
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| BackendError::Other(e.to_string()))?;
        }
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.client.as_ref().is_some_and(CdpClient::is_connected)
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError> {
        let page = self.page()?;
        info!("Navigating to: {}", url);
        page.goto(url)
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?;
        Self::navigation_result(page).await
    }

    async fn execute(&mut self, action: PageAction) -> Result<ActionResponse, BackendError> {
        let page = self.page()?;
        let request = serde_json::to_value(&action)?;
        let value = inject::process(page, &request)
            .await
            .map_err(|e| BackendError::Script(e.to_string()))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BackendError> {
        let page = self.page()?;
        page.screenshot(ScreenshotParams::builder().build())
            .await
            .map_err(|e| BackendError::Other(format!("Screenshot failed: {}", e)))
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> Result<(), BackendError> {
        let page = self.page()?;
        let params = SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            false,
        );
        page.execute(params)
            .await
            .map_err(|e| BackendError::Other(format!("Failed to set viewport: {}", e)))?;
        Ok(())
    }

    async fn start_video(&mut self, dir: &Path) -> Result<(), BackendError> {
        if self.video.is_some() {
            return Ok(());
        }
        let recorder = VideoRecorder::start(self.page()?, dir).await?;
        self.video = Some(recorder);
        Ok(())
    }

    async fn stop_video(&mut self) -> Result<usize, BackendError> {
        let Some(recorder) = self.video.take() else {
            return Ok(0);
        };
        recorder.stop(self.page()?).await
    }
}
