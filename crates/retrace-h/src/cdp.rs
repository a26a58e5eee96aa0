//! Chromium over CDP: launch, page-level listeners, and the hooks the recorder installs.

use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, EventJavascriptDialogOpening,
    HandleJavaScriptDialogParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    AddBindingParams, ConsoleApiCalledType, EventBindingCalled, EventConsoleApiCalled,
};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use retrace_scanner::CONSOLE_PREFIX;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub type CdpResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Browser profile directory. Scratch profiles are removed on close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Profile {
    Pinned(PathBuf),
    Scratch(PathBuf),
}

impl Profile {
    /// `RETRACE_USER_DATA_DIR` pins the profile; otherwise a fresh one goes under the temp dir.
    pub fn from_env() -> CdpResult<Self> {
        if let Ok(dir) = std::env::var("RETRACE_USER_DATA_DIR") {
            return Ok(Profile::Pinned(PathBuf::from(dir)));
        }
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| format!("System clock error: {}", e))?
            .as_nanos();
        Ok(Profile::Scratch(std::env::temp_dir().join(format!(
            "retrace-profile-{}-{}",
            std::process::id(),
            nanos
        ))))
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            Profile::Pinned(path) | Profile::Scratch(path) => path,
        }
    }

    fn remove(&self) {
        if let Profile::Scratch(path) = self
            && let Err(e) = std::fs::remove_dir_all(path)
        {
            debug!("Failed to remove scratch profile {}: {}", path.display(), e);
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub visible: bool,
    /// `CHROME_BIN`, when set.
    pub chrome_bin: Option<String>,
    pub profile: Profile,
}

impl LaunchOptions {
    pub fn from_env(visible: bool) -> CdpResult<Self> {
        Ok(Self {
            visible,
            chrome_bin: std::env::var("CHROME_BIN").ok(),
            profile: Profile::from_env()?,
        })
    }

    fn browser_config(&self) -> CdpResult<BrowserConfig> {
        std::fs::create_dir_all(self.profile.path())?;
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(self.profile.path());
        if self.visible {
            builder = builder.with_head();
        }
        if let Some(bin) = &self.chrome_bin {
            builder = builder.chrome_executable(bin);
        }
        Ok(builder
            .build()
            .map_err(|e| format!("Failed to build browser config: {}", e))?)
    }
}

pub struct CdpClient {
    pub browser: Browser,
    pub page: Page,
    handler_task: JoinHandle<()>,
    profile: Profile,
}

impl CdpClient {
    pub async fn launch(visible: bool) -> CdpResult<Self> {
        Self::launch_with(LaunchOptions::from_env(visible)?).await
    }

    pub async fn launch_with(options: LaunchOptions) -> CdpResult<Self> {
        info!(
            visible = options.visible,
            profile = %options.profile.path().display(),
            "Launching Chromium"
        );
        let (browser, mut handler) = Browser::launch(options.browser_config()?)
            .await
            .map_err(|e| format!("Failed to launch browser: {}", e))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
            info!("CDP connection closed");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| format!("Failed to create page: {}", e))?;
        forward_console(&page).await?;
        accept_dialogs(&page).await?;

        Ok(Self {
            browser,
            page,
            handler_task,
            profile: options.profile,
        })
    }

    /// False once the browser connection has gone away.
    pub fn is_connected(&self) -> bool {
        !self.handler_task.is_finished()
    }

    pub async fn close(mut self) -> CdpResult<()> {
        self.browser
            .close()
            .await
            .map_err(|e| format!("Error closing browser: {}", e))?;
        self.handler_task
            .await
            .map_err(|e| format!("Error awaiting handler: {}", e))?;
        self.profile.remove();
        Ok(())
    }
}

/// Expose `window.<name>` to every document of `page` and stream its calls.
pub async fn expose_binding(page: &Page, name: &str) -> CdpResult<EventStream<EventBindingCalled>> {
    page.execute(AddBindingParams::new(name))
        .await
        .map_err(|e| format!("Failed to add binding {}: {}", name, e))?;
    Ok(page
        .event_listener::<EventBindingCalled>()
        .await
        .map_err(|e| format!("Failed to subscribe to binding calls: {}", e))?)
}

/// Run `source` in every document `page` loads from now on, before its own scripts.
pub async fn add_init_script(page: &Page, source: String) -> CdpResult<()> {
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(source))
        .await
        .map_err(|e| format!("Failed to register init script: {}", e))?;
    Ok(())
}

/// Page-script diagnostics (prefixed) surface as warnings; the page's own console stays at debug.
async fn forward_console(page: &Page) -> CdpResult<()> {
    let mut events = page
        .event_listener::<EventConsoleApiCalled>()
        .await
        .map_err(|e| format!("Failed to subscribe to console events: {}", e))?;
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let line = console_line(&event);
            if line.starts_with(CONSOLE_PREFIX) {
                warn!(target: "retrace::page", "{}", line);
            } else if event.r#type == ConsoleApiCalledType::Error {
                debug!(target: "retrace::console", "error: {}", line);
            } else {
                debug!(target: "retrace::console", "{}", line);
            }
        }
    });
    Ok(())
}

fn console_line(event: &EventConsoleApiCalled) -> String {
    event
        .args
        .iter()
        .map(|arg| {
            arg.value
                .as_ref()
                .and_then(|v| v.as_str().map(str::to_string))
                .or_else(|| arg.description.clone())
                .or_else(|| arg.value.as_ref().map(|v| v.to_string()))
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A replayed click can open `alert`/`confirm`; an open dialog blocks every later evaluation.
async fn accept_dialogs(page: &Page) -> CdpResult<()> {
    let mut events = page
        .event_listener::<EventJavascriptDialogOpening>()
        .await
        .map_err(|e| format!("Failed to subscribe to dialog events: {}", e))?;
    let page = page.clone();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            info!("Accepting {:?} dialog: {}", event.r#type, event.message);
            if let Err(e) = page.execute(HandleJavaScriptDialogParams::new(true)).await {
                warn!("Failed to accept dialog: {}", e);
            }
        }
    });
    Ok(())
}
