//! Deadline-bounded polling over fresh snapshots.

use crate::backend::{take_snapshot, Backend};
use retrace_common::{BackendError, ReplayError};
use retrace_core::resolver::{self, Resolution, Target};
use retrace_core::selector::SelectorList;
use retrace_core::Document;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitOptions {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }
}

/// Sleep one poll interval, or return `false` once the deadline has passed.
async fn tick(deadline: Instant, poll_interval: Duration) -> bool {
    let now = Instant::now();
    if now >= deadline {
        return false;
    }
    sleep(poll_interval.min(deadline - now)).await;
    true
}

/// A fresh snapshot, or `None` when this poll hit a transient page-script failure.
async fn poll_snapshot<B: Backend + ?Sized>(
    backend: &mut B,
) -> Result<Option<Document>, BackendError> {
    match take_snapshot(backend).await {
        Ok(doc) => Ok(Some(doc)),
        Err(e) if e.is_transient() => {
            debug!("snapshot failed, retrying: {}", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Retry every resolution strategy until a visible element turns up or the timeout elapses.
pub async fn resolve_element<B: Backend + ?Sized>(
    backend: &mut B,
    target: &Target,
    options: WaitOptions,
) -> Result<(Document, Resolution), ReplayError> {
    let deadline = Instant::now() + options.timeout;
    debug!(attempts = ?target.describe_attempts(), "resolving element");
    loop {
        if let Some(doc) = poll_snapshot(backend).await?
            && let Some(resolution) = resolver::resolve_once(&doc, target)
        {
            return Ok((doc, resolution));
        }
        if !tick(deadline, options.poll_interval).await {
            return Err(ReplayError::ElementNotFound {
                attempted: target.describe_attempts(),
                timeout_ms: options.timeout.as_millis() as u64,
            });
        }
    }
}

/// Poll until the first element matching `selector` is visible. `Ok(false)` on timeout.
pub async fn wait_visible<B: Backend + ?Sized>(
    backend: &mut B,
    selector: &str,
    options: WaitOptions,
) -> Result<bool, ReplayError> {
    let list = SelectorList::parse(selector)?;
    let deadline = Instant::now() + options.timeout;
    loop {
        if let Some(doc) = poll_snapshot(backend).await?
            && let Some(first) = doc.ids().find(|id| doc.matches(*id, &list))
            && doc.is_visible(first)
        {
            return Ok(true);
        }
        if !tick(deadline, options.poll_interval).await {
            return Ok(false);
        }
    }
}

/// Poll until some menu or listbox is open. `Ok(false)` on timeout.
pub async fn wait_for_menu<B: Backend + ?Sized>(
    backend: &mut B,
    options: WaitOptions,
) -> Result<bool, ReplayError> {
    let deadline = Instant::now() + options.timeout;
    loop {
        if let Some(doc) = poll_snapshot(backend).await?
            && !resolver::visible_scopes(&doc).is_empty()
        {
            return Ok(true);
        }
        if !tick(deadline, options.poll_interval).await {
            return Ok(false);
        }
    }
}
