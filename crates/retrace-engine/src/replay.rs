//! Step-by-step replay of a validated trace against a [`Backend`].

use crate::artifacts::{ArtifactWriter, StepFailure};
use crate::backend::{perform, Backend};
use crate::status::StatusChannel;
use crate::wait::{self, WaitOptions};
use retrace_common::protocol::{
    ClickAtRequest, HighlightRequest, PageAction, PressKeyRequest, ScrollWindowRequest,
    TargetRequest, TextRequest,
};
use retrace_common::status::StatusEvent;
use retrace_common::trace::{
    ClickStep, KeyStep, NavigateStep, Offset, ScrollStep, Step, TypeStep,
    WaitVisibleStep,
};
use retrace_common::{ReplayError, Trace};
use retrace_core::config::ReplayConfig;
use retrace_common::snapshot::Rect;
use retrace_core::resolver::Target;
use retrace_core::validator;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Pause between scrolling a target into view and acting on it.
pub const SCROLL_SETTLE: Duration = Duration::from_millis(20);
/// Clicking an element whose selectors mention this opens a menu the next step needs.
pub const MENU_TRIGGER: &str = "composer-plus-btn";
/// Used when a waitVisible step carries no timeout of its own.
pub const DEFAULT_WAIT_VISIBLE_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort on the first failing step.
    FailFast,
    /// Record the failure and move on to the next step.
    Isolate,
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub respect_timing: bool,
    /// Inversely scales the per-character typing delay.
    pub speed: f64,
    pub element_timeout: Duration,
    pub poll_interval: Duration,
    pub highlight: Option<Duration>,
    pub skip_initial_navigate: bool,
    pub failure_policy: FailurePolicy,
    pub typing_delay: Duration,
    pub menu_wait: Duration,
}

impl ReplayOptions {
    /// Replay inside an already loaded page: no initial navigation, stop at the first failure.
    pub fn in_page() -> Self {
        let defaults = ReplayConfig::default();
        Self {
            respect_timing: false,
            speed: 1.0,
            element_timeout: Duration::from_millis(defaults.element_timeout_ms),
            poll_interval: Duration::from_millis(defaults.poll_interval_ms),
            highlight: Some(Duration::from_millis(defaults.highlight_ms)),
            skip_initial_navigate: true,
            failure_policy: FailurePolicy::FailFast,
            typing_delay: Duration::ZERO,
            menu_wait: Duration::from_millis(defaults.menu_wait_ms),
        }
    }

    /// Standalone driver: real navigation, per-step isolation, paced typing.
    pub fn driver() -> Self {
        let defaults = ReplayConfig::default();
        Self {
            highlight: None,
            skip_initial_navigate: false,
            failure_policy: FailurePolicy::Isolate,
            typing_delay: Duration::from_millis(defaults.typing_delay_ms),
            ..Self::in_page()
        }
    }

    /// Take waits and delays from a loaded config, keeping the profile's shape.
    pub fn with_config(mut self, config: &ReplayConfig) -> Self {
        self.element_timeout = Duration::from_millis(config.element_timeout_ms);
        self.poll_interval = Duration::from_millis(config.poll_interval_ms);
        self.menu_wait = Duration::from_millis(config.menu_wait_ms);
        if self.highlight.is_some() {
            self.highlight = Some(Duration::from_millis(config.highlight_ms));
        }
        if !self.typing_delay.is_zero() {
            self.typing_delay = Duration::from_millis(config.typing_delay_ms);
        }
        self
    }

    fn wait_options(&self) -> WaitOptions {
        WaitOptions::new(self.element_timeout, self.poll_interval)
    }

    fn char_delay(&self) -> Duration {
        if self.typing_delay.is_zero() || self.speed <= 0.0 {
            return self.typing_delay;
        }
        self.typing_delay.div_f64(self.speed)
    }
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self::in_page()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    pub steps_run: usize,
    pub failures: Vec<StepFailure>,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Milliseconds to wait before a step when recorded timing is respected.
pub fn timing_delay(previous_ts: f64, ts: f64) -> Duration {
    let delta = ((ts - previous_ts) * 1000.0).floor();
    if delta.is_finite() && delta > 0.0 {
        Duration::from_millis(delta as u64)
    } else {
        Duration::ZERO
    }
}

/// Keep a recorded click offset inside the target's box.
pub fn clamp_offset(offset: Offset, rect: &Rect) -> (i64, i64) {
    let clamp = |value: i64, extent: f64| value.min(extent.floor() as i64 - 1).max(0);
    (clamp(offset.x, rect.width), clamp(offset.y, rect.height))
}

pub struct Replayer<'a, B: Backend + ?Sized> {
    backend: &'a mut B,
    options: ReplayOptions,
    status: Option<StatusChannel>,
    artifacts: Option<ArtifactWriter>,
}

impl<'a, B: Backend + ?Sized> Replayer<'a, B> {
    pub fn new(backend: &'a mut B, options: ReplayOptions) -> Self {
        Self {
            backend,
            options,
            status: None,
            artifacts: None,
        }
    }

    pub fn with_status(mut self, status: StatusChannel) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_artifacts(mut self, artifacts: ArtifactWriter) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn options(&self) -> &ReplayOptions {
        &self.options
    }

    fn emit(&self, event: StatusEvent) {
        if let Some(status) = &self.status {
            status.emit(event);
        }
    }

    /// Parse, validate and replay a trace document.
    pub async fn run_json(&mut self, json: &str) -> Result<ReplayReport, ReplayError> {
        match validator::parse_trace(json) {
            Ok(trace) => self.run(&trace).await,
            Err(e) => {
                error!("Trace validation failed: {}", e);
                self.emit(StatusEvent::Error {
                    index: None,
                    message: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    pub async fn run(&mut self, trace: &Trace) -> Result<ReplayReport, ReplayError> {
        if let Err(e) = validator::validate(trace) {
            error!("Trace validation failed: {}", e);
            self.emit(StatusEvent::Error {
                index: None,
                message: e.to_string(),
            });
            return Err(e.into());
        }

        info!(steps = trace.steps.len(), "Starting replay");
        self.emit(StatusEvent::Started);

        let mut report = ReplayReport::default();
        let mut previous_ts = trace.steps.first().map(Step::ts).unwrap_or_default();
        let total = trace.steps.len();

        for (index, step) in trace.steps.iter().enumerate() {
            info!("Step {}/{}: {}", index + 1, total, step.kind());

            if self.options.respect_timing {
                let delay = timing_delay(previous_ts, step.ts());
                if !delay.is_zero() {
                    debug!(delay_ms = delay.as_millis() as u64, "waiting for recorded timing");
                    sleep(delay).await;
                }
                previous_ts = step.ts();
            }

            self.emit(StatusEvent::Step {
                index,
                step_type: step.kind().to_string(),
            });
            report.steps_run += 1;

            let Err(e) = self.execute(index, step).await else {
                continue;
            };
            error!("Step {} ({}) failed: {}", index + 1, step.kind(), e);

            match self.options.failure_policy {
                FailurePolicy::FailFast => {
                    self.emit(StatusEvent::Error {
                        index: Some(index),
                        message: e.to_string(),
                    });
                    return Err(ReplayError::StepFailed {
                        index,
                        step_type: step.kind(),
                        source: Box::new(e),
                    });
                }
                FailurePolicy::Isolate => {
                    let failure = StepFailure {
                        index,
                        step_type: step.kind(),
                        selector: step.selector().map(str::to_string),
                        message: e.to_string(),
                    };
                    self.record_failure(&failure).await;
                    report.failures.push(failure);
                }
            }
        }

        info!(
            steps = report.steps_run,
            failures = report.failures.len(),
            "Replay finished"
        );
        self.emit(StatusEvent::Done);
        Ok(report)
    }

    async fn record_failure(&mut self, failure: &StepFailure) {
        let Some(artifacts) = self.artifacts.clone() else {
            return;
        };
        let screenshot = match self.backend.screenshot().await {
            Ok(png) => Some(png),
            Err(e) => {
                warn!("Could not capture failure screenshot: {}", e);
                None
            }
        };
        if let Err(e) = artifacts.record(failure, screenshot.as_deref()).await {
            warn!("Could not write failure artifacts: {}", e);
        }
    }

    async fn execute(&mut self, index: usize, step: &Step) -> Result<(), ReplayError> {
        match step {
            Step::Navigate(nav) => self.navigate(index, nav).await,
            Step::Click(click) => self.click(step, click).await,
            Step::Type(typing) => self.type_text(step, typing).await,
            Step::Key(key) => self.press_key(step, key).await,
            Step::Scroll(scroll) => self.scroll(scroll).await,
            Step::WaitVisible(wait) => {
                self.wait_visible(wait).await;
                Ok(())
            }
        }
    }

    async fn navigate(&mut self, index: usize, nav: &NavigateStep) -> Result<(), ReplayError> {
        if index == 0 && self.options.skip_initial_navigate {
            info!("Skipping initial navigation");
            return Ok(());
        }
        info!(url = %nav.url, "Navigating");
        self.backend
            .navigate(&nav.url)
            .await
            .map_err(|e| ReplayError::Navigation(format!("{}: {}", nav.url, e)))?;
        Ok(())
    }

    /// Resolve, scroll into view and optionally highlight the step's target.
    async fn prepare(&mut self, step: &Step) -> Result<(u64, Rect, bool), ReplayError> {
        let target = Target::from_step(step).unwrap_or_default();
        let (doc, resolution) =
            wait::resolve_element(&mut *self.backend, &target, self.options.wait_options()).await?;
        let key = resolution.key.0;
        let (rect, contenteditable) = doc
            .node(resolution.node)
            .map(|n| (n.rect, n.editable && n.tag != "input" && n.tag != "textarea"))
            .unwrap_or_default();

        perform(&mut *self.backend, PageAction::ScrollIntoView(TargetRequest { key })).await?;
        sleep(SCROLL_SETTLE).await;

        if let Some(duration) = self.options.highlight {
            perform(
                &mut *self.backend,
                PageAction::Highlight(HighlightRequest {
                    key,
                    duration_ms: duration.as_millis() as u64,
                }),
            )
            .await?;
            sleep(duration).await;
        }
        Ok((key, rect, contenteditable))
    }

    async fn click(&mut self, step: &Step, click: &ClickStep) -> Result<(), ReplayError> {
        let (key, rect, _) = self.prepare(step).await?;

        let action = match click.offset {
            Some(offset) => {
                let (x, y) = clamp_offset(offset, &rect);
                PageAction::ClickAt(ClickAtRequest { key, x, y })
            }
            None => PageAction::Activate(TargetRequest { key }),
        };
        perform(&mut *self.backend, action).await?;

        let opens_menu = std::iter::once(&click.selector)
            .chain(click.fallbacks.iter())
            .any(|s| s.contains(MENU_TRIGGER));
        if opens_menu {
            let options = WaitOptions::new(self.options.menu_wait, self.options.poll_interval);
            if !wait::wait_for_menu(&mut *self.backend, options).await? {
                warn!("Menu did not open after clicking {}", click.selector);
            }
        }
        Ok(())
    }

    async fn type_text(&mut self, step: &Step, typing: &TypeStep) -> Result<(), ReplayError> {
        let (key, _, contenteditable) = self.prepare(step).await?;
        perform(&mut *self.backend, PageAction::Focus(TargetRequest { key })).await?;

        if contenteditable {
            let delay = self.options.char_delay();
            for ch in typing.text.chars() {
                perform(
                    &mut *self.backend,
                    PageAction::InsertText(TextRequest {
                        key,
                        text: ch.to_string(),
                    }),
                )
                .await?;
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
        } else {
            perform(
                &mut *self.backend,
                PageAction::AppendValue(TextRequest {
                    key,
                    text: typing.text.clone(),
                }),
            )
            .await?;
        }
        Ok(())
    }

    async fn press_key(&mut self, step: &Step, key_step: &KeyStep) -> Result<(), ReplayError> {
        let (key, _, _) = self.prepare(step).await?;
        perform(&mut *self.backend, PageAction::Focus(TargetRequest { key })).await?;
        perform(
            &mut *self.backend,
            PageAction::PressKey(PressKeyRequest {
                key,
                key_name: key_step.key.clone(),
            }),
        )
        .await?;
        Ok(())
    }

    async fn scroll(&mut self, scroll: &ScrollStep) -> Result<(), ReplayError> {
        perform(
            &mut *self.backend,
            PageAction::ScrollWindow(ScrollWindowRequest {
                x: scroll.x,
                y: scroll.y,
            }),
        )
        .await?;
        Ok(())
    }

    /// Never fails the step: timeouts and bad selectors are logged.
    async fn wait_visible(&mut self, wait: &WaitVisibleStep) {
        let timeout_ms = if wait.timeout == 0 {
            DEFAULT_WAIT_VISIBLE_MS
        } else {
            wait.timeout
        };
        let options = WaitOptions::new(Duration::from_millis(timeout_ms), self.options.poll_interval);
        match wait::wait_visible(&mut *self.backend, &wait.selector, options).await {
            Ok(true) => debug!(selector = %wait.selector, "Element became visible"),
            Ok(false) => warn!("waitVisible timeout for: {}", wait.selector),
            Err(ReplayError::InvalidSelector(e)) => {
                warn!("Invalid selector in waitVisible: {}", e)
            }
            Err(e) => warn!("waitVisible for {} failed: {}", wait.selector, e),
        }
    }
}
