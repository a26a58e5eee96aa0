//! Recording state machine.
//!
//! [`CaptureEngine`] consumes page events, each paired with the snapshot taken
//! when it fired, and turns them into steps. Debounced work (typing flushes,
//! scroll settling) is kept as explicit deadlines on the engine's [`Clock`];
//! the host calls [`CaptureEngine::fire_due_timers`] when
//! [`CaptureEngine::next_deadline`] passes.

use crate::assembler;
use crate::config::CaptureConfig;
use crate::dom::{Document, ElementKey, NodeId};
use crate::fingerprint::SelectorBuilder;
use crate::selector::{attr_selector, SelectorList};
use retrace_common::CaptureError;
use retrace_common::snapshot::ScrollPosition;
use retrace_common::trace::{
    ClickStep, KeyStep, NavigateStep, Offset, ScrollStep, ScrollTarget, Step, Trace, TraceMeta,
    TypeStep, WaitVisibleStep,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const RECORDER_UI: &str = "[data-recorder-ui]";
pub const POPUP_CONTEXTS: &str =
    r#"[role="menu"],[role="listbox"],[role="dialog"],[data-radix-portal],[data-portal]"#;
pub const MENU_ITEMS: &str = r#"[role^="menuitem"],[role="option"],button,[role="button"]"#;
pub const MENU_CONTAINERS: &str = r#"[role="menu"],[role="listbox"]"#;
pub const ACTIONABLE: &str =
    r#"textarea,input,button,[role="button"],a[href],select,[data-testid],[aria-label]"#;
pub const PLACEHOLDERS: &str = "[data-placeholder]";
pub const FORM_CONTAINERS: &str = r#"form,[role="form"],[data-testid]"#;
pub const TEXT_ENTRY: &str = "textarea,input,[contenteditable]";
pub const PRIVATE_CONTAINERS: &str = "[data-private],[data-sensitive]";

const PRIVATE_AUTOCOMPLETE: &[&str] = &[
    "current-password",
    "new-password",
    "cc-number",
    "cc-csc",
    "cc-exp",
    "cc-exp-month",
    "cc-exp-year",
];

/// Monotonic time since an arbitrary origin.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// The instant this clock reads as zero.
    pub fn origin(&self) -> Instant {
        self.origin
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock; clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    pub fn set(&self, to: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.lock().map(|now| *now).unwrap_or_default()
    }
}

/// Interactions reported by the page. Coordinates are viewport-relative.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    PointerDown {
        target: ElementKey,
        client_x: f64,
        client_y: f64,
    },
    Click {
        target: ElementKey,
        client_x: f64,
        client_y: f64,
    },
    Input {
        target: ElementKey,
        /// Text the input event reported as inserted, if any.
        data: Option<String>,
    },
    Blur {
        target: ElementKey,
    },
    KeyDown {
        target: ElementKey,
        key: String,
    },
    Scroll {
        x: i64,
        y: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

#[derive(Debug)]
struct TypingBuffer {
    selector: String,
    text: String,
    deadline: Duration,
}

#[derive(Debug, Clone, Copy)]
struct PendingScroll {
    x: i64,
    y: i64,
    deadline: Duration,
}

pub struct CaptureEngine {
    config: CaptureConfig,
    clock: Box<dyn Clock>,
    builder: SelectorBuilder,
    state: RecorderState,
    started_at: Duration,
    meta: TraceMeta,
    steps: Vec<Step>,
    buffers: HashMap<ElementKey, TypingBuffer>,
    last_values: HashMap<ElementKey, String>,
    pending_scroll: Option<PendingScroll>,
    last_scroll: ScrollPosition,
    skip_click_until: Option<Duration>,
    last_ts: f64,
    document: String,
}

impl CaptureEngine {
    pub fn new(config: CaptureConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock::new()))
    }

    pub fn with_clock(config: CaptureConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            builder: SelectorBuilder::new(),
            state: RecorderState::Idle,
            started_at: Duration::ZERO,
            meta: TraceMeta::default(),
            steps: Vec::new(),
            buffers: HashMap::new(),
            last_values: HashMap::new(),
            pending_scroll: None,
            last_scroll: ScrollPosition::default(),
            skip_click_until: None,
            last_ts: 0.0,
            document: String::new(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Raw steps captured so far, before assembly.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Begin a session on the page `doc` shows. Returns `false` if one is already running.
    pub fn start(&mut self, doc: &Document) -> bool {
        if self.is_recording() {
            return false;
        }
        self.state = RecorderState::Recording;
        self.started_at = self.clock.now();
        self.meta = TraceMeta {
            user_agent: doc.user_agent.clone(),
            viewport: doc.viewport,
        };
        self.steps = vec![Step::Navigate(NavigateStep {
            url: doc.url.clone(),
            ts: 0.0,
        })];
        self.last_ts = 0.0;
        self.last_scroll = doc.scroll;
        self.pending_scroll = None;
        self.skip_click_until = None;
        self.buffers.clear();
        self.last_values.clear();
        self.builder.clear();
        self.document = doc.identity().to_string();
        info!(url = %doc.url, "recording started");
        true
    }

    /// Flush every typing buffer and cancel all timers. Returns whether a session was active.
    pub fn stop(&mut self) -> bool {
        if !self.is_recording() {
            return false;
        }
        self.flush_all(self.clock.now());
        self.last_values.clear();
        self.pending_scroll = None;
        self.skip_click_until = None;
        self.state = RecorderState::Idle;
        info!(steps = self.steps.len(), "recording stopped");
        true
    }

    /// The assembled trace of the current (or last) session.
    pub fn trace(&self) -> Trace {
        assembler::assemble(self.meta.clone(), &self.steps, self.config.merge_gap_secs)
    }

    /// Earliest pending timer, on this engine's clock.
    pub fn next_deadline(&self) -> Option<Duration> {
        if !self.is_recording() {
            return None;
        }
        let typing = self.buffers.values().map(|b| b.deadline);
        let scroll = self.pending_scroll.map(|s| s.deadline);
        typing.chain(scroll).min()
    }

    /// Run every timer whose deadline has passed, in deadline order. Returns how many fired.
    pub fn fire_due_timers(&mut self) -> usize {
        if !self.is_recording() {
            return 0;
        }
        let now = self.clock.now();
        let mut fired = 0;
        loop {
            let typing = self
                .buffers
                .iter()
                .map(|(key, b)| (b.deadline, Some(*key)))
                .min();
            let scroll = self.pending_scroll.map(|s| (s.deadline, None));
            let next = match (typing, scroll) {
                (Some(t), Some(s)) => Some(if s.0 < t.0 { s } else { t }),
                (t, s) => t.or(s),
            };
            match next {
                Some((deadline, Some(key))) if deadline <= now => {
                    self.flush(key, deadline);
                }
                Some((deadline, None)) if deadline <= now => {
                    self.settle_scroll(deadline);
                }
                _ => break,
            }
            fired += 1;
        }
        fired
    }

    /// Feed one page event. Failures are logged, never returned to the page.
    pub fn handle(&mut self, doc: &Document, event: PageEvent) {
        if !self.is_recording() {
            return;
        }
        self.fire_due_timers();
        self.track_document(doc);
        if let Err(e) = self.dispatch(doc, event) {
            warn!(error = %e, "capture handler failed");
        }
    }

    /// Element keys are only meaningful within one loaded document; a new one
    /// invalidates everything cached by key.
    fn track_document(&mut self, doc: &Document) {
        if doc.identity() == self.document {
            return;
        }
        debug!(from = %self.document, to = %doc.identity(), "document changed");
        self.flush_all(self.clock.now());
        self.last_values.clear();
        self.builder.clear();
        self.document = doc.identity().to_string();
    }

    fn dispatch(&mut self, doc: &Document, event: PageEvent) -> Result<(), CaptureError> {
        let now = self.clock.now();
        match event {
            PageEvent::PointerDown {
                target,
                client_x,
                client_y,
            } => {
                self.record_click(doc, target, client_x, client_y)?;
                self.skip_click_until = Some(now + self.config.click_dedupe());
            }
            PageEvent::Click {
                target,
                client_x,
                client_y,
            } => {
                if self.skip_click_until.is_some_and(|until| now <= until) {
                    debug!("click follows pointerdown; skipped");
                    return Ok(());
                }
                self.record_click(doc, target, client_x, client_y)?;
            }
            PageEvent::Input { target, data } => self.record_input(doc, target, data, now)?,
            PageEvent::Blur { target } => {
                let id = locate(doc, target)?;
                if is_editable(doc, id) {
                    self.flush(target, now);
                }
            }
            PageEvent::KeyDown { target, key } => {
                if key != "Enter" {
                    return Ok(());
                }
                let id = locate(doc, target)?;
                if in_recorder_ui(doc, id)? || !is_editable(doc, id) {
                    return Ok(());
                }
                self.flush(target, now);
                let selector = self.builder.selector(doc, id);
                self.push(Step::Key(KeyStep {
                    selector,
                    key,
                    ts: self.ts_at(now),
                }));
            }
            PageEvent::Scroll { x, y } => {
                self.pending_scroll = Some(PendingScroll {
                    x,
                    y,
                    deadline: now + self.config.scroll_debounce(),
                });
            }
        }
        Ok(())
    }

    fn record_click(
        &mut self,
        doc: &Document,
        key: ElementKey,
        client_x: f64,
        client_y: f64,
    ) -> Result<(), CaptureError> {
        let id = locate(doc, key)?;
        if in_recorder_ui(doc, id)? {
            return Ok(());
        }
        let ts = self.ts_at(self.clock.now());

        let (target, context) = if doc.closest(id, &parse(POPUP_CONTEXTS)?).is_some() {
            menu_click_context(doc, id)?
        } else {
            page_click_context(doc, id)?
        };

        let fingerprint = self.builder.build(doc, target);
        let mut fallbacks: Vec<String> = Vec::new();
        for candidate in context.fallbacks.into_iter().chain(fingerprint.fallbacks) {
            if candidate != fingerprint.primary && !fallbacks.contains(&candidate) {
                fallbacks.push(candidate);
            }
        }

        let rect = doc.node(target).map(|n| n.rect).unwrap_or_default();
        let offset = Offset {
            x: (client_x - rect.x).round() as i64,
            y: (client_y - rect.y).round() as i64,
        };

        let assertion = context
            .name
            .as_deref()
            .filter(|_| {
                context
                    .role
                    .as_deref()
                    .is_some_and(|r| r.starts_with("menuitem") || r == "option")
            })
            .map(|label| {
                format!(
                    r#"[role^="menuitem"]{}[aria-checked="true"]"#,
                    attr_selector("aria-label", label)
                )
            });

        self.push(Step::Click(ClickStep {
            selector: fingerprint.primary,
            fallbacks,
            role: context.role,
            name: context.name,
            offset: Some(offset),
            ts,
        }));

        if let Some(selector) = assertion {
            self.push(Step::WaitVisible(WaitVisibleStep {
                selector,
                timeout: self.config.menu_assert_timeout_ms,
                ts,
            }));
        }
        Ok(())
    }

    fn record_input(
        &mut self,
        doc: &Document,
        key: ElementKey,
        data: Option<String>,
        now: Duration,
    ) -> Result<(), CaptureError> {
        let id = locate(doc, key)?;
        if in_recorder_ui(doc, id)? || !is_editable(doc, id) {
            return Ok(());
        }
        if is_private(doc, id)? {
            debug!(key = %key, "input on private field ignored");
            return Ok(());
        }

        let current = doc.current_value(id);
        let last = self.last_values.get(&key).map(String::as_str).unwrap_or("");
        let delta = match data {
            Some(data) => data,
            None => match current.strip_prefix(last) {
                Some(suffix) => suffix.to_string(),
                None => current.clone(),
            },
        };
        self.last_values.insert(key, current);

        let deadline = now + self.config.typing_flush();
        if !self.buffers.contains_key(&key) {
            let selector = self.builder.selector(doc, id);
            self.buffers.insert(
                key,
                TypingBuffer {
                    selector,
                    text: String::new(),
                    deadline,
                },
            );
        }
        if let Some(buffer) = self.buffers.get_mut(&key) {
            buffer.text.push_str(&delta);
            buffer.deadline = deadline;
        }
        Ok(())
    }

    /// Flush every typing buffer in deadline order.
    fn flush_all(&mut self, at: Duration) {
        let mut keys: Vec<(Duration, ElementKey)> =
            self.buffers.iter().map(|(k, b)| (b.deadline, *k)).collect();
        keys.sort();
        for (_, key) in keys {
            self.flush(key, at);
        }
    }

    /// Emit the element's buffered text, if any, and drop the buffer.
    fn flush(&mut self, key: ElementKey, at: Duration) {
        let Some(buffer) = self.buffers.remove(&key) else {
            return;
        };
        if buffer.text.is_empty() {
            return;
        }
        self.push(Step::Type(TypeStep {
            selector: buffer.selector,
            text: buffer.text,
            ts: self.ts_at(at),
        }));
    }

    fn settle_scroll(&mut self, at: Duration) {
        let Some(pending) = self.pending_scroll.take() else {
            return;
        };
        if pending.x == self.last_scroll.x && pending.y == self.last_scroll.y {
            return;
        }
        self.last_scroll = ScrollPosition {
            x: pending.x,
            y: pending.y,
        };
        self.push(Step::Scroll(ScrollStep {
            target: ScrollTarget::Window,
            x: pending.x,
            y: pending.y,
            ts: self.ts_at(at),
        }));
    }

    fn ts_at(&self, at: Duration) -> f64 {
        at.saturating_sub(self.started_at).as_secs_f64()
    }

    /// Timestamps never go backwards within a session.
    fn push(&mut self, mut step: Step) {
        let ts = step.ts().max(self.last_ts);
        step.set_ts(ts);
        self.last_ts = ts;
        debug!(step = %step.kind(), ts, "captured step");
        self.steps.push(step);
    }
}

#[derive(Debug, Default)]
struct ClickContext {
    role: Option<String>,
    name: Option<String>,
    fallbacks: Vec<String>,
}

fn parse(selectors: &str) -> Result<SelectorList, CaptureError> {
    Ok(SelectorList::parse(selectors)?)
}

fn locate(doc: &Document, key: ElementKey) -> Result<NodeId, CaptureError> {
    doc.by_key(key).ok_or(CaptureError::UnknownTarget(key.0))
}

fn in_recorder_ui(doc: &Document, id: NodeId) -> Result<bool, CaptureError> {
    Ok(doc.closest(id, &parse(RECORDER_UI)?).is_some())
}

fn is_editable(doc: &Document, id: NodeId) -> bool {
    doc.node(id).is_some_and(|n| n.is_editable())
}

/// Password and payment fields, and anything marked private or hidden from assistive tech.
pub fn is_private(doc: &Document, id: NodeId) -> Result<bool, CaptureError> {
    let Some(node) = doc.node(id) else {
        return Ok(false);
    };
    if node.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("password")) {
        return Ok(true);
    }
    if node
        .attr("autocomplete")
        .is_some_and(|a| PRIVATE_AUTOCOMPLETE.contains(&a.trim()))
    {
        return Ok(true);
    }
    if node.attr("aria-hidden") == Some("true") {
        return Ok(true);
    }
    Ok(doc.closest(id, &parse(PRIVATE_CONTAINERS)?).is_some())
}

fn menu_click_context(doc: &Document, id: NodeId) -> Result<(NodeId, ClickContext), CaptureError> {
    let item = doc.closest(id, &parse(MENU_ITEMS)?).unwrap_or(id);
    let Some(node) = doc.node(item) else {
        return Ok((item, ClickContext::default()));
    };

    let role = match node.role() {
        Some(role) => Some(role.to_string()),
        None => doc
            .closest(item, &parse(MENU_CONTAINERS)?)
            .map(|_| "menuitem".to_string()),
    };
    let label = node
        .attr("aria-label")
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| doc.text_content(item));
    let name = Some(label.trim().to_string()).filter(|n| !n.is_empty());

    let mut fallbacks = Vec::new();
    if let Some(test_id) = node.attr("data-testid").filter(|t| !t.is_empty()) {
        fallbacks.push(attr_selector("data-testid", test_id));
    }
    if let (Some(role), Some(name)) = (&role, &name) {
        fallbacks.push(format!(
            "{}{}",
            attr_selector("role", role),
            attr_selector("aria-label", name)
        ));
    }

    Ok((
        item,
        ClickContext {
            role,
            name,
            fallbacks,
        },
    ))
}

fn page_click_context(doc: &Document, id: NodeId) -> Result<(NodeId, ClickContext), CaptureError> {
    let mut target = doc.closest(id, &parse(ACTIONABLE)?).unwrap_or(id);

    if doc.matches(target, &parse(PLACEHOLDERS)?)
        && let Some(container) = doc.closest(target, &parse(FORM_CONTAINERS)?)
        && let Some(input) = doc
            .select_within(container, &parse(TEXT_ENTRY)?)
            .into_iter()
            .next()
    {
        target = input;
    }

    let mut fallbacks = Vec::new();
    if let Some(node) = doc.node(target) {
        if let Some(test_id) = node.attr("data-testid").filter(|t| !t.is_empty()) {
            fallbacks.push(attr_selector("data-testid", test_id));
        }
        if let Some(label) = node.attr("aria-label").filter(|l| !l.is_empty()) {
            let role = node
                .role()
                .map(|r| attr_selector("role", r))
                .unwrap_or_default();
            fallbacks.push(format!(
                "{}{}{}",
                node.tag,
                role,
                attr_selector("aria-label", label)
            ));
        }
    }

    Ok((
        target,
        ClickContext {
            role: None,
            name: None,
            fallbacks,
        },
    ))
}
