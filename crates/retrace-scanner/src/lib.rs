/// The page script injected into every page the recorder or replayer drives.
///
/// It installs `window.__retrace`, whose `process(request)` evaluates one page
/// action and returns the JSON response.
pub const PAGE_SCRIPT: &str = include_str!("page.js");

/// Binding the page script calls with captured events while recording.
pub const EMIT_BINDING: &str = "__retraceEmit";

/// Prefix of the page script's own console diagnostics.
pub const CONSOLE_PREFIX: &str = "[retrace]";
