use crate::status::StatusEvent;
use crate::trace::{Step, Trace};

/// Longest text fragment echoed in step summaries.
const MAX_TEXT_PREVIEW: usize = 40;

pub fn format_status(event: &StatusEvent) -> String {
    match event {
        StatusEvent::Started => "replay started".to_string(),
        StatusEvent::Step { index, step_type } => format!("step {} ({})", index + 1, step_type),
        StatusEvent::Done => "replay done".to_string(),
        StatusEvent::Error {
            index: Some(index),
            message,
        } => format!("step {} failed: {}", index + 1, message),
        StatusEvent::Error {
            index: None,
            message,
        } => format!("replay failed: {}", message),
    }
}

/// One-line, human-readable rendering of a step.
pub fn format_step(step: &Step) -> String {
    match step {
        Step::Navigate(s) => format!("navigate {}", s.url),
        Step::Click(s) => {
            let mut out = format!("click {}", s.selector);
            if let Some(name) = &s.name {
                out.push_str(&format!(" \"{}\"", name));
            }
            if let Some(offset) = s.offset {
                out.push_str(&format!(" @({},{})", offset.x, offset.y));
            }
            out
        }
        Step::Type(s) => format!("type {} {:?}", s.selector, preview(&s.text)),
        Step::Key(s) => format!("key {} {}", s.selector, s.key),
        Step::Scroll(s) => format!("scroll window ({}, {})", s.x, s.y),
        Step::WaitVisible(s) => format!("waitVisible {} {}ms", s.selector, s.timeout),
    }
}

pub fn format_trace(trace: &Trace) -> String {
    let mut output = format!(
        "trace v{} ({}x{}, {} steps)\n",
        trace.version,
        trace.meta.viewport.width,
        trace.meta.viewport.height,
        trace.steps.len()
    );
    for (i, step) in trace.steps.iter().enumerate() {
        output.push_str(&format!("[{}] {:>8.3}s {}\n", i + 1, step.ts(), format_step(step)));
    }
    output
}

fn preview(text: &str) -> String {
    if text.chars().count() <= MAX_TEXT_PREVIEW {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX_TEXT_PREVIEW).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{ClickStep, Offset, TypeStep};

    #[test]
    fn click_summary_includes_name_and_offset() {
        let step = Step::Click(ClickStep {
            selector: "#submit".into(),
            fallbacks: vec![],
            role: Some("button".into()),
            name: Some("Send".into()),
            offset: Some(Offset { x: 3, y: 4 }),
            ts: 1.0,
        });
        assert_eq!(format_step(&step), "click #submit \"Send\" @(3,4)");
    }

    #[test]
    fn long_text_is_truncated() {
        let step = Step::Type(TypeStep {
            selector: "#box".into(),
            text: "x".repeat(100),
            ts: 0.0,
        });
        let line = format_step(&step);
        assert!(line.contains('…'));
        assert!(line.len() < 100);
    }

    #[test]
    fn error_without_index() {
        let line = format_status(&StatusEvent::Error {
            index: None,
            message: "bad".into(),
        });
        assert_eq!(line, "replay failed: bad");
    }
}
