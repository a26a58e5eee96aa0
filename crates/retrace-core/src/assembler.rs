//! Normalization of the raw captured step stream into a [`Trace`].

use regex::Regex;
use retrace_common::trace::{Step, Trace, TraceMeta};
use std::sync::LazyLock;

static RECORDER_UI_SELECTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[data-recorder-ui\]|#rec-stop").unwrap());

/// Filter, merge and round the raw steps into a versioned trace.
pub fn assemble(meta: TraceMeta, steps: &[Step], merge_gap_secs: f64) -> Trace {
    let steps = steps
        .iter()
        .filter(|step| !step.selector().is_some_and(is_recorder_ui_selector))
        .cloned()
        .collect();
    let mut steps = merge_consecutive_types(steps, merge_gap_secs);
    round_timestamps(&mut steps);
    Trace::new(meta, steps)
}

/// Selectors that point at the recorder's own badge or stop button.
pub fn is_recorder_ui_selector(selector: &str) -> bool {
    RECORDER_UI_SELECTOR.is_match(selector)
}

/// Concatenate consecutive `type` steps on the same selector.
///
/// The gap is measured from the step that opened the group, so running the
/// pass again over its own output changes nothing.
pub fn merge_consecutive_types(steps: Vec<Step>, max_gap_secs: f64) -> Vec<Step> {
    let mut merged: Vec<Step> = Vec::with_capacity(steps.len());
    for step in steps {
        if let (Some(Step::Type(kept)), Step::Type(next)) = (merged.last_mut(), &step)
            && kept.selector == next.selector
            && next.ts - kept.ts <= max_gap_secs
        {
            kept.text.push_str(&next.text);
            continue;
        }
        merged.push(step);
    }
    merged
}

/// Millisecond precision.
pub fn round_timestamps(steps: &mut [Step]) {
    for step in steps {
        step.set_ts((step.ts() * 1000.0).round() / 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_selectors_are_detected() {
        assert!(is_recorder_ui_selector("#rec-stop"));
        assert!(is_recorder_ui_selector("div[data-recorder-ui] > button"));
        assert!(!is_recorder_ui_selector("#record-stop"));
    }
}
