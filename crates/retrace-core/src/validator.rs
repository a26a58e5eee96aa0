//! Structural gate in front of every replay.
//!
//! Checks run in a fixed order and the first failure wins. Indices in step
//! errors are 1-based.

use retrace_common::ValidationError;
use retrace_common::trace::{StepKind, Trace, TRACE_VERSION};
use serde_json::Value;
use tracing::warn;

/// Validate raw trace JSON.
pub fn validate_value(value: &Value) -> Result<(), ValidationError> {
    let Some(object) = value.as_object() else {
        return Err(ValidationError::NotAnObject);
    };

    let version = object.get("version").unwrap_or(&Value::Null);
    // Numeric comparison, so `1.0` is accepted alongside `1`.
    if version.as_f64() != Some(f64::from(TRACE_VERSION)) {
        return Err(ValidationError::UnsupportedVersion {
            found: version.to_string(),
            expected: TRACE_VERSION,
        });
    }

    let Some(steps) = object.get("steps").and_then(Value::as_array) else {
        return Err(ValidationError::StepsNotArray);
    };
    if steps.is_empty() {
        return Err(ValidationError::NoSteps);
    }

    for (i, step) in steps.iter().enumerate() {
        let tag = step.get("type").and_then(Value::as_str);
        if tag.and_then(StepKind::from_tag).is_none() {
            return Err(ValidationError::UnknownStepType {
                index: i + 1,
                found: tag.map(str::to_string).unwrap_or_else(|| {
                    step.get("type").unwrap_or(&Value::Null).to_string()
                }),
            });
        }
        match step.get("ts").and_then(Value::as_f64) {
            Some(ts) if ts >= 0.0 => {}
            _ => return Err(ValidationError::InvalidTimestamp { index: i + 1 }),
        }
    }

    if !steps
        .iter()
        .any(|s| s.get("type").and_then(Value::as_str) == Some("navigate"))
    {
        warn!("trace has no navigate step; replay starts on whatever page is loaded");
    }
    Ok(())
}

/// Parse trace JSON text, validate it, then decode the typed trace.
pub fn parse_trace(json: &str) -> Result<Trace, ValidationError> {
    let mut value: Value =
        serde_json::from_str(json).map_err(|e| ValidationError::Json(e.to_string()))?;
    validate_value(&value)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("version".into(), Value::from(TRACE_VERSION));
    }
    let trace: Trace =
        serde_json::from_value(value).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    warn_if_out_of_order(&trace);
    Ok(trace)
}

/// Re-check an already typed trace.
pub fn validate(trace: &Trace) -> Result<(), ValidationError> {
    if trace.version != TRACE_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            found: trace.version.to_string(),
            expected: TRACE_VERSION,
        });
    }
    if trace.steps.is_empty() {
        return Err(ValidationError::NoSteps);
    }
    for (i, step) in trace.steps.iter().enumerate() {
        let ts = step.ts();
        if !ts.is_finite() || ts < 0.0 {
            return Err(ValidationError::InvalidTimestamp { index: i + 1 });
        }
    }
    if !trace.has_navigate() {
        warn!("trace has no navigate step; replay starts on whatever page is loaded");
    }
    warn_if_out_of_order(trace);
    Ok(())
}

fn warn_if_out_of_order(trace: &Trace) {
    if let Some(i) = trace
        .steps
        .windows(2)
        .position(|pair| pair[1].ts() < pair[0].ts())
    {
        warn!(step = i + 2, "step timestamps go backwards");
    }
}
