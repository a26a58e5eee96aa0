use chromiumoxide::Page;
use retrace_scanner::PAGE_SCRIPT;
use std::error::Error;
use std::time::Duration;

/// Upper bound on one script evaluation; an open dialog would otherwise block forever.
const EVAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Retries while the page is between execution contexts (mid-navigation).
const MAX_CONTEXT_RETRIES: u32 = 10;

const CONTEXT_RETRY_DELAY: Duration = Duration::from_millis(100);

fn is_context_error(err: &str) -> bool {
    err.contains("Cannot find context")
        || err.contains("Execution context was destroyed")
        || err.contains("-32000")
}

enum EvalError {
    Timeout,
    Context(String),
    Other(String),
}

async fn evaluate_with_timeout(
    page: &Page,
    expression: &str,
) -> Result<serde_json::Value, EvalError> {
    match tokio::time::timeout(EVAL_TIMEOUT, page.evaluate(expression)).await {
        Err(_) => Err(EvalError::Timeout),
        Ok(Err(e)) => {
            let err_str = e.to_string();
            if is_context_error(&err_str) {
                Err(EvalError::Context(err_str))
            } else {
                Err(EvalError::Other(err_str))
            }
        }
        Ok(Ok(remote_object)) => remote_object
            .into_value::<serde_json::Value>()
            .map_err(|e| EvalError::Other(format!("Failed to get result: {}", e))),
    }
}

/// Evaluate `expression` with the page script installed, retrying across context swaps.
pub async fn evaluate(
    page: &Page,
    expression: &str,
) -> Result<serde_json::Value, Box<dyn Error + Send + Sync>> {
    let guarded = format!(
        "(() => {{ if (typeof window.__retrace === 'undefined') {{ {} }} return {}; }})()",
        PAGE_SCRIPT, expression
    );

    let mut last_error = None;
    for attempt in 0..MAX_CONTEXT_RETRIES {
        match evaluate_with_timeout(page, &guarded).await {
            Ok(value) => return Ok(value),
            Err(EvalError::Timeout) => {
                return Err(
                    "Page script timed out - possibly blocked by a dialog (alert/confirm/prompt)"
                        .into(),
                );
            }
            Err(EvalError::Context(err_str)) => {
                tracing::debug!(
                    "Context error (attempt {}/{}), retrying...",
                    attempt + 1,
                    MAX_CONTEXT_RETRIES
                );
                last_error = Some(err_str);
                tokio::time::sleep(CONTEXT_RETRY_DELAY).await;
            }
            Err(EvalError::Other(err_str)) => {
                return Err(format!("Evaluation failed: {}", err_str).into());
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| "Page script failed after retries".to_string())
        .into())
}

/// Run one page action through `window.__retrace.process`.
pub async fn process(
    page: &Page,
    request: &serde_json::Value,
) -> Result<serde_json::Value, Box<dyn Error + Send + Sync>> {
    let expression = format!("window.__retrace.process({})", serde_json::to_string(request)?);
    evaluate(page, &expression).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_errors_are_recognised() {
        assert!(is_context_error("Cannot find context with specified id"));
        assert!(is_context_error("Execution context was destroyed."));
        assert!(!is_context_error("ReferenceError: foo is not defined"));
    }
}
