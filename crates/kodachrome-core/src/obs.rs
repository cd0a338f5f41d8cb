//! Structured observability hooks for the upload and eval lifecycle.
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`). For JSON
//! output start the bot with `--json`.

use tracing::info;

/// Span tagging everything an eval job logs with its nickname.
///
/// Attach it to the job future with [`tracing::Instrument`]; an entered
/// guard cannot be held across `.await` in a spawned task.
///
/// ```ignore
/// tokio::spawn(job.instrument(eval_span("jolly_turing")));
/// ```
pub fn eval_span(nickname: &str) -> tracing::Span {
    tracing::info_span!("eval", nickname = %nickname)
}

/// Emit event: policy stored under a nickname.
pub fn emit_policy_saved(nickname: &str, bytes: u64, filename: &str) {
    info!(event = "policy.saved", nickname = %nickname, bytes = bytes, filename = %filename);
}

/// Emit event: eval admitted and about to launch.
pub fn emit_eval_started(nickname: &str, robot: &str, eval_name: &str) {
    info!(event = "eval.started", nickname = %nickname, robot = %robot, eval_name = %eval_name);
}

/// Emit event: eval subprocess exited (or was killed).
pub fn emit_eval_finished(nickname: &str, exit_code: i32, duration_ms: u64, timed_out: bool) {
    if timed_out {
        tracing::warn!(
            event = "eval.timed_out",
            nickname = %nickname,
            duration_ms = duration_ms,
        );
    } else {
        info!(
            event = "eval.finished",
            nickname = %nickname,
            exit_code = exit_code,
            duration_ms = duration_ms,
        );
    }
}

/// Emit event: result link found.
pub fn emit_link_resolved(nickname: &str, url: &str, source: &str) {
    info!(event = "eval.link_resolved", nickname = %nickname, url = %url, source = %source);
}

/// Emit event: a job or handler failed unexpectedly (error level).
pub fn emit_fault(stage: &str, error: &dyn std::fmt::Display) {
    tracing::error!(event = "fault", stage = %stage, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_span_create() {
        let span = eval_span("jolly_turing");
        let _guard = span.enter();
        emit_eval_started("jolly_turing", "kbot-headless", "walk");
    }
}
