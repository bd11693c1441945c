//! Telemetry spans and PII sanitization for the accuracy pipeline.
//!
//! Emits the literal `accuracy.*` event surface over `tracing`. The emitter
//! functions are thin wrappers; callers are expected to time the wrapped
//! work themselves and pass the elapsed duration in.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{event, Level};

const PROMPT_PREVIEW_LEN: usize = 100;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid regex")
});

static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\d[\s().-]*){7,}\d").expect("valid regex")
});

/// Truncate `s` to `PROMPT_PREVIEW_LEN` characters, appending `...` when
/// truncated, then redact e-mail and phone-like digit sequences.
pub fn sanitize(s: &str) -> String {
    redact(&truncate_preview(s))
}

fn truncate_preview(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= PROMPT_PREVIEW_LEN {
        s.to_string()
    } else {
        let mut out: String = chars[..PROMPT_PREVIEW_LEN].iter().collect();
        out.push_str("...");
        out
    }
}

fn redact(s: &str) -> String {
    let with_emails = EMAIL_PATTERN.replace_all(s, "[EMAIL]");
    PHONE_PATTERN.replace_all(&with_emails, "[PHONE]").into_owned()
}

/// `accuracy.pipeline.start` — metadata `{query(preview), preset?}`.
pub fn pipeline_start(query: &str, preset: Option<&str>) {
    event!(
        Level::INFO,
        event = "accuracy.pipeline.start",
        query = %sanitize(query),
        preset = preset.unwrap_or("none"),
    );
}

/// `accuracy.pipeline.stop`.
#[allow(clippy::too_many_arguments)]
pub fn pipeline_stop(
    duration: Duration,
    query: &str,
    answer: &str,
    confidence: Option<f64>,
    total_tokens: Option<u64>,
    num_candidates: Option<usize>,
    verification_score: Option<f64>,
) {
    event!(
        Level::INFO,
        event = "accuracy.pipeline.stop",
        duration_ms = duration.as_millis() as u64,
        query = %sanitize(query),
        answer = %sanitize(answer),
        confidence = confidence,
        total_tokens = total_tokens,
        num_candidates = num_candidates,
        verification_score = verification_score,
    );
}

/// `accuracy.pipeline.exception`.
pub fn pipeline_exception(duration: Duration, kind: &str, reason: &str) {
    event!(
        Level::ERROR,
        event = "accuracy.pipeline.exception",
        duration_ms = duration.as_millis() as u64,
        kind = kind,
        reason = reason,
    );
}

/// `accuracy.stage.start`.
pub fn stage_start(stage_name: &str) {
    event!(Level::DEBUG, event = "accuracy.stage.start", stage_name = stage_name);
}

/// `accuracy.stage.stop`.
pub fn stage_stop(stage_name: &str, duration: Duration) {
    event!(
        Level::DEBUG,
        event = "accuracy.stage.stop",
        stage_name = stage_name,
        duration_ms = duration.as_millis() as u64,
    );
}

/// `accuracy.stage.exception`.
pub fn stage_exception(stage_name: &str, duration: Duration, reason: &str) {
    event!(
        Level::WARN,
        event = "accuracy.stage.exception",
        stage_name = stage_name,
        duration_ms = duration.as_millis() as u64,
        reason = reason,
    );
}

/// `accuracy.calibration.route`.
pub fn calibration_route(duration: Duration, action: &str, confidence_level: &str, score: f64) {
    event!(
        Level::INFO,
        event = "accuracy.calibration.route",
        duration_ms = duration.as_millis() as u64,
        action = action,
        confidence_level = confidence_level,
        score = score,
    );
}

/// `accuracy.self_consistency.start`.
pub fn self_consistency_start() {
    event!(Level::DEBUG, event = "accuracy.self_consistency.start");
}

/// `accuracy.self_consistency.stop`.
pub fn self_consistency_stop(duration: Duration, actual_n: u32, consensus: f64, early_stopped: bool) {
    event!(
        Level::DEBUG,
        event = "accuracy.self_consistency.stop",
        duration_ms = duration.as_millis() as u64,
        actual_n = actual_n,
        consensus = consensus,
        early_stopped = early_stopped,
    );
}

/// `accuracy.self_consistency.exception`.
pub fn self_consistency_exception(duration: Duration, reason: &str) {
    event!(
        Level::WARN,
        event = "accuracy.self_consistency.exception",
        duration_ms = duration.as_millis() as u64,
        reason = reason,
    );
}

/// `verification.start`.
pub fn verification_start(candidate_id: &str) {
    event!(Level::DEBUG, event = "verification.start", candidate_id = candidate_id);
}

/// `verification.stop`.
pub fn verification_stop(candidate_id: &str, duration: Duration) {
    event!(
        Level::DEBUG,
        event = "verification.stop",
        candidate_id = candidate_id,
        duration_ms = duration.as_millis() as u64,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_prompts_with_ellipsis() {
        let long = "a".repeat(150);
        let out = sanitize(&long);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), PROMPT_PREVIEW_LEN + 3);
    }

    #[test]
    fn short_prompts_pass_through_unchanged() {
        assert_eq!(sanitize("hello world"), "hello world");
    }

    #[test]
    fn redacts_email_addresses() {
        let out = sanitize("contact me at jane.doe@example.com please");
        assert!(out.contains("[EMAIL]"));
        assert!(!out.contains("jane.doe@example.com"));
    }

    #[test]
    fn redacts_phone_like_digit_runs() {
        let out = sanitize("call 555-123-4567 now");
        assert!(out.contains("[PHONE]"));
        assert!(!out.contains("555-123-4567"));
    }

    #[test]
    fn does_not_redact_short_digit_runs() {
        let out = sanitize("there are 42 items");
        assert_eq!(out, "there are 42 items");
    }
}
