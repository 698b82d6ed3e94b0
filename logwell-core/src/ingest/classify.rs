//! Heuristic severity classification.
//!
//! Pure function of `(stream, message)`; rules run in priority order and
//! the first hit wins. `WARN` is accepted as an alias of `WARNING` in every
//! lexical rule.

use once_cell::sync::Lazy;
use regex::Regex;

use logwell_model::{LogLevel, StreamKind};

const LEVEL_ALTERNATES: &str = "debug|info|warning|warn|error|critical";

static JSON_LEVEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?i)"(?:level|severity)"\s*:\s*"({LEVEL_ALTERNATES})""#
    ))
    .expect("json level pattern")
});

static BRACKET_LEVEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\[({LEVEL_ALTERNATES})\]")).expect("bracket level pattern")
});

static KEY_VALUE_LEVEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\blevel=({LEVEL_ALTERNATES})\b")).expect("key-value level pattern")
});

static PREFIX_LEVEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)^({LEVEL_ALTERNATES}):")).expect("prefix level pattern")
});

/// Classify a reassembled message.
pub fn classify(stream: StreamKind, message: &str) -> LogLevel {
    for pattern in [&JSON_LEVEL, &BRACKET_LEVEL, &KEY_VALUE_LEVEL, &PREFIX_LEVEL] {
        if let Some(captures) = pattern.captures(message) {
            if let Ok(level) = captures[1].parse::<LogLevel>() {
                return level;
            }
        }
    }

    match stream {
        StreamKind::Stderr => LogLevel::Error,
        StreamKind::Stdout => LogLevel::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_field_wins_over_everything() {
        assert_eq!(
            classify(StreamKind::Stdout, r#"{"level":"error","msg":"[INFO] nope"}"#),
            LogLevel::Error
        );
        assert_eq!(
            classify(StreamKind::Stdout, r#"{"severity":"CRITICAL"}"#),
            LogLevel::Critical
        );
    }

    #[test]
    fn bracket_form_matches_anywhere() {
        assert_eq!(
            classify(StreamKind::Stdout, "2026-01-01 [WARNING] low disk"),
            LogLevel::Warning
        );
        assert_eq!(classify(StreamKind::Stdout, "[debug] noisy"), LogLevel::Debug);
    }

    #[test]
    fn key_value_form_is_case_insensitive() {
        assert_eq!(
            classify(StreamKind::Stdout, "ts=12 level=ERROR msg=bad"),
            LogLevel::Error
        );
        assert_eq!(
            classify(StreamKind::Stdout, "level=warn msg=careful"),
            LogLevel::Warning
        );
    }

    #[test]
    fn prefix_form_only_matches_at_the_start() {
        assert_eq!(classify(StreamKind::Stdout, "ERROR: it broke"), LogLevel::Error);
        assert_eq!(
            classify(StreamKind::Stdout, "the word ERROR: appears late"),
            LogLevel::Info
        );
    }

    #[test]
    fn warn_canonicalizes_to_warning() {
        assert_eq!(classify(StreamKind::Stdout, "[WARN] heads up"), LogLevel::Warning);
        assert_eq!(classify(StreamKind::Stdout, "warn: heads up"), LogLevel::Warning);
        assert_eq!(
            classify(StreamKind::Stdout, r#"{"level":"warn"}"#),
            LogLevel::Warning
        );
    }

    #[test]
    fn stream_fallback_applies_when_nothing_matches() {
        assert_eq!(classify(StreamKind::Stdout, "hello"), LogLevel::Info);
        assert_eq!(classify(StreamKind::Stderr, "hello"), LogLevel::Error);
    }

    #[test]
    fn classification_is_deterministic() {
        let message = "mixed [INFO] level=error";
        let first = classify(StreamKind::Stdout, message);
        for _ in 0..10 {
            assert_eq!(classify(StreamKind::Stdout, message), first);
        }
    }
}
