//! Decoding of docker's line-delimited JSON log records.
//!
//! Stateless and infallible: a line that is not the expected shape still
//! becomes a record, carrying the raw text and the ingest time. Dropping
//! input is never an option here.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use logwell_model::StreamKind;

/// One decoded source line, before reassembly.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLine {
    pub timestamp: DateTime<Utc>,
    pub stream: StreamKind,
    /// Record text with its trailing newline stripped.
    pub text: String,
    /// The source line, verbatim.
    pub raw: String,
}

#[derive(Deserialize)]
struct RawRecord {
    log: String,
    #[serde(default)]
    stream: Option<String>,
    #[serde(default)]
    time: Option<String>,
}

/// Decode one line. `ingest_time` stands in for a missing or unparseable
/// source timestamp.
pub fn decode(line: &str, ingest_time: DateTime<Utc>) -> DecodedLine {
    match serde_json::from_str::<RawRecord>(line) {
        Ok(record) => {
            let timestamp = record
                .time
                .as_deref()
                .and_then(|time| DateTime::parse_from_rfc3339(time).ok())
                .map(|time| time.with_timezone(&Utc))
                .unwrap_or(ingest_time);
            let stream = record
                .stream
                .as_deref()
                .and_then(|stream| stream.parse().ok())
                .unwrap_or(StreamKind::Stdout);
            let text = record
                .log
                .strip_suffix('\n')
                .unwrap_or(&record.log)
                .to_string();

            DecodedLine {
                timestamp,
                stream,
                text,
                raw: line.to_string(),
            }
        }
        Err(_) => DecodedLine {
            timestamp: ingest_time,
            stream: StreamKind::Stdout,
            text: line.to_string(),
            raw: line.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2026-02-02T10:00:00Z".parse().unwrap()
    }

    #[test]
    fn decodes_the_docker_json_shape() {
        let line = r#"{"log":"hello\n","stream":"stderr","time":"2026-01-01T00:00:00Z"}"#;
        let decoded = decode(line, now());
        assert_eq!(decoded.text, "hello");
        assert_eq!(decoded.stream, StreamKind::Stderr);
        assert_eq!(decoded.timestamp, "2026-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
        assert_eq!(decoded.raw, line);
    }

    #[test]
    fn preserves_embedded_newlines_and_strips_only_the_trailing_one() {
        let line = r#"{"log":"a\nb\n","stream":"stdout","time":"2026-01-01T00:00:00Z"}"#;
        assert_eq!(decode(line, now()).text, "a\nb");
    }

    #[test]
    fn malformed_line_becomes_an_opaque_stdout_record() {
        let decoded = decode("not json at all", now());
        assert_eq!(decoded.text, "not json at all");
        assert_eq!(decoded.raw, "not json at all");
        assert_eq!(decoded.stream, StreamKind::Stdout);
        assert_eq!(decoded.timestamp, now());
    }

    #[test]
    fn bad_time_falls_back_to_ingest_time() {
        let line = r#"{"log":"x\n","stream":"stdout","time":"yesterday-ish"}"#;
        assert_eq!(decode(line, now()).timestamp, now());
    }

    #[test]
    fn unknown_stream_falls_back_to_stdout() {
        let line = r#"{"log":"x\n","stream":"stdmiddle","time":"2026-01-01T00:00:00Z"}"#;
        assert_eq!(decode(line, now()).stream, StreamKind::Stdout);
    }

    #[test]
    fn source_timestamp_is_preserved_even_when_skewed() {
        let line = r#"{"log":"x\n","stream":"stdout","time":"1999-12-31T23:59:59Z"}"#;
        let decoded = decode(line, now());
        assert_eq!(
            decoded.timestamp,
            "1999-12-31T23:59:59Z".parse::<DateTime<Utc>>().unwrap()
        );
    }
}
