//! Per-container reassembly of multi-line logical entries.
//!
//! A container writes one physical record per line, but stack traces span
//! many lines. This state machine folds continuation lines into the entry
//! they belong to, keyed off the shape of each line's first characters.
//!
//! The machine is `Clone` on purpose: the scheduler feeds a scratch copy
//! and only adopts the advanced state once the covering store transaction
//! commits, so an aborted commit replays cleanly.

use chrono::{DateTime, Utc};

use logwell_model::StreamKind;

use crate::ingest::decode::DecodedLine;

const TRACEBACK_HEADER: &str = "Traceback (most recent call last):";

/// A logical entry still being accumulated (or just completed).
#[derive(Debug, Clone, PartialEq)]
pub struct Partial {
    /// Opening line's timestamp; continuations never move it.
    pub timestamp: DateTime<Utc>,
    pub stream: StreamKind,
    pub message: String,
    /// Opening line, verbatim.
    pub raw: String,
}

impl Partial {
    fn from_line(line: DecodedLine) -> Self {
        Self {
            timestamp: line.timestamp,
            stream: line.stream,
            message: line.text,
            raw: line.raw,
        }
    }

    fn absorb(&mut self, line: &DecodedLine) {
        self.message.push('\n');
        self.message.push_str(&line.text);
    }
}

/// Two-state reassembler for one container.
#[derive(Debug, Clone, Default)]
pub struct Reassembler {
    holding: Option<Partial>,
    prev_continuation: bool,
}

impl Reassembler {
    /// Feed one decoded line. Returns a completed entry when this line
    /// closes out the previously held one.
    pub fn push(&mut self, line: DecodedLine) -> Option<Partial> {
        let continuation = is_continuation(&line.text, self.prev_continuation);
        self.prev_continuation = continuation;

        if continuation {
            match &mut self.holding {
                Some(partial) => {
                    partial.absorb(&line);
                    None
                }
                // Orphan continuation: nothing to attach to, start fresh.
                None => {
                    self.holding = Some(Partial::from_line(line));
                    None
                }
            }
        } else {
            let completed = self.holding.take();
            self.holding = Some(Partial::from_line(line));
            completed
        }
    }

    /// Flush whatever is held, if anything. Used for staleness and
    /// shutdown; the next line after a flush opens a fresh entry.
    pub fn flush(&mut self) -> Option<Partial> {
        self.prev_continuation = false;
        self.holding.take()
    }

    pub fn is_holding(&self) -> bool {
        self.holding.is_some()
    }
}

/// A line continues the previous entry when it looks like trace payload
/// rather than a fresh record.
fn is_continuation(text: &str, prev_continuation: bool) -> bool {
    let Some(first) = text.chars().next() else {
        // Blank lines attach to whatever is in flight.
        return prev_continuation;
    };
    if first == ' ' || first == '\t' {
        return true;
    }
    if text.starts_with(TRACEBACK_HEADER) {
        return true;
    }
    if text.starts_with("File \"") {
        return true;
    }
    // Exception/frame marker (`ValueError: ...`) counts only while a trace
    // is already in flight; outside one it is an ordinary message.
    if prev_continuation && is_exception_marker(text) {
        return true;
    }
    false
}

fn is_exception_marker(text: &str) -> bool {
    let Some(colon) = text.find(':') else {
        return false;
    };
    let head = &text[..colon];
    let mut chars = head.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> DecodedLine {
        DecodedLine {
            timestamp: "2026-01-01T00:00:00Z".parse().unwrap(),
            stream: StreamKind::Stdout,
            text: text.to_string(),
            raw: format!("{{\"log\":{text:?}}}"),
        }
    }

    fn feed(asm: &mut Reassembler, lines: &[&str]) -> Vec<String> {
        lines
            .iter()
            .filter_map(|text| asm.push(line(text)))
            .map(|partial| partial.message)
            .collect()
    }

    #[test]
    fn plain_lines_emit_one_entry_each() {
        let mut asm = Reassembler::default();
        let emitted = feed(&mut asm, &["first", "second", "third"]);
        assert_eq!(emitted, vec!["first", "second"]);
        assert_eq!(asm.flush().unwrap().message, "third");
    }

    #[test]
    fn traceback_folds_into_the_preceding_entry() {
        let mut asm = Reassembler::default();
        let emitted = feed(
            &mut asm,
            &[
                "boom",
                TRACEBACK_HEADER,
                "  File \"x.py\", line 1",
                "ValueError: bad",
                "next message",
            ],
        );
        assert_eq!(emitted.len(), 1);
        assert_eq!(
            emitted[0],
            format!("boom\n{TRACEBACK_HEADER}\n  File \"x.py\", line 1\nValueError: bad")
        );
        assert_eq!(asm.flush().unwrap().message, "next message");
    }

    #[test]
    fn exception_marker_alone_does_not_continue() {
        let mut asm = Reassembler::default();
        let emitted = feed(&mut asm, &["all good", "ValueError: bad", "after"]);
        // Without a trace in flight, `ValueError: bad` opens its own entry.
        assert_eq!(emitted, vec!["all good", "ValueError: bad"]);
    }

    #[test]
    fn orphan_continuation_starts_a_fresh_entry() {
        let mut asm = Reassembler::default();
        let emitted = feed(&mut asm, &["  indented orphan", "regular"]);
        assert_eq!(emitted, vec!["  indented orphan"]);
    }

    #[test]
    fn opening_metadata_wins_over_continuations() {
        let mut asm = Reassembler::default();
        let opener = DecodedLine {
            timestamp: "2026-01-01T00:00:00Z".parse().unwrap(),
            stream: StreamKind::Stderr,
            text: "boom".to_string(),
            raw: "raw-opener".to_string(),
        };
        let continuation = DecodedLine {
            timestamp: "2026-01-01T00:00:09Z".parse().unwrap(),
            stream: StreamKind::Stdout,
            text: "  detail".to_string(),
            raw: "raw-cont".to_string(),
        };
        asm.push(opener);
        asm.push(continuation);
        let partial = asm.flush().unwrap();
        assert_eq!(partial.stream, StreamKind::Stderr);
        assert_eq!(partial.raw, "raw-opener");
        assert_eq!(
            partial.timestamp,
            "2026-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn file_marker_continues_without_indentation() {
        let mut asm = Reassembler::default();
        let emitted = feed(&mut asm, &["panic", "File \"main.go\", line 10", "next"]);
        assert_eq!(emitted, vec!["panic\nFile \"main.go\", line 10"]);
    }

    #[test]
    fn split_feeding_matches_whole_feeding() {
        let lines = [
            "start",
            "boom",
            TRACEBACK_HEADER,
            "  File \"x.py\", line 1",
            "ValueError: bad",
            "tail",
        ];

        for split in 0..=lines.len() {
            let mut whole = Reassembler::default();
            let mut expected = feed(&mut whole, &lines);
            if let Some(partial) = whole.flush() {
                expected.push(partial.message);
            }

            let mut split_asm = Reassembler::default();
            let mut got = feed(&mut split_asm, &lines[..split]);
            got.extend(feed(&mut split_asm, &lines[split..]));
            if let Some(partial) = split_asm.flush() {
                got.push(partial.message);
            }

            assert_eq!(got, expected, "split at {split}");
        }
    }
}
