//! RFID reader line protocol.
//!
//! Newline-delimited text. The reader announces itself with
//! [`READY_MARKER`]; every other line is `<DIRECTION>,<TAG>` where DIRECTION
//! is `INGRESS` or `EGRESS` (any case). Anything else is dropped.

use crate::audit::TagEvent;

pub const READY_MARKER: &str = "RFID_LOGGER_READY";

/// Longest line kept while waiting for a newline; longer input is discarded.
pub const MAX_LINE_BYTES: usize = 1024;

/// A decoded tag read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagRead {
    pub event: TagEvent,
    /// Uppercase.
    pub tag_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Line {
    Ready,
    Tag(TagRead),
}

/// Parses a `DIRECTION,TAG` record. Returns `None` for an unknown direction,
/// a missing comma, or an empty tag.
pub fn parse_line(line: &str) -> Option<TagRead> {
    let (direction, tag) = line.split_once(',')?;
    let event = direction.parse::<TagEvent>().ok()?;
    let tag = tag.trim();
    if tag.is_empty() {
        return None;
    }
    Some(TagRead {
        event,
        tag_id: tag.to_uppercase(),
    })
}

/// Classifies a decoded, trimmed line.
pub fn classify(line: &str) -> Option<Line> {
    if line == READY_MARKER {
        return Some(Line::Ready);
    }
    parse_line(line).map(Line::Tag)
}

/// Decodes raw bytes as UTF-8, dropping invalid sequences, and trims
/// surrounding whitespace (including `\r`).
pub fn decode_line(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    for chunk in raw.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out.trim().to_string()
}

/// Reassembles newline-terminated lines from arbitrarily split reads.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    overflowed: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete line without its terminator. Oversized lines are
    /// discarded up to their newline.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let Some(pos) = self.pending.iter().position(|b| *b == b'\n') else {
                if self.pending.len() > MAX_LINE_BYTES {
                    log::debug!(
                        "serial line exceeded {} bytes without newline, discarding",
                        MAX_LINE_BYTES
                    );
                    self.pending.clear();
                    self.overflowed = true;
                }
                return None;
            };
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if std::mem::take(&mut self.overflowed) {
                // Tail of a line whose head was already discarded.
                continue;
            }
            if line.len() > MAX_LINE_BYTES {
                log::debug!(
                    "serial line of {} bytes exceeds {}, discarding",
                    line.len(),
                    MAX_LINE_BYTES
                );
                continue;
            }
            return Some(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_record() {
        assert_eq!(
            parse_line("INGRESS,AB12"),
            Some(TagRead {
                event: TagEvent::Ingress,
                tag_id: "AB12".to_string()
            })
        );
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(parse_line("ingress, ab12"), parse_line("INGRESS,AB12"));
        assert_eq!(
            parse_line(" Egress ,x9").map(|r| r.event),
            Some(TagEvent::Egress)
        );
    }

    #[test]
    fn rejects_malformed_records() {
        for line in ["FOO,AB12", "INGRESS,", "INGRESS,   ", "INGRESS AB12", "", ",AB12"] {
            assert_eq!(parse_line(line), None, "{:?} must be rejected", line);
        }
    }

    #[test]
    fn only_the_first_comma_splits() {
        assert_eq!(
            parse_line("EGRESS,ab,12").map(|r| r.tag_id),
            Some("AB,12".to_string())
        );
    }

    #[test]
    fn ready_marker_is_distinct() {
        assert_eq!(classify(READY_MARKER), Some(Line::Ready));
        assert_eq!(classify("rfid_logger_ready"), None);
    }

    #[test]
    fn invalid_utf8_is_dropped_not_fatal() {
        assert_eq!(decode_line(b"INGR\xffESS,AB\xc3\x2812\r"), "INGRESS,AB(12");
    }

    #[test]
    fn line_buffer_joins_split_reads() {
        let mut buf = LineBuffer::new();
        buf.extend(b"INGRE");
        assert_eq!(buf.next_line(), None);
        buf.extend(b"SS,A1\nEGRESS,B2\nEGR");
        assert_eq!(buf.next_line(), Some(b"INGRESS,A1".to_vec()));
        assert_eq!(buf.next_line(), Some(b"EGRESS,B2".to_vec()));
        assert_eq!(buf.next_line(), None);
        buf.extend(b"ESS,C3\n");
        assert_eq!(buf.next_line(), Some(b"EGRESS,C3".to_vec()));
    }

    #[test]
    fn line_buffer_discards_oversized_lines() {
        let mut buf = LineBuffer::new();
        buf.extend(&vec![b'x'; MAX_LINE_BYTES + 1]);
        assert_eq!(buf.next_line(), None);
        buf.extend(b"tail\nINGRESS,A1\n");
        assert_eq!(buf.next_line(), Some(b"INGRESS,A1".to_vec()));
    }

    #[test]
    fn line_buffer_discards_oversized_line_completed_in_one_read() {
        let mut buf = LineBuffer::new();
        buf.extend(&[b'x'; 1000]);
        assert_eq!(buf.next_line(), None);
        let mut tail = vec![b'x'; 200];
        tail.extend_from_slice(b"\nEGRESS,B2\n");
        buf.extend(&tail);
        assert_eq!(buf.next_line(), Some(b"EGRESS,B2".to_vec()));
        assert_eq!(buf.next_line(), None);
    }

    #[test]
    fn line_at_the_limit_is_kept() {
        let mut buf = LineBuffer::new();
        let mut line = vec![b'y'; MAX_LINE_BYTES];
        line.push(b'\n');
        buf.extend(&line);
        assert_eq!(buf.next_line().map(|l| l.len()), Some(MAX_LINE_BYTES));
    }
}
