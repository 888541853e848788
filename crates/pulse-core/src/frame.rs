//! Frame classification for the multiplexed response body.
//!
//! The backend writes four framings onto a single text stream:
//! - bare text (assistant content)
//! - `__TOOL_EVENT__<json>__END_TOOL_EVENT__`
//! - `__REASONING_REPLACE__<text>__END_REASONING_REPLACE__`
//! - JSON envelopes (`{"type":"done",...}`, `{"error":...}`, ...)
//!
//! Transport deliveries carry no frame boundaries, so the decoder keeps an
//! explicit carry-over buffer: anything that might still grow into a marker
//! or an envelope is held back and re-scanned together with the next
//! delivery. Plain text is emitted as soon as it cannot be the start of a
//! framed unit; the consumer concatenates successive text frames.
//!
//! An envelope is a JSON object with a `type`, `error`, `choices` or
//! `thread_id` key that either starts a line or ends the stream. A line
//! starts at the beginning of the stream, after a newline, after another
//! frame, and behind a line-leading server-sent-event `data:` prefix. Other
//! JSON-looking text (citations like `[1]`, code samples, an error shape
//! quoted mid-sentence) is prose.
//!
//! Trailing whitespace of a text run travels with the next run, so the
//! concatenated text does not depend on where deliveries were split.
//! Whitespace that no text follows is padding and is never emitted: a body
//! ending in `"Hello "` and a `done` envelope yields the text `"Hello"`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

/// Opening delimiter of a tool event frame.
pub const TOOL_EVENT_START: &str = "__TOOL_EVENT__";
/// Closing delimiter of a tool event frame.
pub const TOOL_EVENT_END: &str = "__END_TOOL_EVENT__";
/// Opening delimiter of a reasoning replacement frame.
pub const REASONING_START: &str = "__REASONING_REPLACE__";
/// Closing delimiter of a reasoning replacement frame.
pub const REASONING_END: &str = "__END_REASONING_REPLACE__";

/// Default upper bound for the carry-over buffer (1 MiB).
pub const DEFAULT_MAX_CARRY_BYTES: usize = 1024 * 1024;

const SSE_DATA: &str = "data:";

/// Top-level keys that make a JSON object an envelope.
const ENVELOPE_KEYS: [&str; 4] = ["type", "error", "choices", "thread_id"];

/// An envelope whose first key is already known, used to tell a truncated
/// envelope from truncated prose at end of stream.
static ENVELOPE_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:data:[ \t]*)?\{\s*"(?:type|error|choices|thread_id)""#).unwrap()
});

/// Which delimiter pair bracketed a [`LogicalFrame::Marked`] payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    ToolEvent,
    ReasoningReplace,
}

impl MarkerKind {
    pub const ALL: [MarkerKind; 2] = [MarkerKind::ToolEvent, MarkerKind::ReasoningReplace];

    pub fn open(self) -> &'static str {
        match self {
            MarkerKind::ToolEvent => TOOL_EVENT_START,
            MarkerKind::ReasoningReplace => REASONING_START,
        }
    }

    pub fn close(self) -> &'static str {
        match self {
            MarkerKind::ToolEvent => TOOL_EVENT_END,
            MarkerKind::ReasoningReplace => REASONING_END,
        }
    }
}

/// One self-delimited unit extracted from the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalFrame {
    PlainText(String),
    Marked { kind: MarkerKind, payload: String },
    JsonEnvelope(Value),
}

/// Classify `buffer_tail + chunk` into complete frames.
///
/// Returns the frames in arrival order plus the unconsumed remainder, which
/// holds an unterminated marker, an envelope that is incomplete or may still
/// turn out to end the stream, a suffix that may still turn into an opening
/// delimiter, or whitespace waiting for the text it belongs to.
///
/// `buffer_tail` is taken to start a line. [`FrameDecoder`] also tracks
/// whether its carry-over starts a line, which makes it exact for every
/// split of the stream; prefer it for anything longer than one delivery.
pub fn classify(buffer_tail: &str, chunk: &str) -> (Vec<LogicalFrame>, String) {
    let mut buf = String::with_capacity(buffer_tail.len() + chunk.len());
    buf.push_str(buffer_tail);
    buf.push_str(chunk);
    let scan = Scanner::new(&buf, true, false).run();
    (scan.frames, scan.remainder)
}

/// Stateful classifier that owns the carry-over buffer for one response
/// stream.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    carry: String,
    /// Whether `carry` starts a line.
    line_start: bool,
    max_carry_bytes: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_carry(DEFAULT_MAX_CARRY_BYTES)
    }

    pub fn with_max_carry(max_carry_bytes: usize) -> Self {
        Self {
            carry: String::new(),
            line_start: true,
            max_carry_bytes,
        }
    }

    /// Feed one delivery and return every frame it completes.
    pub fn push(&mut self, chunk: &str) -> Vec<LogicalFrame> {
        let mut buf = std::mem::take(&mut self.carry);
        buf.push_str(chunk);
        let scan = Scanner::new(&buf, self.line_start, false).run();
        let mut frames = scan.frames;
        self.carry = scan.remainder;
        self.line_start = scan.line_start;

        if self.carry.len() > self.max_carry_bytes {
            warn!(
                carry_bytes = self.carry.len(),
                limit = self.max_carry_bytes,
                "Carry-over buffer exceeded its limit, flushing partial frame"
            );
            frames.extend(self.finish());
        }
        frames
    }

    /// Flush the carry-over buffer at end of stream.
    ///
    /// Held-back text is emitted as plain text and a held-back envelope that
    /// ends the stream is emitted as an envelope. An unterminated marker or a
    /// truncated envelope is a malformed frame and is dropped.
    pub fn finish(&mut self) -> Vec<LogicalFrame> {
        let carry = std::mem::take(&mut self.carry);
        let scan = Scanner::new(&carry, self.line_start, true).run();
        self.line_start = true;
        scan.frames
    }

    /// Bytes currently held back for the next delivery.
    pub fn carry(&self) -> &str {
        &self.carry
    }
}

/// Where the next framed unit may start, relative to the scan buffer.
#[derive(Debug, Clone, Copy)]
enum Candidate {
    Marker {
        at: usize,
        kind: MarkerKind,
    },
    /// A `{` at `brace`, with any line-leading `data:` prefix starting at `at`.
    Brace {
        at: usize,
        brace: usize,
        line_start: bool,
    },
}

impl Candidate {
    fn at(self) -> usize {
        match self {
            Candidate::Marker { at, .. } | Candidate::Brace { at, .. } => at,
        }
    }
}

struct Scan {
    frames: Vec<LogicalFrame>,
    remainder: String,
    /// Whether `remainder` starts a line.
    line_start: bool,
}

/// Single pass over one scan buffer. All positions are byte offsets into
/// `buf`; nothing is copied until a frame is emitted.
struct Scanner<'a> {
    buf: &'a str,
    /// Start of the pending plain-text run.
    text_start: usize,
    /// Where the search for the next framed unit resumes.
    search_from: usize,
    /// End of the last marker or envelope frame. `Some(0)` when the buffer
    /// itself starts a line.
    boundary: Option<usize>,
    /// No more input follows `buf`.
    at_end: bool,
    /// Whitespace-only text waiting for the next non-blank text run.
    whitespace: String,
    frames: Vec<LogicalFrame>,
}

impl<'a> Scanner<'a> {
    fn new(buf: &'a str, line_start: bool, at_end: bool) -> Self {
        Self {
            buf,
            text_start: 0,
            search_from: 0,
            boundary: line_start.then_some(0),
            at_end,
            whitespace: String::new(),
            frames: Vec::new(),
        }
    }

    fn run(mut self) -> Scan {
        while let Some(candidate) = self.next_candidate() {
            match candidate {
                Candidate::Marker { at, kind } => {
                    let body = at + kind.open().len();
                    self.push_text(at);
                    match self.buf[body..].find(kind.close()) {
                        Some(len) => {
                            let payload = self.buf[body..body + len].to_string();
                            debug!(?kind, payload_len = payload.len(), "Marker frame");
                            self.frames.push(LogicalFrame::Marked { kind, payload });
                            self.close_frame(body + len + kind.close().len());
                        }
                        None if self.at_end => {
                            warn!(
                                marker = kind.open(),
                                bytes = self.buf.len() - at,
                                "Dropping unterminated marker frame"
                            );
                            return self.drained();
                        }
                        None => return self.defer(at),
                    }
                }
                Candidate::Brace {
                    at,
                    brace,
                    line_start,
                } => {
                    let buf = self.buf;
                    let mut values =
                        serde_json::Deserializer::from_str(&buf[brace..]).into_iter::<Value>();
                    match values.next() {
                        Some(Ok(value)) if is_envelope(&value) => {
                            let end = brace + values.byte_offset();
                            let ends_stream = self.buf[end..].trim().is_empty();
                            if line_start || (ends_stream && self.at_end) {
                                self.push_text(at);
                                debug!(line_start, "JSON envelope frame");
                                self.frames.push(LogicalFrame::JsonEnvelope(value));
                                self.close_frame(end);
                            } else if ends_stream {
                                // Only an envelope if nothing but whitespace follows.
                                self.push_text(at);
                                return self.defer(at);
                            } else {
                                self.search_from = brace + 1;
                            }
                        }
                        Some(Err(e)) if e.is_eof() => {
                            if !self.at_end {
                                self.push_text(at);
                                return self.defer(at);
                            }
                            if ENVELOPE_START.is_match(&self.buf[at..]) {
                                self.push_text(at);
                                warn!(
                                    bytes = self.buf.len() - at,
                                    "Dropping truncated JSON envelope"
                                );
                                return self.drained();
                            }
                            self.search_from = brace + 1;
                        }
                        // Prose that merely looks like JSON.
                        _ => self.search_from = brace + 1,
                    }
                }
            }
        }
        self.finish_trailing()
    }

    fn next_candidate(&self) -> Option<Candidate> {
        let rest = &self.buf[self.search_from..];
        let marker = MarkerKind::ALL
            .into_iter()
            .filter_map(|kind| {
                rest.find(kind.open()).map(|pos| Candidate::Marker {
                    at: self.search_from + pos,
                    kind,
                })
            })
            .min_by_key(|c| c.at());
        let brace = rest
            .find('{')
            .map(|pos| self.brace_candidate(self.search_from + pos));

        match (marker, brace) {
            (Some(m), Some(b)) => Some(if b.at() < m.at() { b } else { m }),
            (m, b) => m.or(b),
        }
    }

    fn brace_candidate(&self, brace: usize) -> Candidate {
        let before = self.buf[self.text_start..brace].trim_end_matches([' ', '\t']);
        if let Some(prefix) = before.strip_suffix(SSE_DATA) {
            let at = self.text_start + prefix.len();
            if self.starts_line(at) {
                return Candidate::Brace {
                    at,
                    brace,
                    line_start: true,
                };
            }
        }
        Candidate::Brace {
            at: brace,
            brace,
            line_start: self.starts_line(brace),
        }
    }

    /// Whether only whitespace separates `pos` from the last newline, the
    /// last frame, or a buffer start that starts a line.
    fn starts_line(&self, pos: usize) -> bool {
        let newline = self.buf[..pos].rfind('\n').map(|i| i + 1);
        match newline.max(self.boundary) {
            Some(floor) => self.buf[floor..pos].trim().is_empty(),
            None => false,
        }
    }

    /// Emit `buf[text_start..end]` as text. Trailing whitespace is held for
    /// the next text run so that blank deliveries never get dropped.
    fn push_text(&mut self, end: usize) {
        let text = &self.buf[self.text_start..end];
        let body = text.trim_end();
        if body.trim_start().is_empty() {
            self.whitespace.push_str(text);
            return;
        }
        let mut frame = std::mem::take(&mut self.whitespace);
        frame.push_str(body);
        self.frames.push(LogicalFrame::PlainText(frame));
        self.whitespace.push_str(&text[body.len()..]);
    }

    fn close_frame(&mut self, end: usize) {
        self.text_start = end;
        self.search_from = end;
        self.boundary = Some(end);
    }

    /// Stop scanning and carry `buf[at..]` over to the next delivery.
    fn defer(mut self, at: usize) -> Scan {
        let line_start = self.starts_line(at);
        let mut remainder = std::mem::take(&mut self.whitespace);
        remainder.push_str(&self.buf[at..]);
        Scan {
            frames: self.frames,
            remainder,
            line_start,
        }
    }

    /// Stop scanning with nothing left to carry.
    fn drained(self) -> Scan {
        Scan {
            frames: self.frames,
            remainder: String::new(),
            line_start: true,
        }
    }

    fn finish_trailing(mut self) -> Scan {
        if self.at_end {
            self.push_text(self.buf.len());
            return self.drained();
        }
        let split = self.buf.len() - self.holdback_len();
        self.push_text(split);
        self.defer(split)
    }

    /// Length of the trailing suffix of the pending text that could still
    /// grow into an opening delimiter or a `data:` prefix.
    fn holdback_len(&self) -> usize {
        let pending = &self.buf[self.text_start..];
        let marker = MarkerKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let open = kind.open();
                (1..open.len())
                    .rev()
                    .find(|&n| pending.ends_with(&open[..n]))
            })
            .max()
            .unwrap_or(0);

        marker.max(self.sse_prefix_len())
    }

    /// Trailing `data:` prefix, or a piece of one, that starts a line.
    fn sse_prefix_len(&self) -> usize {
        let pending = &self.buf[self.text_start..];
        let body = pending.trim_end_matches([' ', '\t']);
        let len = if body.ends_with(SSE_DATA) {
            pending.len() - body.len() + SSE_DATA.len()
        } else if body.len() == pending.len() {
            (1..SSE_DATA.len())
                .rev()
                .find(|&n| pending.ends_with(&SSE_DATA[..n]))
                .unwrap_or(0)
        } else {
            0
        };
        if len > 0 && self.starts_line(self.buf.len() - len) {
            len
        } else {
            0
        }
    }
}

fn is_envelope(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|object| ENVELOPE_KEYS.iter().any(|key| object.contains_key(*key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(s: &str) -> LogicalFrame {
        LogicalFrame::PlainText(s.to_string())
    }

    #[test]
    fn trailing_whitespace_moves_to_the_next_run() {
        let (frames, rest) = classify("", "Hello ");
        assert_eq!(frames, vec![text("Hello")]);
        assert_eq!(rest, " ");

        let (frames, rest) = classify(&rest, "world");
        assert_eq!(frames, vec![text(" world")]);
        assert!(rest.is_empty());
    }

    #[test]
    fn marker_frames_split_surrounding_text() {
        let input = "Intro __TOOL_EVENT__{\"tool\":\"web_search\"}__END_TOOL_EVENT__outro";
        let (frames, rest) = classify("", input);
        assert_eq!(
            frames,
            vec![
                text("Intro"),
                LogicalFrame::Marked {
                    kind: MarkerKind::ToolEvent,
                    payload: "{\"tool\":\"web_search\"}".to_string(),
                },
                text(" outro"),
            ]
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn unterminated_marker_becomes_remainder() {
        let (frames, rest) = classify("", "abc__REASONING_REPLACE__thinking so");
        assert_eq!(frames, vec![text("abc")]);
        assert_eq!(rest, "__REASONING_REPLACE__thinking so");

        let (frames, rest) = classify(&rest, " far__END_REASONING_REPLACE__");
        assert_eq!(
            frames,
            vec![LogicalFrame::Marked {
                kind: MarkerKind::ReasoningReplace,
                payload: "thinking so far".to_string(),
            }]
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn partial_opening_delimiter_is_held_back() {
        let (frames, rest) = classify("", "text __TOOL_EV");
        assert_eq!(frames, vec![text("text")]);
        assert_eq!(rest, " __TOOL_EV");
    }

    #[test]
    fn whitespace_only_text_waits_for_the_next_run() {
        let (frames, rest) = classify("", "  ");
        assert!(frames.is_empty());
        assert_eq!(rest, "  ");

        let (frames, rest) = classify(&rest, "world");
        assert_eq!(frames, vec![text("  world")]);
        assert!(rest.is_empty());
    }

    #[test]
    fn concatenated_envelopes_are_split() {
        let input = r#"{"type":"reasoning_update","reasoning":"a"}{"type":"done","thread_id":"t"}"#;
        let (frames, rest) = classify("", input);
        assert_eq!(
            frames,
            vec![
                LogicalFrame::JsonEnvelope(json!({"type": "reasoning_update", "reasoning": "a"})),
                LogicalFrame::JsonEnvelope(json!({"type": "done", "thread_id": "t"})),
            ]
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn truncated_envelope_is_carried() {
        let (frames, rest) = classify("", r#"{"type":"do"#);
        assert!(frames.is_empty());
        assert_eq!(rest, r#"{"type":"do"#);

        let (frames, rest) = classify(&rest, r#"ne","thread_id":"abc"}"#);
        assert_eq!(
            frames,
            vec![LogicalFrame::JsonEnvelope(json!({"type": "done", "thread_id": "abc"}))]
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn envelope_after_text_waits_for_end_of_stream() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(r#"All set.{"type":"done","thread_id":"x"}"#);
        assert_eq!(frames, vec![text("All set.")]);
        assert_eq!(
            decoder.finish(),
            vec![LogicalFrame::JsonEnvelope(json!({"type": "done", "thread_id": "x"}))]
        );
    }

    #[test]
    fn envelope_on_its_own_line_is_immediate() {
        let (frames, _) = classify("", "All set.\n{\"type\":\"done\",\"thread_id\":\"x\"}");
        assert_eq!(
            frames,
            vec![
                text("All set."),
                LogicalFrame::JsonEnvelope(json!({"type": "done", "thread_id": "x"})),
            ]
        );
    }

    #[test]
    fn quoted_envelopes_in_prose_stay_text() {
        let prose = "Return `{\"error\": \"not found\"}` on a miss. The API ends with {\"type\": \"done\"} as its final line.";
        let mut decoder = FrameDecoder::new();
        let mut frames = decoder.push(prose);
        frames.extend(decoder.finish());
        assert_eq!(frames, vec![text(prose)]);
    }

    #[test]
    fn json_that_is_not_an_envelope_stays_text() {
        let input = "See [1].\n{\"name\": \"demo\"}\n[2, 3]\n";
        let (frames, rest) = classify("", input);
        assert_eq!(frames, vec![text("See [1].\n{\"name\": \"demo\"}\n[2, 3]")]);
        assert_eq!(rest, "\n");
    }

    #[test]
    fn data_inside_a_word_is_not_a_prefix() {
        let mut decoder = FrameDecoder::new();
        let mut frames = decoder.push("metadata: {\"type\": \"x\"} here");
        frames.extend(decoder.finish());
        assert_eq!(frames, vec![text("metadata: {\"type\": \"x\"} here")]);
    }

    #[test]
    fn brace_prose_stays_text() {
        let (frames, rest) = classify("", "Use {curly} braces for {\"type\" hints}.");
        assert_eq!(frames, vec![text("Use {curly} braces for {\"type\" hints}.")]);
        assert!(rest.is_empty());
    }

    #[test]
    fn sse_data_prefix_is_tolerated() {
        let (frames, _) = classify("", "data: {\"type\": \"error\", \"message\": \"boom\"}\n\n");
        assert_eq!(
            frames,
            vec![LogicalFrame::JsonEnvelope(json!({"type": "error", "message": "boom"}))]
        );
    }

    #[test]
    fn split_sse_prefix_is_held_back() {
        let (frames, rest) = classify("", "Draft.\ndata: ");
        assert_eq!(frames, vec![text("Draft.")]);
        assert_eq!(rest, "\ndata: ");

        let (frames, rest) = classify("", "Draft.\nda");
        assert_eq!(frames, vec![text("Draft.")]);
        assert_eq!(rest, "\nda");
        let (frames, rest) = classify(&rest, "ta: {\"type\":\"done\"}");
        assert_eq!(frames, vec![LogicalFrame::JsonEnvelope(json!({"type": "done"}))]);
        assert_eq!(rest, "\n");
    }

    #[test]
    fn envelope_keys_are_top_level() {
        assert!(is_envelope(&json!({"id": 1, "thread_id": "t"})));
        assert!(!is_envelope(&json!({"config": {"error": "x"}})));
        assert!(!is_envelope(&json!(["type"])));
    }

    #[test]
    fn trailing_padding_before_the_final_envelope_is_dropped() {
        for split in 1..8 {
            let input = r#"Hello {"type":"done"}"#;
            let mut decoder = FrameDecoder::new();
            let mut frames = decoder.push(&input[..split]);
            frames.extend(decoder.push(&input[split..]));
            frames.extend(decoder.finish());

            let mut joined = String::new();
            let mut others = Vec::new();
            for frame in frames {
                match frame {
                    LogicalFrame::PlainText(t) => joined.push_str(&t),
                    other => others.push(other),
                }
            }
            assert_eq!(joined, "Hello", "split at {}", split);
            assert_eq!(others, vec![LogicalFrame::JsonEnvelope(json!({"type": "done"}))]);
        }
    }

    #[test]
    fn decoder_finish_flushes_text_and_drops_broken_frames() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push("tail __"), vec![text("tail")]);
        assert_eq!(decoder.finish(), vec![text(" __")]);

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push("__TOOL_EVENT__{\"tool\":").is_empty());
        assert!(decoder.finish().is_empty());
        assert!(decoder.carry().is_empty());
    }

    #[test]
    fn decoder_enforces_carry_limit() {
        let mut decoder = FrameDecoder::with_max_carry(16);
        let frames = decoder.push("__TOOL_EVENT__{\"tool\": \"a very long payload\"");
        assert!(frames.is_empty());
        assert!(decoder.carry().is_empty());
    }
}
