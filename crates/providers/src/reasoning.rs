//! Streaming reasoning-tag extraction.
//!
//! Some models emit their "thinking" inline, wrapped in a marker pair such
//! as `<think>...</think>`, interleaved with the final answer. The markers
//! arrive as ordinary tokens and may be split across chunk boundaries, so
//! the split has to happen incrementally without corrupting either stream.
//!
//! [`ReasoningExtractor`] is a small state machine over the incoming text:
//! it buffers just enough to classify the head of the stream, then routes
//! every increment to either the content output or the reasoning output.
//! Concatenating all content increments yields the original stream with the
//! marked region removed; concatenating all reasoning increments yields the
//! region's inner text.

const DEFAULT_OPEN: &str = "<think>";
const DEFAULT_CLOSE: &str = "</think>";

/// Output of one [`ReasoningExtractor::push`] or `finish` step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub content: Option<String>,
    pub reasoning: Option<String>,
}

impl Extracted {
    fn push_content(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.content.get_or_insert_with(String::new).push_str(text);
    }

    fn push_reasoning(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.reasoning.get_or_insert_with(String::new).push_str(text);
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.reasoning.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Buffering the stream head until it either completes the opening
    /// marker or proves it cannot.
    BeforeDecision,
    /// The stream does not use markers; everything is content.
    Passthrough,
    /// Inside the marked region; retaining a trailing window so a split
    /// closing marker is never missed.
    InReasoning,
}

/// Incremental splitter for marker-delimited reasoning content.
#[derive(Debug)]
pub struct ReasoningExtractor {
    open: String,
    close: String,
    mode: Mode,
    pending: String,
}

impl Default for ReasoningExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_OPEN, DEFAULT_CLOSE)
    }
}

impl ReasoningExtractor {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
            mode: Mode::BeforeDecision,
            pending: String::new(),
        }
    }

    /// Feed the next text increment and collect whatever can be classified.
    pub fn push(&mut self, input: &str) -> Extracted {
        let mut out = Extracted::default();
        match self.mode {
            Mode::Passthrough => out.push_content(input),
            Mode::BeforeDecision => {
                self.pending.push_str(input);
                self.decide(&mut out);
            }
            Mode::InReasoning => {
                self.pending.push_str(input);
                self.drain_reasoning(&mut out);
            }
        }
        out
    }

    /// The stream ended. Flush whatever is still buffered: an unterminated
    /// reasoning region is emitted as reasoning, an undecided head as
    /// content.
    pub fn finish(&mut self) -> Extracted {
        let mut out = Extracted::default();
        let rest = std::mem::take(&mut self.pending);
        match self.mode {
            Mode::InReasoning => out.push_reasoning(&rest),
            Mode::BeforeDecision => out.push_content(&rest),
            Mode::Passthrough => {}
        }
        self.mode = Mode::Passthrough;
        out
    }

    /// Classify the buffered stream head. The opening marker is only
    /// recognized at the head, after optional leading whitespace; the
    /// moment the head can no longer extend into the marker, the stream is
    /// committed to passthrough permanently.
    fn decide(&mut self, out: &mut Extracted) {
        let lead_len = self.pending.len() - self.pending.trim_start().len();
        let head = &self.pending[lead_len..];

        if head.starts_with(&self.open) {
            let lead = self.pending[..lead_len].to_string();
            out.push_content(&lead);
            self.pending.drain(..lead_len + self.open.len());
            self.mode = Mode::InReasoning;
            self.drain_reasoning(out);
        } else if self.open.starts_with(head) {
            // Still a prefix candidate (possibly empty) — keep buffering.
        } else {
            self.mode = Mode::Passthrough;
            out.push_content(&std::mem::take(&mut self.pending));
        }
    }

    /// Flush reasoning text, keeping a trailing window of closing-marker
    /// length so a marker split across chunk boundaries is still detected.
    fn drain_reasoning(&mut self, out: &mut Extracted) {
        if let Some(pos) = self.pending.find(&self.close) {
            let inner = self.pending[..pos].to_string();
            out.push_reasoning(&inner);
            let rest = self.pending[pos + self.close.len()..].to_string();
            self.pending.clear();
            self.mode = Mode::Passthrough;
            out.push_content(&rest);
            return;
        }

        // The closing marker is ASCII, so its byte length equals its
        // character length; the retained window must be measured in
        // characters because the stream text may not be ASCII.
        let keep = self.close.len();
        let char_count = self.pending.chars().count();
        if char_count > keep {
            let split_at = self
                .pending
                .char_indices()
                .nth(char_count - keep)
                .map(|(i, _)| i)
                .unwrap_or(0);
            let flushed: String = self.pending.drain(..split_at).collect();
            out.push_reasoning(&flushed);
        }
    }
}
