//! Stream assembler for OpenAI-compatible chat completion streams.
//!
//! The wire format is newline-delimited text. Relevant lines look like
//! `data: {"choices":[{"delta":{"content":"..."}}]}` or the literal
//! `data: [DONE]`. Everything else (comments, `event:` fields, blank
//! lines) is ignored, and a data line that does not carry
//! `choices[0].delta.content` is skipped without ending the stream.
//!
//! Framing is per line rather than per SSE event: every `data:` line is
//! its own frame, even when several share one blank-line-terminated event.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use futures_util::stream::BoxStream;
use serde_json::Value;

use super::shared::{ProviderError, ProviderResult};

/// Prefix of an SSE data line.
pub const DATA_PREFIX: &str = "data: ";

/// Payload that marks the end of the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One parsed line of the streaming protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A data payload (not yet interpreted).
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Why a stream stopped producing deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server sent `data: [DONE]`.
    Sentinel,
    /// The transport closed without a sentinel.
    Eof,
}

/// Events produced by [`DeltaStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// An incremental text fragment.
    Delta(String),
    /// Terminal event; nothing follows it.
    Completed(StreamEnd),
}

/// Boxed stream of assembler events.
pub type DeltaEventStream = BoxStream<'static, ProviderResult<StreamEvent>>;

/// Classifies a single complete line.
///
/// Returns `None` for lines that are not data lines.
pub fn parse_frame_line(line: &str) -> Option<Frame> {
    let payload = line.trim().strip_prefix(DATA_PREFIX)?;
    if payload == DONE_SENTINEL {
        Some(Frame::Done)
    } else {
        Some(Frame::Data(payload.to_string()))
    }
}

/// Extracts `choices[0].delta.content` from a data payload.
///
/// Returns `None` for malformed JSON, other shapes, and empty content.
pub fn extract_delta(payload: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(payload).ok()?;
    let content = value.pointer("/choices/0/delta/content")?.as_str()?;
    (!content.is_empty()).then(|| content.to_string())
}

/// Splits raw bytes into complete lines.
///
/// Bytes are buffered until a `\n` arrives, so a multi-byte character
/// split across network reads is only decoded once it is whole.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: BytesMut,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut start = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let line = self.pending.split_to(start + offset + 1);
            lines.push(decode_line(&line[..line.len() - 1]));
            start = 0;
        }
        lines
    }

    /// Returns the unterminated tail, if any, and empties the buffer.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = self.pending.split();
        Some(decode_line(&rest))
    }

    /// Drops everything still buffered.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Turns a response byte stream into text deltas.
///
/// Ends with exactly one [`StreamEvent::Completed`], or with a single
/// error when the transport fails before any delta was produced. A
/// transport failure after deltas were emitted is treated as EOF so a
/// caller never sees both deltas and an error for the same call.
pub struct DeltaStream<S> {
    inner: S,
    framer: LineFramer,
    pending: VecDeque<StreamEvent>,
    emitted_delta: bool,
    terminated: bool,
}

impl<S> DeltaStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            framer: LineFramer::new(),
            pending: VecDeque::new(),
            emitted_delta: false,
            terminated: false,
        }
    }

    fn handle_lines(&mut self, lines: Vec<String>) {
        for line in lines {
            if self.terminated {
                return;
            }
            match parse_frame_line(&line) {
                Some(Frame::Done) => {
                    self.framer.clear();
                    self.terminate(StreamEnd::Sentinel);
                }
                Some(Frame::Data(payload)) => match extract_delta(&payload) {
                    Some(delta) => {
                        self.emitted_delta = true;
                        self.pending.push_back(StreamEvent::Delta(delta));
                    }
                    None => tracing::debug!(payload = %payload, "skipping data frame without content"),
                },
                None => {}
            }
        }
    }

    fn terminate(&mut self, end: StreamEnd) {
        self.terminated = true;
        self.pending.push_back(StreamEvent::Completed(end));
    }
}

impl<S, E> Stream for DeltaStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = ProviderResult<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if self.terminated {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    let lines = self.framer.push(&chunk);
                    self.handle_lines(lines);
                }
                Poll::Ready(Some(Err(e))) => {
                    if self.emitted_delta {
                        tracing::warn!(error = %e, "stream interrupted after deltas; treating as end of stream");
                        self.framer.clear();
                        self.terminate(StreamEnd::Eof);
                    } else {
                        self.terminated = true;
                        return Poll::Ready(Some(Err(ProviderError::transport(format!(
                            "Network error: {e}"
                        )))));
                    }
                }
                Poll::Ready(None) => {
                    // The last line may lack a trailing newline.
                    if let Some(tail) = self.framer.finish() {
                        self.handle_lines(vec![tail]);
                    }
                    if !self.terminated {
                        self.terminate(StreamEnd::Eof);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
