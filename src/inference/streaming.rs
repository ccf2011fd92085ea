//! Streaming response decoder for `streamGenerateContent`.
//!
//! The endpoint emits newline-delimited JSON fragments. Some deployments wrap
//! the same fragments in a JSON array (`[`, `,`, `]`) and pretty-print them
//! across several lines, so the decoder splits on complete top-level objects
//! rather than on newlines.

use futures::stream::{self, Stream, StreamExt};

use super::errors::InferenceError;
use super::types::GenerateContentResponse;

// ─── Byte-stream entry point ────────────────────────────────────────────────

/// Decode a streaming HTTP body into response fragments.
pub fn parse_ndjson_stream(
    response: reqwest::Response,
) -> impl Stream<Item = Result<GenerateContentResponse, InferenceError>> {
    let byte_stream = response.bytes_stream();

    stream::unfold(
        (byte_stream, NdjsonDecoder::new(), Vec::new(), false),
        |(mut byte_stream, mut decoder, mut ready, mut finished)| async move {
            loop {
                if !ready.is_empty() {
                    let item = ready.remove(0);
                    return Some((item, (byte_stream, decoder, ready, finished)));
                }
                if finished {
                    return None;
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => ready.extend(decoder.push(&bytes)),
                    Some(Err(e)) => {
                        finished = true;
                        ready.push(Err(InferenceError::StreamError {
                            reason: format!("stream read error: {e}"),
                        }));
                    }
                    None => {
                        finished = true;
                        if let Some(trailing) = decoder.finish() {
                            ready.push(trailing);
                        }
                    }
                }
            }
        },
    )
}

// ─── Decoder ────────────────────────────────────────────────────────────────

/// Incremental splitter of top-level JSON objects.
///
/// Tracks brace depth outside of string literals. Multi-byte UTF-8 sequences
/// never contain ASCII bytes, so scanning raw bytes is safe across chunk
/// boundaries.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
    /// Offset of the `{` that opened the current object.
    object_start: Option<usize>,
    /// Scan position within `buffer`.
    cursor: usize,
    depth: u32,
    in_string: bool,
    escaped: bool,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every fragment completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<GenerateContentResponse, InferenceError>> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();

        while self.cursor < self.buffer.len() {
            let byte = self.buffer[self.cursor];
            self.cursor += 1;

            if self.in_string {
                match byte {
                    _ if self.escaped => self.escaped = false,
                    b'\\' => self.escaped = true,
                    b'"' => self.in_string = false,
                    _ => {}
                }
                continue;
            }

            match byte {
                b'"' if self.depth > 0 => self.in_string = true,
                b'{' => {
                    if self.depth == 0 {
                        self.object_start = Some(self.cursor - 1);
                    }
                    self.depth += 1;
                }
                b'}' if self.depth > 0 => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        if let Some(start) = self.object_start.take() {
                            out.push(parse_fragment(&self.buffer[start..self.cursor]));
                        }
                        self.buffer.drain(..self.cursor);
                        self.cursor = 0;
                    }
                }
                // Array framing, separators and blank lines between fragments.
                _ => {}
            }
        }

        if self.depth == 0 && self.object_start.is_none() {
            self.buffer.clear();
            self.cursor = 0;
        }

        out
    }

    /// Called at end of stream; reports a truncated trailing object.
    pub fn finish(&mut self) -> Option<Result<GenerateContentResponse, InferenceError>> {
        let start = self.object_start.take()?;
        let leftover = String::from_utf8_lossy(&self.buffer[start..]).into_owned();
        self.buffer.clear();
        self.cursor = 0;
        self.depth = 0;
        self.in_string = false;
        Some(Err(InferenceError::StreamError {
            reason: format!("stream ended inside a JSON fragment: {leftover}"),
        }))
    }
}

fn parse_fragment(raw: &[u8]) -> Result<GenerateContentResponse, InferenceError> {
    serde_json::from_slice(raw).map_err(|e| InferenceError::StreamError {
        reason: format!(
            "failed to parse stream fragment: {e} (data: {})",
            String::from_utf8_lossy(raw)
        ),
    })
}

// ─── Tests ──────────────────────────────────────────────────────────────────
