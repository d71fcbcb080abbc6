//! Incremental decoding of newline-delimited JSON responses
//!
//! Streaming endpoints send one JSON object per line, but network chunks do
//! not respect line boundaries. The decoder buffers raw bytes (1 MiB cap)
//! and extracts each complete top-level object with a single bracket-matching
//! pass that ignores braces inside string literals.

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::pin::Pin;
use thiserror::Error;

use crate::errors::{BoxError, RagError, Result};

/// Maximum buffered bytes before the stream is considered broken
pub const MAX_BUFFER_SIZE: usize = 1_048_576;

/// Framing failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer overflow: {size} bytes exceeds maximum {max}")]
    Overflow { size: usize, max: usize },

    #[error("mismatched braces: too many closing braces")]
    Mismatched,

    #[error("stream ended inside a JSON object ({0} bytes pending)")]
    Truncated(usize),
}

/// Byte buffer that yields complete JSON objects
#[derive(Debug)]
pub struct JsonObjectDecoder {
    buffer: Vec<u8>,
    max_buffer_size: usize,
}

impl JsonObjectDecoder {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFER_SIZE)
    }

    /// Decoder with a custom buffer cap
    pub fn with_capacity(max_buffer_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_buffer_size,
        }
    }

    /// Append raw bytes
    pub fn push(&mut self, bytes: &[u8]) -> std::result::Result<(), DecodeError> {
        let size = self.buffer.len() + bytes.len();
        if size > self.max_buffer_size {
            return Err(DecodeError::Overflow {
                size,
                max: self.max_buffer_size,
            });
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Remove and return the next complete object, if one is buffered
    pub fn next_object(&mut self) -> std::result::Result<Option<String>, DecodeError> {
        match self.find_complete_object()? {
            Some((start, end)) => {
                let json = String::from_utf8_lossy(&self.buffer[start..=end]).into_owned();
                self.buffer.drain(..=end);
                Ok(Some(json))
            }
            None => Ok(None),
        }
    }

    /// Bytes still buffered
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// True when nothing but whitespace is buffered
    pub fn is_drained(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }

    fn find_complete_object(&self) -> std::result::Result<Option<(usize, usize)>, DecodeError> {
        let mut depth: i64 = 0;
        let mut start: Option<usize> = None;
        let mut in_string = false;
        let mut escape_next = false;

        for (i, &byte) in self.buffer.iter().enumerate() {
            if escape_next {
                escape_next = false;
                continue;
            }

            match byte {
                b'\\' if in_string => escape_next = true,
                b'"' => in_string = !in_string,
                _ if in_string => {}
                b'{' => {
                    if depth == 0 {
                        start = Some(i);
                    }
                    depth += 1;
                }
                b'}' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(DecodeError::Mismatched);
                    }
                    if depth == 0 {
                        if let Some(start) = start {
                            return Ok(Some((start, i)));
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(None)
    }
}

impl Default for JsonObjectDecoder {
    fn default() -> Self {
        Self::new()
    }
}

struct DecodeState<S> {
    provider: String,
    bytes: Pin<Box<S>>,
    decoder: JsonObjectDecoder,
    finished: bool,
}

/// Turn a response byte stream into a stream of deserialized objects.
///
/// The stream ends after the first error; transport, framing and parse
/// failures are all reported as `RagError::Llm` for `provider`.
pub fn decode_objects<S, E, T>(provider: &str, bytes: S) -> BoxStream<'static, Result<T>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<BoxError>,
    T: DeserializeOwned + Send + 'static,
{
    let state = DecodeState {
        provider: provider.to_string(),
        bytes: Box::pin(bytes),
        decoder: JsonObjectDecoder::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            match state.decoder.next_object() {
                Ok(Some(json)) => {
                    let item = serde_json::from_str::<T>(&json)
                        .map_err(|e| RagError::llm(state.provider.clone(), "stream", e));
                    state.finished = item.is_err();
                    return Some((item, state));
                }
                Ok(None) => {}
                Err(e) => {
                    state.finished = true;
                    let err = RagError::llm(state.provider.clone(), "stream", e);
                    return Some((Err(err), state));
                }
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    if let Err(e) = state.decoder.push(&chunk) {
                        state.finished = true;
                        let err = RagError::llm(state.provider.clone(), "stream", e);
                        return Some((Err(err), state));
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    let err = RagError::llm(state.provider.clone(), "stream", e);
                    return Some((Err(err), state));
                }
                None => {
                    state.finished = true;
                    if state.decoder.is_drained() {
                        return None;
                    }
                    let pending = DecodeError::Truncated(state.decoder.buffer_size());
                    let err = RagError::llm(state.provider.clone(), "stream", pending);
                    return Some((Err(err), state));
                }
            }
        }
    })
    .boxed()
}
