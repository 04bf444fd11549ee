//! Server-sent events decoding for streaming chat completions.
//!
//! Only `data:` lines matter. Each carries one JSON chunk, and the literal
//! `[DONE]` marks the end of the stream. Comment lines (`:`), other SSE fields
//! and blank separators are skipped.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;

use crate::inference::error::RequestError;
use crate::results::record::Usage;

const DONE_MARKER: &str = "[DONE]";

/// A decoded event.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Chunk(StreamChunk),
    Done,
}

/// The parts of a chat completion chunk the timer cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamChunk {
    /// Delta content of the first choice. Empty for role or usage frames.
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChoicePayload>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChoicePayload {
    #[serde(default)]
    delta: Option<DeltaPayload>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeltaPayload {
    #[serde(default)]
    content: Option<String>,
}

fn parse_chunk(data: &str) -> Result<StreamChunk, RequestError> {
    let payload: ChunkPayload =
        serde_json::from_str(data).map_err(|e| RequestError::MalformedChunk(e.to_string()))?;

    if let Some(error) = payload.error {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(RequestError::Server(message));
    }

    let first = payload.choices.into_iter().next();
    let (content, finish_reason) = match first {
        Some(choice) => (
            choice.delta.and_then(|d| d.content).unwrap_or_default(),
            choice.finish_reason,
        ),
        None => (String::new(), None),
    };
    Ok(StreamChunk {
        content,
        finish_reason,
        usage: payload.usage,
    })
}

/// Incremental line decoder. Bytes may be split anywhere, including inside
/// a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return the frames completed by them.
    ///
    /// Decoding stops at the first bad frame, which is returned last.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<SseFrame, RequestError>> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            match decode_line(&line[..line.len() - 1]) {
                Ok(Some(frame)) => frames.push(Ok(frame)),
                Ok(None) => {}
                Err(e) => {
                    frames.push(Err(e));
                    self.buf.clear();
                    break;
                }
            }
        }
        frames
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Vec<Result<SseFrame, RequestError>> {
        let line = std::mem::take(&mut self.buf);
        match decode_line(&line) {
            Ok(Some(frame)) => vec![Ok(frame)],
            Ok(None) => Vec::new(),
            Err(e) => vec![Err(e)],
        }
    }
}

fn decode_line(raw: &[u8]) -> Result<Option<SseFrame>, RequestError> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    if raw.is_empty() || raw[0] == b':' {
        return Ok(None);
    }
    let line = std::str::from_utf8(raw).map_err(|e| RequestError::MalformedChunk(e.to_string()))?;
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.strip_prefix(' ').unwrap_or(data).trim_end();
    if data.is_empty() {
        return Ok(None);
    }
    if data == DONE_MARKER {
        return Ok(Some(SseFrame::Done));
    }
    parse_chunk(data).map(|chunk| Some(SseFrame::Chunk(chunk)))
}

/// Decoded frames of one response body.
pub type FrameStream = BoxStream<'static, Result<SseFrame, RequestError>>;

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<SseFrame, RequestError>>,
    finished: bool,
}

/// Turn a byte stream into a frame stream. Transport errors surface as
/// [`RequestError::Stream`]; the stream ends after the first error.
pub fn decode_frames<S, B, E>(body: S) -> FrameStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                if item.is_err() {
                    st.pending.clear();
                    st.finished = true;
                }
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    let frames = st.decoder.feed(bytes.as_ref());
                    st.pending.extend(frames);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(RequestError::Stream(e.to_string())), st));
                }
                None => {
                    st.finished = true;
                    let frames = st.decoder.finish();
                    st.pending.extend(frames);
                }
            }
        }
    })
    .boxed()
}
