//! Streaming response handling.
//!
//! # Data Flow
//! ```text
//! response body bytes
//!     → sse.rs (line framing, chunk JSON, end marker)
//!     → timer.rs (stamp each output unit on arrival)
//!     → TimedStream (events, client metrics, text, usage)
//! ```

pub mod sse;
pub mod timer;

pub use sse::{decode_frames, FrameStream, SseDecoder, SseFrame, StreamChunk};
pub use timer::StreamTimer;
