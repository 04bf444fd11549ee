//! Per-request token timing.
//!
//! The timer stamps each output unit at the moment it pulls the frame from
//! the decoder, so nothing sits in a queue between arrival and stamp.

use futures_util::StreamExt;
use tokio::time::Instant;

use crate::inference::error::RequestError;
use crate::results::record::{ClientMetrics, TimedStream, TokenEvent, Usage};
use crate::stream::sse::{FrameStream, SseFrame};

/// Timing state of one in-flight stream. Owned by its request task.
#[derive(Debug)]
pub struct StreamTimer {
    dispatched: Instant,
    arrivals: Vec<Instant>,
    text: String,
    usage: Option<Usage>,
    finish_reason: Option<String>,
}

impl StreamTimer {
    pub fn new(dispatched: Instant) -> Self {
        Self {
            dispatched,
            arrivals: Vec::new(),
            text: String::new(),
            usage: None,
            finish_reason: None,
        }
    }

    /// Record one output unit arriving at `at`.
    pub fn record_unit(&mut self, at: Instant, content: &str) {
        self.arrivals.push(at);
        self.text.push_str(content);
    }

    pub fn units(&self) -> usize {
        self.arrivals.len()
    }

    /// Pull frames until the end marker.
    ///
    /// Units seen before a failure stay recorded. A body that ends without
    /// `[DONE]` is [`RequestError::Truncated`].
    pub async fn consume(&mut self, frames: &mut FrameStream) -> Result<(), RequestError> {
        loop {
            match frames.next().await {
                None => return Err(RequestError::Truncated),
                Some(Err(e)) => return Err(e),
                Some(Ok(SseFrame::Done)) => return Ok(()),
                Some(Ok(SseFrame::Chunk(chunk))) => {
                    let now = Instant::now();
                    if let Some(usage) = chunk.usage {
                        self.usage = Some(usage);
                    }
                    if chunk.finish_reason.is_some() {
                        self.finish_reason = chunk.finish_reason;
                    }
                    if !chunk.content.is_empty() {
                        self.record_unit(now, &chunk.content);
                    }
                }
            }
        }
    }

    /// Derive client metrics, with `ended` as the terminal instant.
    pub fn finish(self, ended: Instant) -> TimedStream {
        let dispatched = self.dispatched;
        let events: Vec<TokenEvent> = self
            .arrivals
            .iter()
            .enumerate()
            .map(|(index, at)| TokenEvent {
                index,
                offset: at.saturating_duration_since(dispatched),
            })
            .collect();

        let inter_unit_gaps = self
            .arrivals
            .windows(2)
            .map(|pair| pair[1].saturating_duration_since(pair[0]))
            .collect();

        let tpot = match (self.arrivals.first(), self.arrivals.last()) {
            (Some(first), Some(last)) if self.arrivals.len() > 1 => {
                Some(last.saturating_duration_since(*first) / (self.arrivals.len() as u32 - 1))
            }
            _ => None,
        };

        TimedStream {
            client: ClientMetrics {
                ttft: events.first().map(|e| e.offset),
                tpot,
                e2e_latency: ended.saturating_duration_since(dispatched),
                inter_unit_gaps,
            },
            events,
            generated_text: self.text,
            usage: self.usage,
            finish_reason: self.finish_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::sse::StreamChunk;
    use futures_util::stream;
    use std::time::Duration;

    fn unit(text: &str) -> SseFrame {
        SseFrame::Chunk(StreamChunk {
            content: text.to_string(),
            ..Default::default()
        })
    }

    /// Frames delivered after the given delays, each measured from the previous frame.
    fn scripted(script: Vec<(u64, Result<SseFrame, RequestError>)>) -> FrameStream {
        stream::iter(script)
            .then(|(delay, frame)| async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                frame
            })
            .boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn test_reproduces_synthetic_delays() {
        let start = Instant::now();
        let mut timer = StreamTimer::new(start);
        let mut frames = scripted(vec![
            (50, Ok(unit("a"))),
            (20, Ok(unit("b"))),
            (30, Ok(unit("c"))),
            (10, Ok(SseFrame::Done)),
        ]);

        timer.consume(&mut frames).await.unwrap();
        let timed = timer.finish(Instant::now());

        assert_eq!(timed.client.ttft, Some(Duration::from_millis(50)));
        assert_eq!(
            timed.client.inter_unit_gaps,
            vec![Duration::from_millis(20), Duration::from_millis(30)]
        );
        assert_eq!(timed.client.tpot, Some(Duration::from_millis(25)));
        assert_eq!(timed.client.e2e_latency, Duration::from_millis(110));
        assert_eq!(timed.generated_text, "abc");
        let offsets: Vec<_> = timed.events.iter().map(|e| e.offset.as_millis()).collect();
        assert_eq!(offsets, vec![50, 70, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_unit_has_no_tpot() {
        let mut timer = StreamTimer::new(Instant::now());
        let mut frames = scripted(vec![(5, Ok(unit("x"))), (0, Ok(SseFrame::Done))]);
        timer.consume(&mut frames).await.unwrap();
        let timed = timer.finish(Instant::now());
        assert_eq!(timed.client.tpot, None);
        assert!(timed.client.inter_unit_gaps.is_empty());
        assert_eq!(timed.client.ttft, Some(Duration::from_millis(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_frames_are_not_units_and_usage_is_kept() {
        let mut timer = StreamTimer::new(Instant::now());
        let usage = Usage {
            prompt_tokens: Some(3),
            completion_tokens: Some(1),
        };
        let mut frames = scripted(vec![
            (5, Ok(unit(""))),
            (5, Ok(unit("hi"))),
            (
                5,
                Ok(SseFrame::Chunk(StreamChunk {
                    usage: Some(usage),
                    ..Default::default()
                })),
            ),
            (0, Ok(SseFrame::Done)),
        ]);
        timer.consume(&mut frames).await.unwrap();
        let timed = timer.finish(Instant::now());
        assert_eq!(timed.events.len(), 1);
        assert_eq!(timed.client.ttft, Some(Duration::from_millis(10)));
        assert_eq!(timed.usage, Some(usage));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_keeps_partial_events() {
        let mut timer = StreamTimer::new(Instant::now());
        let mut frames = scripted(vec![(10, Ok(unit("a"))), (10, Ok(unit("b")))]);
        let err = timer.consume(&mut frames).await.unwrap_err();
        assert_eq!(err, RequestError::Truncated);
        assert_eq!(timer.units(), 2);
        let timed = timer.finish(Instant::now());
        assert_eq!(timed.events.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decoder_error_is_returned() {
        let mut timer = StreamTimer::new(Instant::now());
        let mut frames = scripted(vec![
            (1, Ok(unit("a"))),
            (1, Err(RequestError::MalformedChunk("bad".into()))),
        ]);
        let err = timer.consume(&mut frames).await.unwrap_err();
        assert!(matches!(err, RequestError::MalformedChunk(_)));
        assert_eq!(timer.units(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_reason_is_kept() {
        let mut timer = StreamTimer::new(Instant::now());
        let mut frames = scripted(vec![
            (1, Ok(unit("a"))),
            (
                1,
                Ok(SseFrame::Chunk(StreamChunk {
                    finish_reason: Some("length".into()),
                    ..Default::default()
                })),
            ),
            (1, Ok(unit(""))),
            (0, Ok(SseFrame::Done)),
        ]);
        timer.consume(&mut frames).await.unwrap();
        let timed = timer.finish(Instant::now());
        assert_eq!(timed.finish_reason.as_deref(), Some("length"));
    }
}
