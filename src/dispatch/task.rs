//! One request's lifecycle, from dispatch to a finalized record.
//!
//! ```text
//! scheduled → dispatched → streaming → completed (success | failure)
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{timeout_at, Instant};

use crate::inference::{InferenceBackend, OutboundRequest, RequestError, RequestSpec};
use crate::lifecycle::ShutdownListener;
use crate::observability::metrics;
use crate::results::record::RequestRecord;
use crate::stream::timer::StreamTimer;

/// Run-wide counters, for progress reporting only.
#[derive(Debug, Default)]
pub struct DispatchStats {
    dispatched: AtomicU64,
    in_flight: AtomicUsize,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl DispatchStats {
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Count a dispatch and hold an in-flight slot until the guard drops.
    pub fn track(self: &Arc<Self>) -> InFlightGuard {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::record_dispatch();
        metrics::record_in_flight(now);
        InFlightGuard {
            stats: self.clone(),
        }
    }

    fn record_outcome(&self, success: bool) {
        if success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Decrements the in-flight gauge when dropped, however the task ends.
#[derive(Debug)]
pub struct InFlightGuard {
    stats: Arc<DispatchStats>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let now = self.stats.in_flight.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        metrics::record_in_flight(now);
    }
}

/// Everything one request task owns.
pub struct RequestTask {
    pub backend: Arc<dyn InferenceBackend>,
    pub spec: RequestSpec,
    pub record: RequestRecord,
    pub run_start: Instant,
    pub dispatched_at: Instant,
    pub timeout: Duration,
    pub cancel: ShutdownListener,
    pub sink: UnboundedSender<RequestRecord>,
    pub guard: InFlightGuard,
}

async fn execute(
    backend: &dyn InferenceBackend,
    request: OutboundRequest<'_>,
    timer: &mut StreamTimer,
) -> Result<(), RequestError> {
    let mut frames = backend.open_stream(request).await?;
    timer.consume(&mut frames).await
}

impl RequestTask {
    /// Drive the request to a terminal state and hand the record to the sink.
    pub async fn run(self) {
        let RequestTask {
            backend,
            spec,
            mut record,
            run_start,
            dispatched_at,
            timeout,
            mut cancel,
            sink,
            guard,
        } = self;

        let request = OutboundRequest {
            request_id: record.request_id,
            trace: record.trace,
            spec: &spec,
        };
        let deadline = dispatched_at + timeout;
        let mut timer = StreamTimer::new(dispatched_at);

        let outcome = tokio::select! {
            biased;
            _ = cancel.recv() => Err(RequestError::Cancelled("run cancelled while in flight".into())),
            result = timeout_at(deadline, execute(backend.as_ref(), request, &mut timer)) => {
                result.unwrap_or_else(|_| Err(RequestError::Timeout(timeout.as_millis() as u64)))
            }
        };

        let ended = Instant::now();
        let timed = timer.finish(ended);
        let ttft = timed.client.ttft;
        let gaps = timed.client.inter_unit_gaps.clone();

        match &outcome {
            Ok(()) => tracing::debug!(
                request_id = %record.request_id,
                trace_id = %record.trace_id,
                units = timed.events.len(),
                "Request completed"
            ),
            Err(e) => tracing::warn!(
                request_id = %record.request_id,
                trace_id = %record.trace_id,
                kind = e.kind().as_str(),
                units = timed.events.len(),
                error = %e,
                "Request failed"
            ),
        }

        let outcome_label = match &outcome {
            Ok(()) => "success",
            Err(e) => e.kind().as_str(),
        };
        record.complete(timed, outcome.err(), ended.saturating_duration_since(run_start));
        guard.stats.record_outcome(record.success);
        metrics::record_completion(outcome_label, ttft, &gaps);

        if sink.send(record).is_err() {
            tracing::warn!("Record collector closed; dropping record");
        }
        drop(guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_tracks_in_flight() {
        let stats = Arc::new(DispatchStats::default());
        let a = stats.track();
        let b = stats.track();
        assert_eq!(stats.in_flight(), 2);
        assert_eq!(stats.dispatched(), 2);
        drop(a);
        assert_eq!(stats.in_flight(), 1);
        drop(b);
        assert_eq!(stats.in_flight(), 0);
        assert_eq!(stats.dispatched(), 2);
    }
}
