//! Open-loop, rate-controlled request dispatcher.
//!
//! # Responsibilities
//! - Issue request `i` at `start + i / rate`, regardless of earlier requests
//! - Spawn one independent task per request and never wait on it while dispatching
//! - Stop scheduling on the stop signal or when the duration limit is reached
//! - Give in-flight requests a grace period, then cancel them
//!
//! # Design Decisions
//! - Dispatch instants come from the schedule, not from the previous dispatch,
//!   so a late wake-up never shifts later requests
//! - Counters are atomics; the dispatcher holds no lock across an await

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::config::LoadConfig;
use crate::correlation::context::TraceContext;
use crate::dispatch::rate::TargetRate;
use crate::dispatch::task::{DispatchStats, RequestTask};
use crate::inference::{InferenceBackend, RequestSpec};
use crate::lifecycle::{Shutdown, ShutdownListener};
use crate::results::record::RequestRecord;

/// Load parameters for one run.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub rate: TargetRate,
    /// `None` dispatches until stopped or until `max_duration`.
    pub request_count: Option<u64>,
    pub max_duration: Option<Duration>,
    pub request_timeout: Duration,
    pub grace_period: Duration,
    /// `None` disables progress logging.
    pub progress_interval: Option<Duration>,
}

impl From<&LoadConfig> for DispatchSettings {
    fn from(config: &LoadConfig) -> Self {
        Self {
            rate: config.rate,
            request_count: config.request_count,
            max_duration: config.max_duration_secs.map(Duration::from_secs),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            grace_period: Duration::from_millis(config.grace_period_ms),
            progress_interval: (config.progress_interval_secs > 0)
                .then(|| Duration::from_secs(config.progress_interval_secs)),
        }
    }
}

/// Why dispatching ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `request_count` requests were dispatched.
    CountReached,
    /// The request source ran dry.
    WorkloadExhausted,
    /// The stop signal fired.
    Stopped,
    /// `max_duration` elapsed.
    DurationElapsed,
    /// The next slot lies beyond what the clock can represent.
    ScheduleExhausted,
}

/// Outcome of [`Dispatcher::run`].
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub dispatched: u64,
    pub stop_reason: StopReason,
    /// In-flight requests were cancelled after the grace period.
    pub cancelled_in_flight: bool,
    /// First dispatch to the last task finishing.
    pub elapsed: Duration,
}

pub struct Dispatcher {
    backend: Arc<dyn InferenceBackend>,
    settings: DispatchSettings,
    stats: Arc<DispatchStats>,
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn log_join_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!(error = %e, "Request task panicked");
        }
    }
}

fn spawn_progress(stats: Arc<DispatchStats>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            tracing::info!(
                dispatched = stats.dispatched(),
                in_flight = stats.in_flight(),
                succeeded = stats.succeeded(),
                failed = stats.failed(),
                "Progress"
            );
        }
    })
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn InferenceBackend>, settings: DispatchSettings) -> Self {
        Self {
            backend,
            settings,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Dispatch `specs` on the schedule and wait for every task to finish.
    ///
    /// Each finalized record is sent to `sink` by its own task. `stop` ends
    /// scheduling; `cancel` is triggered when the grace period runs out and
    /// may also be triggered by the caller to abort in-flight requests at once.
    pub async fn run<I>(
        &self,
        specs: I,
        mut stop: ShutdownListener,
        cancel: Shutdown,
        sink: UnboundedSender<RequestRecord>,
    ) -> DispatchReport
    where
        I: IntoIterator<Item = RequestSpec>,
    {
        let settings = &self.settings;
        let start = Instant::now();
        let duration_limit = settings.max_duration.and_then(|d| start.checked_add(d));
        let progress = settings
            .progress_interval
            .map(|every| spawn_progress(self.stats.clone(), every));

        tracing::info!(
            rate = %settings.rate,
            request_count = ?settings.request_count,
            max_duration_secs = ?settings.max_duration.map(|d| d.as_secs()),
            "Dispatch started"
        );

        let mut specs = specs.into_iter();
        let mut tasks = JoinSet::new();
        let mut index: u64 = 0;

        let stop_reason = loop {
            if settings.request_count.is_some_and(|n| index >= n) {
                break StopReason::CountReached;
            }
            if stop.is_triggered() {
                break StopReason::Stopped;
            }

            let scheduled = settings.rate.offset(index).and_then(|offset| start.checked_add(offset));
            let Some(scheduled) = scheduled else {
                if let Some(limit) = duration_limit {
                    tokio::select! {
                        biased;
                        _ = stop.recv() => break StopReason::Stopped,
                        _ = sleep_until(limit) => break StopReason::DurationElapsed,
                    }
                }
                tracing::warn!(
                    sequence = index,
                    rate = %settings.rate,
                    "Next dispatch slot is out of clock range, scheduling ends"
                );
                break StopReason::ScheduleExhausted;
            };
            if let Some(limit) = duration_limit.filter(|limit| scheduled >= *limit) {
                // Next slot is outside the window; sit out the rest of it.
                tokio::select! {
                    biased;
                    _ = stop.recv() => break StopReason::Stopped,
                    _ = sleep_until(limit) => break StopReason::DurationElapsed,
                }
            }
            if scheduled > Instant::now() {
                tokio::select! {
                    biased;
                    _ = stop.recv() => break StopReason::Stopped,
                    _ = sleep_until(scheduled) => {}
                }
            } else {
                tokio::task::yield_now().await;
                if stop.is_triggered() {
                    break StopReason::Stopped;
                }
            }

            let Some(spec) = specs.next() else {
                break StopReason::WorkloadExhausted;
            };

            let dispatched_at = Instant::now();
            let record = RequestRecord::dispatched(
                Uuid::new_v4(),
                index,
                TraceContext::new(),
                &spec,
                dispatched_at.saturating_duration_since(start),
                unix_ms(),
            );
            tracing::debug!(
                sequence = index,
                request_id = %record.request_id,
                trace_id = %record.trace_id,
                "Request dispatched"
            );

            let task = RequestTask {
                backend: self.backend.clone(),
                spec,
                record,
                run_start: start,
                dispatched_at,
                timeout: settings.request_timeout,
                cancel: cancel.subscribe(),
                sink: sink.clone(),
                guard: self.stats.track(),
            };
            tasks.spawn(task.run());
            index += 1;

            while let Some(result) = tasks.try_join_next() {
                log_join_result(result);
            }
        };
        drop(sink);

        tracing::info!(
            dispatched = index,
            in_flight = tasks.len(),
            reason = ?stop_reason,
            "Dispatch finished, draining in-flight requests"
        );

        let mut grace_deadline = match stop_reason {
            StopReason::Stopped | StopReason::DurationElapsed => {
                Some(Instant::now() + settings.grace_period)
            }
            _ => None,
        };
        let mut cancelled_in_flight = false;

        loop {
            tokio::select! {
                biased;
                joined = tasks.join_next() => match joined {
                    Some(result) => log_join_result(result),
                    None => break,
                },
                _ = stop.recv(), if grace_deadline.is_none() => {
                    grace_deadline = Some(Instant::now() + settings.grace_period);
                }
                _ = sleep_until_opt(grace_deadline), if !cancelled_in_flight => {
                    tracing::warn!(in_flight = tasks.len(), "Grace period over, cancelling in-flight requests");
                    cancelled_in_flight = true;
                    cancel.trigger();
                }
            }
        }

        if let Some(handle) = progress {
            handle.abort();
        }

        let elapsed = start.elapsed();
        tracing::info!(
            dispatched = index,
            succeeded = self.stats.succeeded(),
            failed = self.stats.failed(),
            elapsed_ms = elapsed.as_millis() as u64,
            "All requests finished"
        );

        DispatchReport {
            dispatched: index,
            stop_reason,
            cancelled_in_flight,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{OutboundRequest, RequestError, SamplingParams};
    use crate::results::record::FailureKind;
    use crate::stream::sse::{FrameStream, SseFrame, StreamChunk};
    use futures_util::future::BoxFuture;
    use futures_util::stream::{self, StreamExt};
    use tokio::sync::mpsc;

    /// Streams `units` content frames, `unit_delay` apart, then `[DONE]`.
    struct FakeBackend {
        units: usize,
        unit_delay: Duration,
        /// Never send `[DONE]`; hang after the last unit.
        hang: bool,
    }

    impl FakeBackend {
        fn new(units: usize, unit_delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                units,
                unit_delay: Duration::from_millis(unit_delay_ms),
                hang: false,
            })
        }

        fn hanging(units: usize, unit_delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                units,
                unit_delay: Duration::from_millis(unit_delay_ms),
                hang: true,
            })
        }
    }

    impl InferenceBackend for FakeBackend {
        fn open_stream<'a>(
            &'a self,
            _request: OutboundRequest<'a>,
        ) -> BoxFuture<'a, Result<FrameStream, RequestError>> {
            let delay = self.unit_delay;
            let mut frames: Vec<Result<SseFrame, RequestError>> = (0..self.units)
                .map(|i| {
                    Ok(SseFrame::Chunk(StreamChunk {
                        content: format!("t{} ", i),
                        ..Default::default()
                    }))
                })
                .collect();
            let hang = self.hang;
            if !hang {
                frames.push(Ok(SseFrame::Done));
            }
            Box::pin(async move {
                let body = stream::iter(frames)
                    .then(move |frame| async move {
                        tokio::time::sleep(delay).await;
                        frame
                    })
                    .chain(stream::once(async move {
                        if hang {
                            std::future::pending::<()>().await;
                        }
                        Err(RequestError::Truncated)
                    }));
                Ok(body.boxed())
            })
        }
    }

    fn settings(rate: TargetRate, count: Option<u64>) -> DispatchSettings {
        DispatchSettings {
            rate,
            request_count: count,
            max_duration: None,
            request_timeout: Duration::from_secs(60),
            grace_period: Duration::from_secs(5),
            progress_interval: None,
        }
    }

    fn specs() -> impl Iterator<Item = RequestSpec> {
        std::iter::repeat(RequestSpec::user_prompt("p", SamplingParams::default(), None))
    }

    async fn run(
        backend: Arc<dyn InferenceBackend>,
        settings: DispatchSettings,
        stop: &Shutdown,
    ) -> (DispatchReport, Vec<RequestRecord>) {
        let dispatcher = Dispatcher::new(backend, settings);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let report = dispatcher.run(specs(), stop.subscribe(), Shutdown::new(), tx).await;
        let mut records = Vec::new();
        while let Some(record) = rx.recv().await {
            records.push(record);
        }
        records.sort_by_key(|r| r.sequence);
        (report, records)
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_offsets_follow_schedule() {
        // Each request takes 1s, far longer than the 100ms interval.
        let backend = FakeBackend::new(2, 500);
        let (report, records) =
            run(backend, settings(TargetRate::PerSecond(10.0), Some(8)), &Shutdown::new()).await;

        assert_eq!(report.dispatched, 8);
        assert_eq!(report.stop_reason, StopReason::CountReached);
        assert_eq!(records.len(), 8);
        for (i, record) in records.iter().enumerate() {
            let expected = Duration::from_millis(100 * i as u64);
            let drift = record.dispatch_offset.abs_diff(expected);
            assert!(drift <= Duration::from_millis(1), "request {} drifted {:?}", i, drift);
            assert!(record.success);
            assert_eq!(record.events.len(), 2);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_requests_returns_immediately() {
        let backend = FakeBackend::new(1, 10);
        let start = Instant::now();
        let (report, records) =
            run(backend, settings(TargetRate::PerSecond(1.0), Some(0)), &Shutdown::new()).await;
        assert_eq!(report.dispatched, 0);
        assert!(records.is_empty());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_dispatches_back_to_back() {
        let backend = FakeBackend::new(1, 50);
        let (report, records) =
            run(backend, settings(TargetRate::Unlimited, Some(5)), &Shutdown::new()).await;
        assert_eq!(report.dispatched, 5);
        assert!(records.iter().all(|r| r.dispatch_offset == Duration::ZERO));
        assert!(records.iter().all(|r| r.success));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_dispatch_after_stop() {
        let backend = FakeBackend::new(1, 50);
        let stop = Shutdown::new();
        let trigger = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            trigger.trigger();
        });

        let (report, records) =
            run(backend, settings(TargetRate::PerSecond(10.0), None), &stop).await;
        assert_eq!(report.stop_reason, StopReason::Stopped);
        assert_eq!(report.dispatched, 4);
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.success));
        assert!(!report.cancelled_in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_cancelled_after_grace() {
        let backend = FakeBackend::hanging(1, 10);
        let mut cfg = settings(TargetRate::PerSecond(10.0), None);
        cfg.grace_period = Duration::from_millis(500);
        let stop = Shutdown::new();
        let trigger = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.trigger();
        });

        let start = Instant::now();
        let (report, records) = run(backend, cfg, &stop).await;
        assert!(report.cancelled_in_flight);
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.failure_kind(), Some(FailureKind::Cancelled));
            assert_eq!(record.events.len(), 1);
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(650));
        assert!(elapsed < Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_keeps_partial_events() {
        let backend = FakeBackend::hanging(2, 100);
        let mut cfg = settings(TargetRate::Unlimited, Some(1));
        cfg.request_timeout = Duration::from_millis(300);

        let (_, records) = run(backend, cfg, &Shutdown::new()).await;
        let record = &records[0];
        assert_eq!(record.failure_kind(), Some(FailureKind::Timeout));
        assert_eq!(record.events.len(), 2);
        assert_eq!(record.client.e2e_latency, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_duration_stops_dispatch() {
        let backend = FakeBackend::new(1, 10);
        let mut cfg = settings(TargetRate::PerSecond(4.0), None);
        cfg.max_duration = Some(Duration::from_secs(1));

        let (report, records) = run(backend, cfg, &Shutdown::new()).await;
        assert_eq!(report.stop_reason, StopReason::DurationElapsed);
        // 0, 250, 500 and 750 ms fit inside the window.
        assert_eq!(report.dispatched, 4);
        assert_eq!(records.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_out_of_clock_range_ends_scheduling() {
        let backend = FakeBackend::new(1, 10);
        let (report, records) =
            run(backend, settings(TargetRate::PerSecond(1e-20), Some(2)), &Shutdown::new()).await;
        assert_eq!(report.stop_reason, StopReason::ScheduleExhausted);
        assert_eq!(report.dispatched, 1);
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert!(!report.cancelled_in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_out_of_clock_range_waits_out_duration() {
        let backend = FakeBackend::new(1, 10);
        let mut cfg = settings(TargetRate::PerSecond(1e-20), None);
        cfg.max_duration = Some(Duration::from_secs(2));

        let start = Instant::now();
        let (report, _) = run(backend, cfg, &Shutdown::new()).await;
        assert_eq!(report.stop_reason, StopReason::DurationElapsed);
        assert_eq!(report.dispatched, 1);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
