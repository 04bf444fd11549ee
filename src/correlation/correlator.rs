//! Best-effort enrichment of finalized records with server span data.
//!
//! # Responsibilities
//! - Poll the span store by trace id until the request's span shows up
//! - Back off exponentially between lookups, within a fixed deadline
//! - Attach server metrics at most once per record
//!
//! # Design Decisions
//! - Spans are ingested asynchronously, so "not found" is retried, not failed
//! - A missing trace after the deadline is a status (`Unavailable`), not an error
//! - Every record's deadline starts when its enrichment starts; records never
//!   queue behind each other for a whole polling loop
//! - A semaphore bounds concurrent in-flight lookups across all records

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout_at, Instant};

use crate::config::SpanStoreConfig;
use crate::correlation::attributes::extract_server_metrics;
use crate::correlation::store::{JaegerSpanStore, SpanStore, SpanStoreError, Trace};
use crate::observability::metrics;
use crate::resilience::Backoff;
use crate::results::record::{EnrichmentStatus, RequestRecord};

/// Enrichment parameters.
#[derive(Debug, Clone)]
pub struct CorrelatorSettings {
    pub operation_name: String,
    /// Total time allowed to find one record's span.
    pub timeout: Duration,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub concurrency: usize,
}

impl From<&SpanStoreConfig> for CorrelatorSettings {
    fn from(config: &SpanStoreConfig) -> Self {
        Self {
            operation_name: config.operation_name.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            concurrency: config.concurrency.max(1),
        }
    }
}

pub struct Correlator {
    store: Arc<dyn SpanStore>,
    settings: CorrelatorSettings,
    permits: Arc<Semaphore>,
}

impl Correlator {
    pub fn new(store: Arc<dyn SpanStore>, settings: CorrelatorSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.concurrency.max(1)));
        Self {
            store,
            settings,
            permits,
        }
    }

    /// Correlator backed by the Jaeger query API.
    pub fn from_config(config: &SpanStoreConfig) -> Result<Self, reqwest::Error> {
        let settings = CorrelatorSettings::from(config);
        let store = JaegerSpanStore::new(&config.base_url, settings.timeout)?;
        Ok(Self::new(Arc::new(store), settings))
    }

    /// Attach server metrics to `record` if its span can be found in time.
    ///
    /// A record that already carries server metrics is returned unchanged.
    pub async fn enrich(&self, mut record: RequestRecord) -> RequestRecord {
        if record.server.is_some() {
            return record;
        }

        let trace_id = record.trace.trace_id_hex();
        let deadline = Instant::now() + self.settings.timeout;
        let mut backoff = Backoff::new(self.settings.initial_backoff_ms, self.settings.max_backoff_ms);
        let mut attempts = 0u32;
        record.trace_url = self.store.trace_url(&trace_id);

        loop {
            attempts += 1;
            match timeout_at(deadline, self.lookup(&trace_id)).await {
                Err(_) => break,
                Ok(Ok(Some(trace))) => {
                    if let Some(server) = extract_server_metrics(&trace, &self.settings.operation_name) {
                        record.attach_server_metrics(server, attempts);
                        tracing::debug!(
                            request_id = %record.request_id,
                            trace_id = %trace_id,
                            attempts,
                            "Server metrics attached"
                        );
                        metrics::record_enrichment(record.enrichment.as_str());
                        return record;
                    }
                    tracing::trace!(trace_id = %trace_id, "Trace found without the request span yet");
                }
                Ok(Ok(None)) => {
                    tracing::trace!(trace_id = %trace_id, attempts, "Trace not ingested yet");
                }
                Ok(Err(e)) => {
                    tracing::debug!(trace_id = %trace_id, attempts, error = %e, "Span store lookup failed");
                }
            }

            let delay = backoff.next_delay();
            if Instant::now() + delay >= deadline {
                break;
            }
            sleep(delay).await;
        }

        tracing::debug!(
            request_id = %record.request_id,
            trace_id = %trace_id,
            attempts,
            "Server metrics unavailable before deadline"
        );
        record.enrichment = EnrichmentStatus::Unavailable { attempts };
        metrics::record_enrichment(record.enrichment.as_str());
        record
    }

    /// One lookup, holding a permit only while the request is outstanding.
    async fn lookup(&self, trace_id: &str) -> Result<Option<Trace>, SpanStoreError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| SpanStoreError::Transport(e.to_string()))?;
        self.store.fetch_trace(trace_id).await
    }

    /// Enrich many records concurrently. Output order matches input order.
    pub async fn enrich_all(&self, records: Vec<RequestRecord>) -> Vec<RequestRecord> {
        join_all(records.into_iter().map(|record| self.enrich(record))).await
    }
}
