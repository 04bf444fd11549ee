//! Benchmark pipeline wiring.
//!
//! # Data Flow
//! ```text
//! BenchConfig
//!     → workload (prompts → RequestSpecs)
//!     → Dispatcher ──records──▶ collector task
//!                                 ├─ success → Correlator::enrich (spawned per record)
//!                                 └─ failure → EnrichmentStatus::Skipped
//!     → records sorted by sequence → summarize → BenchmarkReport
//! ```
//!
//! # Design Decisions
//! - Enrichment starts as soon as a record is finalized, never blocking dispatch
//! - Configuration is validated before anything is dispatched

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::{validate_config, BenchConfig, ConfigError};
use crate::correlation::Correlator;
use crate::dispatch::{DispatchReport, DispatchSettings, Dispatcher};
use crate::inference::{HttpInferenceClient, InferenceBackend, RequestSpec};
use crate::lifecycle::{Shutdown, ShutdownListener};
use crate::results::record::{EnrichmentStatus, RequestRecord};
use crate::results::summary::{summarize, BenchmarkSummary};
use crate::workload::{build_specs, load_prompts, WorkloadError};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Workload(#[from] WorkloadError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub summary: BenchmarkSummary,
    /// Ordered by dispatch sequence.
    pub records: Vec<RequestRecord>,
}

pub struct BenchmarkRunner {
    config: BenchConfig,
    backend: Arc<dyn InferenceBackend>,
    correlator: Option<Arc<Correlator>>,
    specs: Vec<RequestSpec>,
}

impl BenchmarkRunner {
    /// Validate `config`, load the workload and build the HTTP clients.
    pub fn new(config: BenchConfig) -> Result<Self, RunnerError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let prompts = load_prompts(&config.workload)?;
        let specs = build_specs(&prompts, &config.sampling, config.target.model.as_deref());
        let backend = Arc::new(HttpInferenceClient::new(&config.target)?);
        let correlator = if config.span_store.enabled {
            Some(Arc::new(Correlator::from_config(&config.span_store)?))
        } else {
            None
        };

        tracing::info!(
            url = %backend.url(),
            prompts = specs.len(),
            span_store = config.span_store.enabled,
            "Benchmark prepared"
        );

        Ok(Self::with_parts(config, backend, correlator, specs))
    }

    /// Assemble a runner from pre-built parts.
    pub fn with_parts(
        config: BenchConfig,
        backend: Arc<dyn InferenceBackend>,
        correlator: Option<Arc<Correlator>>,
        specs: Vec<RequestSpec>,
    ) -> Self {
        Self {
            config,
            backend,
            correlator,
            specs,
        }
    }

    /// Run the benchmark to completion and summarize it.
    ///
    /// Prompts are reused round-robin when more requests than prompts are asked for.
    pub async fn run(&self, stop: ShutdownListener, cancel: Shutdown) -> BenchmarkReport {
        let dispatcher = Dispatcher::new(
            self.backend.clone(),
            DispatchSettings::from(&self.config.load),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let collector = tokio::spawn(collect(rx, self.correlator.clone()));

        let specs = self.specs.iter().cycle().cloned();
        let dispatch: DispatchReport = dispatcher.run(specs, stop, cancel, tx).await;

        let mut records = match collector.await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "Record collector failed");
                Vec::new()
            }
        };
        records.sort_by_key(|r| r.sequence);

        let summary = summarize(&records);
        tracing::info!(
            dispatched = dispatch.dispatched,
            successful = summary.successful_requests,
            failed = summary.failed_requests,
            enriched = summary.enriched_requests,
            "Benchmark finished"
        );

        BenchmarkReport { summary, records }
    }
}

/// Receive finalized records and enrich the successful ones as they arrive.
async fn collect(
    mut rx: mpsc::UnboundedReceiver<RequestRecord>,
    correlator: Option<Arc<Correlator>>,
) -> Vec<RequestRecord> {
    let mut records = Vec::new();
    let mut enrichments = JoinSet::new();

    while let Some(mut record) = rx.recv().await {
        match &correlator {
            Some(correlator) if record.success => {
                let correlator = correlator.clone();
                enrichments.spawn(async move { correlator.enrich(record).await });
            }
            Some(_) => {
                record.enrichment = EnrichmentStatus::Skipped;
                records.push(record);
            }
            None => records.push(record),
        }
    }

    while let Some(joined) = enrichments.join_next().await {
        match joined {
            Ok(record) => records.push(record),
            Err(e) => tracing::error!(error = %e, "Enrichment task failed"),
        }
    }
    records
}
