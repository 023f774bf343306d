//! Export coordinator for orchestrating export runs
//!
//! The coordinator connects to the backend and counts the matching documents,
//! then wires the source, the transformer workers and the sink together with
//! two bounded queues and one cancellation token, and waits for all of them
//! before reporting.
//!
//! A run ends in one of three ways besides success: `Aborted` when a
//! precondition (options, connection, count) fails before anything streams,
//! `Failed` when a stage fails mid-stream, and `Cancelled` when the root
//! token fires.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::channel::SharedReceiver;
use super::progress::ProgressTracker;
use super::record::{FieldList, Projector};
use super::sink::run_sink;
use super::source::{SourceReport, run_source};
use super::transform::{WorkerReport, run_worker};
use super::writers::{CsvWriter, FormatWriter};
use crate::backend::{self, QuerySpec, ScrollRequest, SearchBackend};
use crate::config::{BackendConfig, Config};
use crate::error::{ConfigError, ExportError, PipelineError, Result};

/// Result of an export run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    /// Rows written to the output
    pub documents_exported: u64,
    /// Documents dropped because they did not decode
    pub documents_skipped: u64,
    /// Documents read from the backend
    pub documents_fetched: u64,
    /// Match count reported by the backend before streaming
    pub total_estimate: u64,
    /// Output size in bytes, header included
    pub file_size_bytes: u64,
    /// Time taken for the run
    pub elapsed_ms: u64,
}

/// Where a run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Connecting,
    Counting,
    Streaming,
    Completed,
    /// Stopped by the root token
    Cancelled,
    /// A precondition failed; nothing was streamed
    Aborted,
    /// A stage failed while streaming
    Failed,
}

/// Tunables for one run
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub fields: FieldList,
    pub workers: usize,
    pub row_buffer: usize,
    pub distributor_buffer: usize,
    pub page_size: u32,
    pub placeholder: String,
    pub show_progress: bool,
}

impl ExportOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fields: FieldList::new(config.export.fields.clone()),
            workers: config.export.workers,
            row_buffer: config.export.row_buffer,
            distributor_buffer: config.export.distributor_buffer,
            page_size: config.backend.page_size,
            placeholder: config.export.placeholder.clone(),
            show_progress: config.export.progress,
        }
    }

    /// Reject values the pipeline cannot run with
    ///
    /// Zero-capacity queues cannot be built, and zero workers would drain
    /// nothing while still reporting success.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(ConfigError::MissingField("export.fields".to_string()).into());
        }

        let positive = [
            ("export.workers", self.workers),
            ("export.row_buffer", self.row_buffer),
            ("export.distributor_buffer", self.distributor_buffer),
            ("backend.page_size", self.page_size as usize),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: "0".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Report returned by a member of the source/worker group
#[derive(Debug)]
enum StageReport {
    Source(SourceReport),
    Worker(WorkerReport),
}

/// Backend of a run, connected on first use when built from configuration
enum BackendSlot {
    Pending(BackendConfig),
    Ready(Arc<dyn SearchBackend>),
}

/// Coordinator for export runs
pub struct ExportCoordinator {
    backend: BackendSlot,
    query: QuerySpec,
    index: String,
    options: ExportOptions,
    /// Root token; the run derives its own child from it
    cancel_token: Option<CancellationToken>,
    state: PipelineState,
}

impl ExportCoordinator {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        query: QuerySpec,
        index: impl Into<String>,
        options: ExportOptions,
    ) -> Self {
        Self {
            backend: BackendSlot::Ready(backend),
            query,
            index: index.into(),
            options,
            cancel_token: None,
            state: PipelineState::Idle,
        }
    }

    /// Build a coordinator that connects to `config.backend` when executed
    ///
    /// The query is resolved here, so a malformed raw query fails before any
    /// connection is attempted.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let query = QuerySpec::resolve(config.query.raw.as_deref(), config.query.text.as_deref())?;

        Ok(Self {
            backend: BackendSlot::Pending(config.backend.clone()),
            query,
            index: config.backend.index.clone(),
            options: ExportOptions::from_config(config),
            cancel_token: None,
            state: PipelineState::Idle,
        })
    }

    /// Set the root cancellation token (typically tied to Ctrl+C)
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Execute the export run
    ///
    /// 1. Check options, connect if needed, count matching documents; a
    ///    failure here aborts before anything streams
    /// 2. Start the sink, then the source and workers as one group
    /// 3. Wait for the group; the first error cancels everything else
    /// 4. Wait for the sink to drain and close the output
    ///
    /// # Returns
    /// * `Result<ExportResult>` - Run statistics, or the first fatal error
    pub async fn execute(&mut self, writer: Box<dyn FormatWriter>) -> Result<ExportResult> {
        let start_time = Instant::now();

        if let Err(e) = self.options.validate() {
            self.state = PipelineState::Aborted;
            return Err(e);
        }

        let backend = match &self.backend {
            BackendSlot::Ready(backend) => Arc::clone(backend),
            BackendSlot::Pending(config) => {
                self.state = PipelineState::Connecting;
                match backend::connect(config).await {
                    Ok(backend) => backend,
                    Err(e) => {
                        self.state = PipelineState::Aborted;
                        return Err(e);
                    }
                }
            }
        };
        self.backend = BackendSlot::Ready(Arc::clone(&backend));

        self.state = PipelineState::Counting;
        let total = match backend.count(&self.query, &self.index).await {
            Ok(total) => total,
            Err(e) => {
                self.state = PipelineState::Aborted;
                return Err(e);
            }
        };
        info!("{} documents match in {}", total, self.index);

        self.state = PipelineState::Streaming;
        let root = self.cancel_token.clone().unwrap_or_default();
        let cancel = root.child_token();

        let fields = self.options.fields.clone();
        let tracker = ProgressTracker::new(Some(total), self.options.show_progress);
        let (doc_tx, doc_rx) = mpsc::channel(self.options.distributor_buffer);
        let (row_tx, row_rx) = mpsc::channel(self.options.row_buffer);

        let sink = tokio::spawn(run_sink(
            row_rx,
            writer,
            fields.clone(),
            tracker,
            cancel.clone(),
        ));

        let mut group = JoinSet::new();

        let request = ScrollRequest {
            query: self.query.clone(),
            index: self.index.clone(),
            page_size: self.options.page_size,
            fields: Some(fields.names().to_vec()),
        };
        group.spawn({
            let backend = Arc::clone(&backend);
            let cancel = cancel.clone();
            async move {
                run_source(backend, request, doc_tx, cancel)
                    .await
                    .map(StageReport::Source)
            }
        });

        let documents = SharedReceiver::new(doc_rx);
        let projector = Arc::new(Projector::new(fields, self.options.placeholder.clone()));
        for id in 0..self.options.workers {
            let worker = run_worker(
                id,
                documents.clone(),
                row_tx.clone(),
                Arc::clone(&projector),
                cancel.clone(),
            );
            group.spawn(async move { worker.await.map(StageReport::Worker) });
        }
        // Only the workers may hold these, so the queues close when they finish
        drop(documents);
        drop(row_tx);
        debug!("Started source and {} workers", self.options.workers);

        let mut first_error: Option<ExportError> = None;
        let mut fetched = 0u64;
        let mut skipped = 0u64;

        while let Some(joined) = group.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(PipelineError::StageFailed(e.to_string()).into()),
            };
            match outcome {
                Ok(StageReport::Source(report)) => fetched = report.documents,
                Ok(StageReport::Worker(report)) => skipped += report.skipped,
                Err(e) if first_error.is_none() => {
                    error!("Export stage failed: {}", e);
                    cancel.cancel();
                    first_error = Some(e);
                }
                Err(e) => debug!("Ignoring error after cancellation: {}", e),
            }
        }

        let sink_result = match sink.await {
            Ok(result) => result,
            Err(e) => Err(PipelineError::StageFailed(e.to_string()).into()),
        };

        if let Some(e) = first_error {
            self.state = PipelineState::Failed;
            return Err(e);
        }
        let sink_report = match sink_result {
            Ok(report) => report,
            Err(e) => {
                self.state = PipelineState::Failed;
                return Err(e);
            }
        };
        if root.is_cancelled() {
            info!(
                "Export cancelled after {} rows",
                sink_report.rows_written
            );
            self.state = PipelineState::Cancelled;
            return Err(PipelineError::Cancelled.into());
        }

        self.state = PipelineState::Completed;
        let result = ExportResult {
            documents_exported: sink_report.rows_written,
            documents_skipped: skipped,
            documents_fetched: fetched,
            total_estimate: total,
            file_size_bytes: sink_report.bytes_written,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        };
        info!(
            "Export completed: {} rows, {} skipped, {} bytes, {} ms",
            result.documents_exported,
            result.documents_skipped,
            result.file_size_bytes,
            result.elapsed_ms
        );
        Ok(result)
    }
}

/// Run a complete export described by `config`
///
/// Resolves the query, creates the output file and executes the pipeline
/// under `cancel`; connecting to the backend is the pipeline's first step.
pub async fn run_export(config: &Config, cancel: CancellationToken) -> Result<ExportResult> {
    let mut coordinator = ExportCoordinator::from_config(config)?.with_cancellation(cancel);

    let writer = CsvWriter::create(&config.export.outfile, config.export.delimiter).await?;
    info!("Writing to {}", config.export.outfile.display());

    coordinator.execute(Box::new(writer)).await
}
