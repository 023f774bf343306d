//! Transformer workers: decode documents and project them into rows

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::channel::{self, Delivery, Received, SharedReceiver};
use super::record::{Projector, Row};
use crate::backend::RawDocument;
use crate::error::Result;

/// What one worker did before it stopped
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    /// Rows handed to the sink
    pub transformed: u64,
    /// Documents dropped because they did not decode
    pub skipped: u64,
}

/// Run one transformer worker until the document queue closes or the run
/// is cancelled
///
/// A document that fails to decode is logged and dropped; it never fails
/// the run.
pub async fn run_worker(
    id: usize,
    documents: SharedReceiver<RawDocument>,
    rows: mpsc::Sender<Row>,
    projector: Arc<Projector>,
    cancel: CancellationToken,
) -> Result<WorkerReport> {
    let mut report = WorkerReport::default();

    loop {
        let document = match documents.recv(&cancel).await {
            Received::Item(document) => document,
            Received::Closed => break,
            Received::Cancelled => {
                debug!(worker = id, "Worker cancelled");
                break;
            }
        };

        match projector.project_raw(&document) {
            Ok(row) => match channel::send(&rows, row, &cancel).await {
                Delivery::Sent => report.transformed += 1,
                Delivery::Cancelled | Delivery::Disconnected => break,
            },
            Err(e) => {
                warn!(worker = id, "Skipping document that failed to decode: {}", e);
                report.skipped += 1;
            }
        }

        if cancel.is_cancelled() {
            break;
        }
    }

    debug!(
        worker = id,
        "Worker finished: {} rows, {} skipped", report.transformed, report.skipped
    );
    Ok(report)
}
