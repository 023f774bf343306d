//! Source stage: pages documents out of the backend into the distributor queue

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::channel::{self, Delivery};
use crate::backend::{DocumentCursor, RawDocument, ScrollRequest, SearchBackend};
use crate::error::Result;

/// What the source stage did before it stopped
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SourceReport {
    /// Pages fetched from the backend
    pub pages: u64,
    /// Documents handed to the workers
    pub documents: u64,
}

/// Stream every matching document into `documents`
///
/// The queue is closed when this returns, whichever way it returns, which is
/// how the workers learn the stream has ended. A fetch error ends the stage
/// for good and is returned to the supervisor; cancellation is not an error.
pub async fn run_source(
    backend: Arc<dyn SearchBackend>,
    request: ScrollRequest,
    documents: mpsc::Sender<RawDocument>,
    cancel: CancellationToken,
) -> Result<SourceReport> {
    let mut cursor = backend.open(&request).await?;
    debug!("Opened {} cursor on {}", backend.name(), request.index);

    let result = pump(cursor.as_mut(), &documents, &cancel).await;
    drop(documents);

    if let Err(e) = cursor.close().await {
        warn!("Failed to close {} cursor: {}", backend.name(), e);
    }

    if let Ok(report) = &result {
        debug!(
            "Source finished: {} documents in {} pages",
            report.documents, report.pages
        );
    }
    result
}

async fn pump(
    cursor: &mut dyn DocumentCursor,
    documents: &mpsc::Sender<RawDocument>,
    cancel: &CancellationToken,
) -> Result<SourceReport> {
    let mut report = SourceReport::default();

    loop {
        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Source cancelled after {} pages", report.pages);
                return Ok(report);
            }
            page = cursor.next_page() => page?,
        };

        let Some(page) = page else {
            return Ok(report);
        };
        report.pages += 1;

        for document in page {
            match channel::send(documents, document, cancel).await {
                Delivery::Sent => report.documents += 1,
                Delivery::Cancelled => {
                    debug!("Source cancelled while dispatching page {}", report.pages);
                    return Ok(report);
                }
                Delivery::Disconnected => {
                    debug!("All workers stopped; source ending early");
                    return Ok(report);
                }
            }
        }
    }
}
