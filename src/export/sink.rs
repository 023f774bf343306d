//! Sink stage: the only writer of the output file

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::progress::ProgressTracker;
use super::record::{FieldList, Row};
use super::writers::FormatWriter;
use crate::error::{PipelineError, Result};

/// What the sink wrote before it stopped
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SinkReport {
    pub rows_written: u64,
    pub bytes_written: u64,
}

/// Write the header, then every row that arrives until the row queue closes
///
/// The sink stops on queue closure, not on cancellation: once the other
/// stages stop producing, their senders drop and the sink drains what is
/// already queued. A write failure ends the run: the token is cancelled so
/// the producers stop, and the error is returned.
pub async fn run_sink(
    mut rows: mpsc::Receiver<Row>,
    mut writer: Box<dyn FormatWriter>,
    fields: FieldList,
    tracker: ProgressTracker,
    cancel: CancellationToken,
) -> Result<SinkReport> {
    let result = drain(&mut rows, writer.as_mut(), &fields, &tracker).await;
    tracker.finish();

    match result {
        Ok(rows_written) => {
            let report = SinkReport {
                rows_written,
                bytes_written: writer.bytes_written(),
            };
            debug!(
                "Sink finished: {} rows, {} bytes",
                report.rows_written, report.bytes_written
            );
            Ok(report)
        }
        Err(e) => {
            error!("Failed writing output after {} rows: {}", tracker.processed(), e);
            cancel.cancel();
            // Refuse further rows so no worker parks on a full queue
            rows.close();
            Err(PipelineError::SinkFailed(e).into())
        }
    }
}

async fn drain(
    rows: &mut mpsc::Receiver<Row>,
    writer: &mut dyn FormatWriter,
    fields: &FieldList,
    tracker: &ProgressTracker,
) -> std::io::Result<u64> {
    writer.write_header(fields).await?;

    let mut written = 0u64;
    while let Some(row) = rows.recv().await {
        writer.write_row(&row).await?;
        written += 1;
        tracker.increment();
    }

    writer.finalize().await?;
    Ok(written)
}
