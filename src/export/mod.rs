//! Streaming export of search results to CSV
//!
//! A run is a small pipeline of tokio tasks:
//!
//! ```text
//! backend -> source -> [distributor queue] -> workers (N) -> [row queue] -> sink -> file
//! ```
//!
//! 1. **Source** (`source`): pages documents out of a [`DocumentCursor`] and
//!    pushes them, one at a time, onto the distributor queue.
//! 2. **Workers** (`transform`): decode each document and project the
//!    configured fields into a [`Row`]. Undecodable documents are skipped.
//! 3. **Sink** (`sink`): writes the header and then every row through a
//!    [`FormatWriter`], flushing each one and advancing the progress bar.
//!
//! The [`ExportCoordinator`] owns the cancellation token and treats the
//! source and workers as one group: the first error cancels every stage. It
//! waits for the sink as well before reporting, so a returned result always
//! describes a closed output file.
//!
//! Both queues are bounded. A slow output backs up into the workers and
//! then into the source, which stops fetching pages until there is room.
//!
//! [`DocumentCursor`]: crate::backend::DocumentCursor

mod channel;
pub mod coordinator;
pub mod progress;
pub mod record;
mod sink;
mod source;
mod transform;
pub mod writers;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{
    ExportCoordinator, ExportOptions, ExportResult, PipelineState, run_export,
};
pub use progress::ProgressTracker;
pub use record::{FieldList, Projector, Row};
pub use writers::{CsvEncoder, CsvWriter, FormatWriter};
