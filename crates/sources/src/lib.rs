//! Sluice - Sources
//!
//! A source pulls raw records from an upstream stream and pushes them into
//! the pipeline channel, each paired with an [`AckHandle`]. Calling
//! `ack()` commits progress past that record; a source that supports
//! replay (the file source) will not re-deliver acked records across
//! restarts. `ack()` is idempotent and fire-and-forget.
//!
//! Sources:
//!
//! - [`FileSource`] - replayable framed log with batched offset
//!   checkpointing; the at-least-once reference implementation
//! - [`TcpSource`] - framed records from inbound connections; the
//!   transport has no replay, so acks only account
//! - [`StdinSource`] - framed records from standard input
//! - [`ChannelSource`] - in-memory source for tests, with inspectable acks

mod channel;
mod checkpoint;
mod error;
mod file;
mod record;
mod stdin;
mod tcp;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use channel::{AckLog, ChannelSource};
pub use checkpoint::{Checkpointer, CheckpointerHandle};
pub use error::SourceError;
pub use file::FileSource;
pub use record::{AckHandle, Committer, RawRecord};
pub use stdin::StdinSource;
pub use tcp::TcpSource;

/// Produces the pipeline's raw record stream.
///
/// `run` pushes records into `tx` until the upstream cursor closes, the
/// channel's consumer goes away, or `cancel` fires. Returning `Ok` means
/// the stream ended cleanly (end of input or cancellation); an error
/// means the source is unrecoverable and the pipeline must stop.
#[async_trait]
pub trait RecordSource: Send {
    async fn run(
        self: Box<Self>,
        tx: mpsc::Sender<RawRecord>,
        cancel: CancellationToken,
    ) -> Result<(), SourceError>;

    /// Source kind for logs.
    fn name(&self) -> &'static str;
}
