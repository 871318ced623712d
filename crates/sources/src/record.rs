//! Raw records and acknowledgement handles

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

/// Receives committed offsets from acked records.
///
/// Implementations batch and persist as they see fit; `commit` must be
/// cheap and non-blocking, it runs on the pipeline's ack path.
pub trait Committer: Send + Sync {
    fn commit(&self, offset: u64);
}

/// One raw record flowing through the pipeline.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub data: Bytes,
    pub ack: AckHandle,
}

impl RawRecord {
    pub fn new(data: Bytes, ack: AckHandle) -> Self {
        Self { data, ack }
    }
}

struct AckShared {
    offset: u64,
    acked: AtomicBool,
    committer: Option<Arc<dyn Committer>>,
}

/// Commits progress past one record. Idempotent: the first `ack` wins,
/// later calls are no-ops.
#[derive(Clone)]
pub struct AckHandle {
    shared: Arc<AckShared>,
}

impl std::fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckHandle")
            .field("offset", &self.shared.offset)
            .field("acked", &self.is_acked())
            .finish()
    }
}

impl AckHandle {
    /// A handle that forwards its offset to `committer` on first ack.
    pub fn new(offset: u64, committer: Arc<dyn Committer>) -> Self {
        Self {
            shared: Arc::new(AckShared {
                offset,
                acked: AtomicBool::new(false),
                committer: Some(committer),
            }),
        }
    }

    /// A handle whose ack is accounting only (non-replayable transports).
    pub fn detached(offset: u64) -> Self {
        Self {
            shared: Arc::new(AckShared {
                offset,
                acked: AtomicBool::new(false),
                committer: None,
            }),
        }
    }

    /// Commit progress past this record. Safe to call more than once;
    /// only the first call reaches the committer.
    pub fn ack(&self) {
        if self.shared.acked.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(committer) = &self.shared.committer {
            committer.commit(self.shared.offset);
        }
    }

    pub fn is_acked(&self) -> bool {
        self.shared.acked.load(Ordering::Acquire)
    }

    pub fn offset(&self) -> u64 {
        self.shared.offset
    }
}
