//! Offset checkpointing
//!
//! The checkpointer turns per-record acks into batched offset commits: it
//! tracks the highest acked offset and persists it when either
//! `max_batch_size` acks have accumulated or `max_batch_wait` has passed
//! with commits pending. The checkpoint file is written via temp-and-
//! rename so a crash never leaves a torn checkpoint.
//!
//! Acks may arrive out of order (unordered enrich mode); the persisted
//! cursor is the maximum offset seen, which matches "progress up to this
//! record" semantics.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sluice_config::CheckpointSettings;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{Committer, SourceError};

/// Committer half handed to ack handles.
pub struct Checkpointer {
    tx: mpsc::UnboundedSender<u64>,
}

impl Committer for Checkpointer {
    fn commit(&self, offset: u64) {
        // Fire-and-forget; a closed worker means shutdown is already
        // flushing.
        let _ = self.tx.send(offset);
    }
}

/// Owning handle for the checkpoint worker task.
pub struct CheckpointerHandle {
    worker: JoinHandle<()>,
}

impl CheckpointerHandle {
    /// Wait for the worker to write its final checkpoint. The worker
    /// exits once every [`Checkpointer`] clone is gone.
    pub async fn drain(self) {
        if let Err(e) = self.worker.await {
            warn!(error = %e, "checkpoint worker panicked");
        }
    }
}

/// Read a previously committed offset.
pub fn load_checkpoint(path: &Path) -> Result<Option<u64>, SourceError> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let offset = text
                .trim()
                .parse::<u64>()
                .map_err(|_| SourceError::Checkpoint {
                    path: path.display().to_string(),
                    reason: format!("not a valid offset: {:?}", text.trim()),
                })?;
            Ok(Some(offset))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SourceError::Checkpoint {
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Spawn the checkpoint worker for `path`.
pub fn spawn_checkpointer(
    path: PathBuf,
    settings: CheckpointSettings,
) -> (Arc<Checkpointer>, CheckpointerHandle) {
    let (tx, rx) = mpsc::unbounded_channel();

    let worker = tokio::spawn(checkpoint_worker(path, settings, rx));

    (
        Arc::new(Checkpointer { tx }),
        CheckpointerHandle { worker },
    )
}

async fn checkpoint_worker(
    path: PathBuf,
    settings: CheckpointSettings,
    mut rx: mpsc::UnboundedReceiver<u64>,
) {
    let mut high_water: Option<u64> = None;
    let mut pending_acks = 0usize;

    let mut ticker = tokio::time::interval(settings.max_batch_wait);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(offset) => {
                    high_water = Some(high_water.map_or(offset, |h| h.max(offset)));
                    pending_acks += 1;
                    if pending_acks >= settings.max_batch_size {
                        persist(&path, &mut high_water, &mut pending_acks).await;
                    }
                }
                // Every sender dropped: final commit, then exit.
                None => break,
            },
            _ = ticker.tick() => {
                if pending_acks > 0 {
                    persist(&path, &mut high_water, &mut pending_acks).await;
                }
            }
        }
    }

    if pending_acks > 0 {
        persist(&path, &mut high_water, &mut pending_acks).await;
    }
    debug!(path = %path.display(), "checkpoint worker finished");
}

async fn persist(path: &Path, high_water: &mut Option<u64>, pending_acks: &mut usize) {
    let Some(offset) = *high_water else {
        return;
    };

    let tmp = path.with_extension("checkpoint.tmp");
    let write = async {
        tokio::fs::write(&tmp, format!("{offset}\n")).await?;
        tokio::fs::rename(&tmp, path).await
    };

    match write.await {
        Ok(()) => {
            debug!(offset, path = %path.display(), "checkpoint committed");
            *pending_acks = 0;
        }
        Err(e) => {
            // Keep the pending count; the next tick retries.
            warn!(error = %e, path = %path.display(), "checkpoint write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings(max_batch_size: usize, wait_ms: u64) -> CheckpointSettings {
        CheckpointSettings {
            max_batch_size,
            max_batch_wait: Duration::from_millis(wait_ms),
        }
    }

    #[tokio::test]
    async fn commits_after_max_batch_size_acks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.checkpoint");

        let (committer, handle) = spawn_checkpointer(path.clone(), settings(3, 60_000));
        committer.commit(10);
        committer.commit(30);
        committer.commit(20);

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if load_checkpoint(&path).unwrap() == Some(30) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("three acks must trigger a commit of the max offset");

        drop(committer);
        handle.drain().await;
    }

    #[tokio::test]
    async fn commits_on_the_wait_timer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.checkpoint");

        let (committer, handle) = spawn_checkpointer(path.clone(), settings(1000, 30));
        committer.commit(7);

        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if load_checkpoint(&path).unwrap() == Some(7) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("the wait timer must flush a pending ack");

        drop(committer);
        handle.drain().await;
    }

    #[tokio::test]
    async fn final_commit_happens_on_drain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.checkpoint");

        let (committer, handle) = spawn_checkpointer(path.clone(), settings(1000, 60_000));
        committer.commit(99);
        drop(committer);
        handle.drain().await;

        assert_eq!(load_checkpoint(&path).unwrap(), Some(99));
    }

    #[test]
    fn missing_checkpoint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            load_checkpoint(&dir.path().join("absent")).unwrap(),
            None
        );
    }

    #[test]
    fn corrupt_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.checkpoint");
        std::fs::write(&path, "not-a-number").unwrap();
        assert!(load_checkpoint(&path).is_err());
    }
}
