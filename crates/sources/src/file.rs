//! File source
//!
//! Tails a framed stream file, the replayable reference source. On start
//! it resumes from the committed checkpoint; without one it starts at the
//! beginning (`TRIM_HORIZON`) or the current end (`LATEST`). Offsets are
//! byte positions after each complete frame, committed through the
//! batching checkpointer, so acked records are not re-delivered across
//! restarts.
//!
//! The stream ends when the file is deleted or the pipeline is cancelled;
//! a corrupt frame is unrecoverable and stops the pipeline.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sluice_config::{CheckpointSettings, InitialPosition};
use sluice_model::FrameDecoder;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::checkpoint::{load_checkpoint, spawn_checkpointer};
use crate::{AckHandle, RawRecord, RecordSource, SourceError};

/// How often the tail loop re-polls an unchanged file.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct FileSource {
    path: PathBuf,
    initial_position: InitialPosition,
    checkpoint_settings: CheckpointSettings,
}

impl FileSource {
    pub fn new(
        path: PathBuf,
        initial_position: InitialPosition,
        checkpoint_settings: CheckpointSettings,
    ) -> Self {
        Self {
            path,
            initial_position,
            checkpoint_settings,
        }
    }

    fn checkpoint_path(&self) -> PathBuf {
        let mut os = self.path.as_os_str().to_owned();
        os.push(".checkpoint");
        PathBuf::from(os)
    }
}

#[async_trait]
impl RecordSource for FileSource {
    async fn run(
        self: Box<Self>,
        tx: mpsc::Sender<RawRecord>,
        cancel: CancellationToken,
    ) -> Result<(), SourceError> {
        let checkpoint_path = self.checkpoint_path();

        let start_offset = match load_checkpoint(&checkpoint_path)? {
            Some(offset) => {
                info!(offset, "resuming from checkpoint");
                offset
            }
            None => match self.initial_position {
                InitialPosition::TrimHorizon => 0,
                InitialPosition::Latest => {
                    let len = tokio::fs::metadata(&self.path).await?.len();
                    info!(offset = len, "no checkpoint, starting at the tail");
                    len
                }
            },
        };

        let (committer, checkpointer) =
            spawn_checkpointer(checkpoint_path, self.checkpoint_settings.clone());

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(start_offset)).await?;

        info!(
            path = %self.path.display(),
            start_offset,
            "file source started"
        );

        let mut decoder = FrameDecoder::new();
        // Absolute offset of everything handed to the decoder so far.
        let mut read_offset = start_offset;
        let mut delivered = 0u64;
        let mut buf = vec![0u8; 64 * 1024];

        'tail: loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => break 'tail,
                read = file.read(&mut buf) => read?,
            };

            if read == 0 {
                // At the tail. Wait for growth; a deleted file ends the
                // stream.
                if tokio::fs::metadata(&self.path).await.is_err() {
                    info!(path = %self.path.display(), "stream file deleted, ending");
                    break 'tail;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break 'tail,
                    _ = tokio::time::sleep(POLL_INTERVAL) => continue 'tail,
                }
            }

            decoder.push(&buf[..read]);
            read_offset += read as u64;

            while let Some(frame) = decoder.next_frame()? {
                // The frame ends where the undecoded remainder begins.
                let frame_end = read_offset - decoder.buffered() as u64;
                let record = RawRecord::new(
                    Bytes::from(frame.payload),
                    AckHandle::new(frame_end, committer.clone()),
                );

                if tx.send(record).await.is_err() {
                    debug!("pipeline channel closed, ending file source");
                    break 'tail;
                }
                delivered += 1;
            }
        }

        info!(delivered, "file source stopped, draining checkpoints");

        // Release our committer reference; the checkpoint worker exits
        // after the last in-flight ack handle drops, then the final
        // offset is on disk.
        drop(committer);
        drop(tx);
        checkpointer.drain().await;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
#[path = "file_test.rs"]
mod tests;
