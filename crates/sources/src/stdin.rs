//! Stdin source
//!
//! Framed records from standard input, for one-shot runs and debugging.
//! The stream ends at EOF; acks are detached.

use async_trait::async_trait;
use bytes::Bytes;
use sluice_model::FrameDecoder;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{AckHandle, RawRecord, RecordSource, SourceError};

#[derive(Debug, Default)]
pub struct StdinSource;

#[async_trait]
impl RecordSource for StdinSource {
    async fn run(
        self: Box<Self>,
        tx: mpsc::Sender<RawRecord>,
        cancel: CancellationToken,
    ) -> Result<(), SourceError> {
        let mut stdin = tokio::io::stdin();
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; 64 * 1024];
        let mut offset = 0u64;

        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                read = stdin.read(&mut buf) => read?,
            };

            if read == 0 {
                info!("stdin closed, ending");
                return Ok(());
            }

            decoder.push(&buf[..read]);
            while let Some(frame) = decoder.next_frame()? {
                let record =
                    RawRecord::new(Bytes::from(frame.payload), AckHandle::detached(offset));
                offset += 1;
                if tx.send(record).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "stdin"
    }
}
