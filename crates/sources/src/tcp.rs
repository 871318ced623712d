//! TCP source
//!
//! Accepts inbound connections carrying framed records. The transport has
//! no replay cursor, so ack handles are detached: progress is whatever
//! the peer has already written. A corrupt frame closes its connection
//! without disturbing the others.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use sluice_model::FrameDecoder;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{AckHandle, RawRecord, RecordSource, SourceError};

pub struct TcpSource {
    address: String,
    port: u16,
}

impl TcpSource {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

#[async_trait]
impl RecordSource for TcpSource {
    async fn run(
        self: Box<Self>,
        tx: mpsc::Sender<RawRecord>,
        cancel: CancellationToken,
    ) -> Result<(), SourceError> {
        let bind = format!("{}:{}", self.address, self.port);
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|source| SourceError::Bind {
                address: bind.clone(),
                source,
            })?;

        info!(address = %bind, "tcp source listening");

        let sequence = Arc::new(AtomicU64::new(0));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("tcp source stopped");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => {
                            debug!(peer = %peer, "connection accepted");
                            tokio::spawn(handle_connection(
                                socket,
                                tx.clone(),
                                cancel.clone(),
                                Arc::clone(&sequence),
                            ));
                        }
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                        }
                    }
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    tx: mpsc::Sender<RawRecord>,
    cancel: CancellationToken,
    sequence: Arc<AtomicU64>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return,
            read = socket.read(&mut buf) => read,
        };

        let read = match read {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "connection read failed");
                return;
            }
        };

        decoder.push(&buf[..read]);

        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => {
                    let offset = sequence.fetch_add(1, Ordering::Relaxed);
                    let record =
                        RawRecord::new(Bytes::from(frame.payload), AckHandle::detached(offset));
                    if tx.send(record).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "corrupt frame, closing connection");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_model::encode_frame;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn delivers_records_from_a_connection() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        // Bind on an ephemeral port by racing: bind ourselves first to
        // reserve one, then hand the port to the source.
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let source = Box::new(TcpSource::new("127.0.0.1", port));
        let task = tokio::spawn(source.run(tx, cancel.clone()));

        // Give the listener a moment, then write two frames.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        client
            .write_all(&encode_frame("", b"payload-a"))
            .await
            .unwrap();
        client
            .write_all(&encode_frame("", b"payload-b"))
            .await
            .unwrap();
        client.flush().await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&first.data[..], b"payload-a");
        assert!(!first.ack.is_acked());
        first.ack.ack();

        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&second.data[..], b"payload-b");

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
