//! TCP producer
//!
//! Delivers framed records to a remote collector over a single long-lived
//! connection (`host:port`). Connection loss is a transient failure: the
//! connection is dropped and the next attempt reconnects, so the sink's
//! backoff policy paces reconnection.

use std::time::Duration;

use async_trait::async_trait;
use sluice_model::encode_frame;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::{BatchResponse, OutboundRecord, ProducerError, SinkError, StreamProducer};

pub struct TcpProducer {
    target: String,
    connect_timeout: Duration,
    write_timeout: Duration,
    conn: Mutex<Option<TcpStream>>,
}

impl TcpProducer {
    /// Validate the target address. No connection is made until the first
    /// batch; a dead collector at startup is a transient condition.
    pub fn new(target: impl Into<String>) -> Result<Self, SinkError> {
        let target = target.into();
        if !target.contains(':') {
            return Err(SinkError::config(format!(
                "tcp target must be host:port, got {target}"
            )));
        }

        Ok(Self {
            target,
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            conn: Mutex::new(None),
        })
    }

    async fn connect(&self) -> Result<TcpStream, ProducerError> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(&self.target))
            .await
            .map_err(|_| ProducerError::transient(format!("connect to {} timed out", self.target)))?
            .map_err(|e| ProducerError::transient(format!("connect to {} failed: {e}", self.target)))?;

        stream
            .set_nodelay(true)
            .map_err(|e| ProducerError::transient(format!("set_nodelay failed: {e}")))?;

        debug!(target = %self.target, "tcp producer connected");
        Ok(stream)
    }
}

#[async_trait]
impl StreamProducer for TcpProducer {
    async fn send_batch(&self, records: &[OutboundRecord]) -> Result<BatchResponse, ProducerError> {
        let mut guard = self.conn.lock().await;

        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let stream = guard.as_mut().unwrap_or_else(|| unreachable!());

        let mut wire = Vec::new();
        for record in records {
            wire.extend_from_slice(&encode_frame(&record.partition_key, &record.data));
        }

        let write = async {
            stream.write_all(&wire).await?;
            stream.flush().await
        };

        match timeout(self.write_timeout, write).await {
            Ok(Ok(())) => Ok(BatchResponse::ok()),
            Ok(Err(e)) => {
                // The connection is suspect after any write error.
                *guard = None;
                Err(ProducerError::transient(format!(
                    "write to {} failed: {e}",
                    self.target
                )))
            }
            Err(_) => {
                *guard = None;
                Err(ProducerError::transient(format!(
                    "write to {} timed out",
                    self.target
                )))
            }
        }
    }

    async fn close(&self) -> Result<(), ProducerError> {
        if let Some(mut stream) = self.conn.lock().await.take() {
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "tcp"
    }
}
