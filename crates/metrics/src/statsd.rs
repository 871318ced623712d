//! Statsd backend
//!
//! Emits tagged datagrams in the dogstatsd line format:
//!
//! ```text
//! sluice.raw:12|c|#env:prod
//! sluice.enrich_latency_ms:37|g|#env:prod
//! ```
//!
//! Counters are emitted as period deltas; the latency gauge carries its
//! current value. Datagram loss is accepted (UDP); send errors are logged
//! and never propagate.

use async_trait::async_trait;
use sluice_config::StatsdConfig;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::{MetricsBackend, MetricsDelta};

pub struct StatsdBackend {
    socket: UdpSocket,
    prefix: String,
    /// Pre-rendered `|#k:v,k:v` suffix, empty when no tags are configured.
    tag_suffix: String,
}

impl StatsdBackend {
    /// Bind a local socket and connect it to the statsd daemon.
    pub async fn connect(config: &StatsdConfig) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect((config.host.as_str(), config.port)).await?;

        let tag_suffix = if config.tags.is_empty() {
            String::new()
        } else {
            let rendered: Vec<String> = config
                .tags
                .iter()
                .map(|(k, v)| format!("{k}:{v}"))
                .collect();
            format!("|#{}", rendered.join(","))
        };

        debug!(
            host = %config.host,
            port = config.port,
            prefix = %config.prefix,
            "statsd backend connected"
        );

        Ok(Self {
            socket,
            prefix: config.prefix.clone(),
            tag_suffix,
        })
    }

    fn counter_line(&self, metric: &str, value: u64) -> String {
        format!("{}.{}:{}|c{}", self.prefix, metric, value, self.tag_suffix)
    }

    fn gauge_line(&self, metric: &str, value: u64) -> String {
        format!("{}.{}:{}|g{}", self.prefix, metric, value, self.tag_suffix)
    }

    async fn send(&self, line: &str) {
        if let Err(e) = self.socket.send(line.as_bytes()).await {
            warn!(error = %e, "statsd send failed");
        }
    }
}

#[async_trait]
impl MetricsBackend for StatsdBackend {
    async fn emit(&mut self, delta: &MetricsDelta) {
        if delta.is_idle() {
            return;
        }

        self.send(&self.counter_line("raw", delta.raw)).await;
        self.send(&self.counter_line("good", delta.good)).await;
        self.send(&self.counter_line("bad", delta.bad)).await;

        if let Some(latency) = delta.enrich_latency_ms {
            self.send(&self.gauge_line("enrich_latency_ms", latency))
                .await;
        }
    }

    fn name(&self) -> &'static str {
        "statsd"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    async fn backend_with_tags(tags: BTreeMap<String, String>) -> (StatsdBackend, UdpSocket) {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let config = StatsdConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            tags,
            prefix: "sluice".into(),
        };

        (StatsdBackend::connect(&config).await.unwrap(), server)
    }

    #[tokio::test]
    async fn emits_tagged_counter_and_gauge_lines() {
        let mut tags = BTreeMap::new();
        tags.insert("env".to_string(), "test".to_string());
        let (mut backend, server) = backend_with_tags(tags).await;

        backend
            .emit(&MetricsDelta {
                raw: 12,
                good: 10,
                bad: 2,
                enrich_latency_ms: Some(37),
            })
            .await;

        let mut lines = Vec::new();
        let mut buf = [0u8; 256];
        for _ in 0..4 {
            let n = server.recv(&mut buf).await.unwrap();
            lines.push(String::from_utf8_lossy(&buf[..n]).into_owned());
        }

        assert!(lines.contains(&"sluice.raw:12|c|#env:test".to_string()), "{lines:?}");
        assert!(lines.contains(&"sluice.good:10|c|#env:test".to_string()));
        assert!(lines.contains(&"sluice.bad:2|c|#env:test".to_string()));
        assert!(lines.contains(&"sluice.enrich_latency_ms:37|g|#env:test".to_string()));
    }

    #[tokio::test]
    async fn no_tags_means_no_tag_suffix() {
        let (backend, _server) = backend_with_tags(BTreeMap::new()).await;
        assert_eq!(backend.counter_line("raw", 1), "sluice.raw:1|c");
    }

    #[tokio::test]
    async fn idle_periods_send_nothing() {
        let (mut backend, server) = backend_with_tags(BTreeMap::new()).await;
        backend.emit(&MetricsDelta::default()).await;

        // A follow-up datagram proves the socket stayed silent before it.
        backend
            .emit(&MetricsDelta {
                raw: 1,
                ..Default::default()
            })
            .await;

        let mut buf = [0u8; 256];
        let n = server.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"sluice.raw:1|c");
    }
}
