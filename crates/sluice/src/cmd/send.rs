//! Send command - smoke-test producer
//!
//! Emits framed sample collector payloads at a pipeline input, either a
//! TCP listener or a stream file. Verifies the ingest path end to end
//! without a real collector.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use sluice_model::encode_frame;
use tokio::io::AsyncWriteExt;

/// Send command arguments
#[derive(Args, Debug)]
pub struct SendArgs {
    /// TCP input to connect to (host:port)
    #[arg(short, long, conflicts_with = "file")]
    pub target: Option<String>,

    /// Stream file to append to
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Number of payloads to send
    #[arg(short, long, default_value_t = 1)]
    pub count: usize,

    /// app_id stamped into each sample event
    #[arg(long, default_value = "sluice-send")]
    pub app_id: String,
}

pub async fn run(args: SendArgs) -> Result<()> {
    let mut wire = Vec::new();
    for i in 0..args.count {
        let payload = sample_payload(&args.app_id, i);
        wire.extend_from_slice(&encode_frame("", payload.as_bytes()));
    }

    match (&args.target, &args.file) {
        (Some(target), None) => {
            let mut stream = tokio::net::TcpStream::connect(target)
                .await
                .with_context(|| format!("failed to connect to {target}"))?;
            stream.write_all(&wire).await?;
            stream.flush().await?;
            stream.shutdown().await?;
            println!("sent {} payload(s) to {}", args.count, target);
        }
        (None, Some(path)) => {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            file.write_all(&wire).await?;
            file.flush().await?;
            println!("appended {} payload(s) to {}", args.count, path.display());
        }
        _ => anyhow::bail!("exactly one of --target or --file is required"),
    }

    Ok(())
}

fn sample_payload(app_id: &str, index: usize) -> String {
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();

    serde_json::json!({
        "schema": "iglu:com.sluice/collector_payload/jsonschema/1-0-0",
        "data": {
            "collector_tstamp": now_ms as i64,
            "source_ip": "203.0.113.9",
            "useragent": "sluice-send/0.1",
            "headers": ["Accept: */*"],
            "events": [{
                "e": "pv",
                "aid": app_id,
                "p": "web",
                "url": format!("https://example.com/page/{index}?utm_source=send&utm_medium=cli"),
                "page": format!("Sample page {index}"),
                "duid": format!("du-{index:04}")
            }]
        }
    })
    .to_string()
}
