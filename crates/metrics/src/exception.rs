//! Exception forwarding
//!
//! A single optional exception sink receives non-fatal runtime errors as
//! they happen and fatal errors exactly once before exit. Reporting is
//! best-effort and must never block the caller, so the webhook
//! implementation fires a detached task per report.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, warn};

/// Best-effort error sink.
pub trait ExceptionReporter: Send + Sync {
    /// Forward one error. Fire-and-forget from the caller's perspective.
    fn report(&self, error: &str);
}

/// Fallback reporter: errors only reach the process log.
#[derive(Debug, Default)]
pub struct LogReporter;

impl ExceptionReporter for LogReporter {
    fn report(&self, message: &str) {
        error!(error = %message, "pipeline exception");
    }
}

/// Posts each error as a JSON body to a configured HTTP endpoint.
pub struct WebhookReporter {
    client: reqwest::Client,
    endpoint: String,
    processor: String,
}

impl WebhookReporter {
    pub fn new(endpoint: impl Into<String>, processor: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            processor: processor.into(),
        }
    }
}

impl ExceptionReporter for WebhookReporter {
    fn report(&self, message: &str) {
        error!(error = %message, "pipeline exception");

        let body = serde_json::json!({
            "error": message,
            "processor": self.processor,
            "timestamp": Utc::now().to_rfc3339(),
        });
        let request = self.client.post(&self.endpoint).json(&body);

        // Detached: delivery failures are logged and otherwise ignored.
        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "exception webhook rejected report");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "exception webhook unreachable");
                }
            }
        });
    }
}

/// Reporter shared across the pipeline.
pub type SharedExceptionReporter = Arc<dyn ExceptionReporter>;
