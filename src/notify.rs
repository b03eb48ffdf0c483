// src/notify.rs
//
// Alert sinks. The log sink is always available; the webhook sink posts each
// alert as JSON to an HTTP endpoint (speaker bridge, chat relay, etc.).

use crate::pipeline::AlertSink;
use crate::types::{AlertRequest, AlertsConfig};
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

const DEFAULT_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// LOG SINK
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl AlertSink for LogNotifier {
    async fn deliver(&self, alert: &AlertRequest) -> Result<()> {
        match alert {
            AlertRequest::Absence { duration_secs } => {
                info!("🚨 Absence alert: away for {:.1}s", duration_secs)
            }
            AlertRequest::Usage { duration_secs } => {
                info!("📱 Smartphone alert: in use for {:.1}s", duration_secs)
            }
            AlertRequest::Scheduled { time, content } => {
                info!("📅 Scheduled notice at {}: {}", time, content)
            }
        }
        Ok(())
    }
}

// ============================================================================
// WEBHOOK SINK
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AlertPayload<'a> {
    pub event_id: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub alert: &'a AlertRequest,
}

impl<'a> AlertPayload<'a> {
    pub fn new(alert: &'a AlertRequest) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Local::now().to_rfc3339(),
            alert,
        }
    }
}

pub struct WebhookNotifier {
    http_client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout_secs: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http_client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl AlertSink for WebhookNotifier {
    async fn deliver(&self, alert: &AlertRequest) -> Result<()> {
        let payload = AlertPayload::new(alert);
        debug!("🌐 Posting {} alert {} to {}", alert.as_str(), payload.event_id, self.url);

        let response = self
            .http_client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Webhook request to {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            anyhow::bail!("Webhook returned {}: {}", status, body);
        }
        Ok(())
    }
}

// ============================================================================
// SELECTION
// ============================================================================

pub enum Notifier {
    Log(LogNotifier),
    Webhook(WebhookNotifier),
}

impl Notifier {
    /// Webhook when a URL is configured, log sink otherwise.
    pub fn from_config(config: &AlertsConfig) -> Result<Self> {
        match &config.webhook_url {
            Some(url) => {
                let timeout = config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
                info!("🌐 Alerts go to webhook {} (timeout {}s)", url, timeout);
                Ok(Notifier::Webhook(WebhookNotifier::new(url.clone(), timeout)?))
            }
            None => {
                info!("Alerts go to the log");
                Ok(Notifier::Log(LogNotifier))
            }
        }
    }
}

impl AlertSink for Notifier {
    async fn deliver(&self, alert: &AlertRequest) -> Result<()> {
        match self {
            Notifier::Log(sink) => sink.deliver(alert).await,
            Notifier::Webhook(sink) => sink.deliver(alert).await,
        }
    }
}
