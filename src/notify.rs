//! Outbound notifications (chat webhook).
//!
//! Notifications are fire-and-forget from the pipeline's point of view: a
//! failed send is reported to the caller but never changes an outcome.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::json;
use thiserror::Error;
use tracing::info;

/// Errors from a notification sink.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The webhook answered with something other than 200
    #[error("webhook returned HTTP {code}: {body}")]
    Rejected { code: u16, body: String },

    /// Network failure reaching the webhook
    #[error("webhook request failed: {0}")]
    Transport(String),
}

/// A sink for human-readable notifications.
pub trait Notifier {
    fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

/// Sink used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Posts `{"text": message}` to an incoming-webhook URL.
pub struct WebhookNotifier {
    url: String,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self::with_client(client, url))
    }

    fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, message: &str) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({ "text": message }))
            .send()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let code = resp.status().as_u16();
        if code != 200 {
            return Err(NotifyError::Rejected {
                code,
                body: resp.text().unwrap_or_default(),
            });
        }
        info!(message, "sent notification");
        Ok(())
    }
}

/// Webhook notifier when a URL is configured, otherwise a no-op.
pub fn from_config(webhook_url: Option<&str>) -> Result<Box<dyn Notifier>, NotifyError> {
    match webhook_url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => Ok(Box::new(WebhookNotifier::new(url)?)),
        None => Ok(Box::new(NoopNotifier)),
    }
}
