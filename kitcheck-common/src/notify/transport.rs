//! Mail delivery

use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// One outgoing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub from_name: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<()>;
}

/// Posts messages as JSON to an HTTP mail relay
#[derive(Debug, Clone)]
pub struct HttpRelayTransport {
    http_client: reqwest::Client,
    relay_url: String,
}

impl HttpRelayTransport {
    pub fn new(relay_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Notification(e.to_string()))?;

        Ok(Self {
            http_client,
            relay_url: relay_url.into(),
        })
    }
}

#[async_trait]
impl MailTransport for HttpRelayTransport {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        self.http_client
            .post(&self.relay_url)
            .json(message)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::Notification(e.to_string()))?;
        Ok(())
    }
}

/// Used when no relay is configured; every send fails
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredTransport;

#[async_trait]
impl MailTransport for UnconfiguredTransport {
    async fn send(&self, _message: &MailMessage) -> Result<()> {
        Err(Error::Notification("No mail relay configured".to_string()))
    }
}
