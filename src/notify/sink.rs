use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::WebhookPayload;
use crate::error::NotificationError;

/// Destination for rendered notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, payload: &WebhookPayload) -> Result<(), NotificationError>;
}

/// Posts payloads as JSON to a webhook URL
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String, timeout: Duration) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .user_agent(format!("access-logger/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, payload: &WebhookPayload) -> Result<(), NotificationError> {
        let response = self.client.post(&self.url).json(payload).send().await?;

        // Discord answers 204 No Content; any 2xx counts
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(NotificationError::Status { status, body })
    }
}
