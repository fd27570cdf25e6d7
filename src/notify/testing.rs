use async_trait::async_trait;
use std::sync::Mutex;

use super::{NotificationSink, WebhookPayload};
use crate::error::NotificationError;

/// Sink that keeps every payload it is given
#[derive(Default)]
pub struct RecordingSink {
    payloads: Mutex<Vec<WebhookPayload>>,
}

impl RecordingSink {
    pub fn payloads(&self) -> Vec<WebhookPayload> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, payload: &WebhookPayload) -> Result<(), NotificationError> {
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// Sink whose destination always rejects the payload
pub struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn deliver(&self, _payload: &WebhookPayload) -> Result<(), NotificationError> {
        Err(NotificationError::Status {
            status: reqwest::StatusCode::BAD_GATEWAY,
            body: "upstream unavailable".to_string(),
        })
    }
}
