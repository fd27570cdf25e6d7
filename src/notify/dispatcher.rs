use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{AccessEvent, NotificationSink, WebhookPayload, WebhookSink};
use crate::config::NotificationSettings;
use crate::error::NotificationError;

/// Fire-and-forget notification dispatch.
///
/// Each event is delivered from its own detached task; callers never wait on
/// delivery and never see its outcome.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sink: Option<Arc<dyn NotificationSink>>,
    footer: String,
}

impl NotificationDispatcher {
    pub fn new(sink: Option<Arc<dyn NotificationSink>>, footer: String) -> Self {
        Self { sink, footer }
    }

    /// Dispatcher posting to the configured webhook, or a no-op one if unset
    pub fn from_settings(settings: &NotificationSettings) -> Result<Self, NotificationError> {
        let sink = match &settings.webhook_url {
            Some(url) => {
                let sink = WebhookSink::new(url.clone(), Duration::from_secs(settings.timeout_secs))?;
                Some(Arc::new(sink) as Arc<dyn NotificationSink>)
            }
            None => None,
        };

        Ok(Self::new(sink, settings.footer.clone()))
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Queue delivery of `event`.
    ///
    /// Returns the delivery task handle (for tests); production callers drop
    /// it. Returns `None` when no destination is configured.
    pub fn notify(&self, event: AccessEvent) -> Option<JoinHandle<()>> {
        let Some(sink) = self.sink.clone() else {
            tracing::info!(
                action = %event.action_label(),
                "No webhook configured; notification skipped"
            );
            return None;
        };

        let payload = WebhookPayload::from_event(&event, &self.footer);
        Some(tokio::spawn(async move {
            match sink.deliver(&payload).await {
                Ok(()) => tracing::info!(
                    actor = %event.actor_name(),
                    action = %event.action_label(),
                    "Notification delivered"
                ),
                Err(e) => tracing::warn!(
                    actor = %event.actor_name(),
                    action = %event.action_label(),
                    "Notification delivery failed: {}",
                    e
                ),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::{FailingSink, RecordingSink};
    use chrono::Utc;

    #[tokio::test]
    async fn delivers_rendered_payload() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = NotificationDispatcher::new(Some(sink.clone()), "Lab".to_string());

        let handle = dispatcher
            .notify(AccessEvent::unrecognized("00000000", Utc::now()))
            .expect("delivery task");
        handle.await.unwrap();

        let payloads = sink.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].field("Success"), Some("false"));
        assert_eq!(payloads[0].field("Card"), Some("00000000"));
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let dispatcher = NotificationDispatcher::new(Some(Arc::new(FailingSink)), String::new());

        let handle = dispatcher
            .notify(AccessEvent::unrecognized("00000000", Utc::now()))
            .expect("delivery task");
        // The task completes normally even though delivery failed
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn without_destination_is_noop() {
        let dispatcher = NotificationDispatcher::from_settings(&NotificationSettings::default()).unwrap();
        assert!(!dispatcher.is_enabled());
        assert!(dispatcher
            .notify(AccessEvent::unrecognized("00000000", Utc::now()))
            .is_none());
    }

    #[tokio::test]
    async fn webhook_settings_enable_delivery() {
        let settings = NotificationSettings {
            webhook_url: Some("https://example.com/hook".to_string()),
            ..NotificationSettings::default()
        };
        let dispatcher = NotificationDispatcher::from_settings(&settings).unwrap();
        assert!(dispatcher.is_enabled());
    }
}
