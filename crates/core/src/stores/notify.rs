use crate::error::StoreError;
use crate::models::NotificationEvent;
use crate::traits::Notifier;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;
use url::Url;

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Fans notification events out to in-process subscribers.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<NotificationEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), StoreError> {
        // No subscribers is not a failure; the event simply has no audience.
        match self.sender.send(event.clone()) {
            Ok(receivers) => debug!(receivers, match_ref = %event.match_report_ref, "notification broadcast"),
            Err(_) => debug!(match_ref = %event.match_report_ref, "notification dropped, no subscribers"),
        }
        Ok(())
    }
}

/// POSTs each event as JSON. The match reference doubles as the idempotency
/// key so receivers can discard redeliveries.
pub struct WebhookNotifier {
    client: Client,
    endpoint: Url,
}

impl WebhookNotifier {
    pub fn new(endpoint: &str) -> Result<Self, StoreError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|error| StoreError::Notification(format!("invalid webhook url: {error}")))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|error| StoreError::Notification(error.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(IDEMPOTENCY_HEADER, &event.match_report_ref)
            .json(event)
            .send()
            .await
            .map_err(|error| StoreError::Notification(error.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Notification(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        debug!(match_ref = %event.match_report_ref, "notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> NotificationEvent {
        NotificationEvent {
            recipient_id: "emp-1".to_string(),
            job_title: "Data Engineer".to_string(),
            candidate_name: "Sam Rivera".to_string(),
            match_report_ref: "match-1".to_string(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_broadcast_events() {
        let notifier = BroadcastNotifier::default();
        let mut receiver = notifier.subscribe();
        notifier.notify(&event()).await.expect("notify");
        assert_eq!(receiver.recv().await.expect("event"), event());
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_not_an_error() {
        let notifier = BroadcastNotifier::new(4);
        assert!(notifier.notify(&event()).await.is_ok());
    }

    #[test]
    fn webhook_rejects_invalid_url() {
        assert!(matches!(
            WebhookNotifier::new("not a url"),
            Err(StoreError::Notification(_))
        ));
    }
}
