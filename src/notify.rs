use crate::config::NotificationConfig;
use crate::extract::LeadInfo;
use crate::types::CalendarEvent;
use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

/// Notification sink. Fire-and-forget: sending never fails the event that
/// triggered it, and each direction can be suppressed by configuration.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_success(&self, lead: &LeadInfo, file_id: &str);

    async fn notify_failure(&self, event: &CalendarEvent, lead: Option<&LeadInfo>, error: &str);
}

/// Posts notification payloads to an admin webhook (mail bridge). Delivery
/// problems are logged and dropped.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    config: NotificationConfig,
}

impl WebhookNotifier {
    pub fn new(url: &str, config: NotificationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            config,
        }
    }

    async fn post(&self, payload: serde_json::Value) {
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Delivered notification");
            }
            Ok(response) => {
                warn!(
                    "Notification webhook responded with status {}",
                    response.status().as_u16()
                );
            }
            Err(e) => {
                warn!("Failed to deliver notification: {}", e);
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_success(&self, lead: &LeadInfo, file_id: &str) {
        if !self.config.notify_on_success {
            return;
        }
        self.post(json!({
            "kind": "success",
            "leader": lead.full_name,
            "company": lead.company_name,
            "email": lead.email,
            "buildFileId": file_id,
        }))
        .await;
    }

    async fn notify_failure(&self, event: &CalendarEvent, lead: Option<&LeadInfo>, error: &str) {
        if !self.config.notify_on_failure {
            return;
        }
        self.post(json!({
            "kind": "failure",
            "eventId": event.id,
            "eventTitle": event.title,
            "leader": lead.map(|l| l.full_name.clone()),
            "email": lead.map(|l| l.email.clone()),
            "error": error,
        }))
        .await;
    }
}

/// Drops every notification. Used when no webhook is configured.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify_success(&self, _lead: &LeadInfo, _file_id: &str) {}

    async fn notify_failure(&self, _event: &CalendarEvent, _lead: Option<&LeadInfo>, _error: &str) {
    }
}
