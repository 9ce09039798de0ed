use async_trait::async_trait;
use serde_json::json;

/// Best-effort delivery of pipeline status messages. Implementations never
/// fail the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Posts `{"text": message}` to an incoming-webhook URL (Slack or any
/// service accepting the same payload).
pub struct WebhookNotifier {
    webhook_url: String,
    http_client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) {
        let result = self
            .http_client
            .post(&self.webhook_url)
            .json(&json!({ "text": message }))
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => tracing::info!("notification sent"),
            Err(e) => tracing::warn!(error = %e, "failed to send notification"),
        }
    }
}
