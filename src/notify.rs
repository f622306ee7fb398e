//! Trade notifications
//!
//! Best-effort by contract: a notifier failure must never propagate into
//! the decision core, so `send` cannot error and the webhook variant only
//! logs its troubles.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::NotifyConfig;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str);
}

/// Local-only notifier for paper runs and tests
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) {
        info!("[notify] {}", message);
    }
}

/// POSTs each message as JSON to a configured webhook
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(config: &NotifyConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_millis(config.timeout_ms))
                .build()
                .unwrap_or_default(),
            url: config.webhook_url.clone(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &str) {
        let body = json!({ "text": message });
        match self.client.post(&self.url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => warn!("Webhook notification returned {}", resp.status()),
            Err(e) => warn!("Webhook notification failed: {}", e),
        }
    }
}

/// Pick the notifier the config asks for
pub fn from_config(config: &NotifyConfig) -> Arc<dyn Notifier> {
    if config.webhook_url.is_empty() {
        Arc::new(LogNotifier)
    } else {
        Arc::new(WebhookNotifier::new(config))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Captures messages so tests can assert exactly-once delivery
    pub(crate) struct RecordingNotifier {
        pub messages: Mutex<Vec<String>>,
    }

    impl RecordingNotifier {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                messages: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn count(&self) -> usize {
            self.messages.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn test_from_config_picks_log_when_no_webhook() {
        let notifier = from_config(&NotifyConfig::default());
        // No URL configured: the log notifier has nothing to fail on
        let _ = notifier;
    }
}
