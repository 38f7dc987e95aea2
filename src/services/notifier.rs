//! Outbound signal delivery.
//!
//! Delivery is fire-and-forget: `notify` returns immediately and a failed
//! delivery is logged, never retried and never reported back to the pipeline.

use crate::error::{AppError, Result};
use crate::types::SignalNotification;
use reqwest::Client;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Receiver of live signals.
pub trait Notifier: Send + Sync {
    /// Hand a notification off for delivery. Must not block.
    fn notify(&self, notification: SignalNotification);
}

/// Posts each notification as JSON to a webhook.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    template: Option<Value>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, template: Option<Value>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("barline/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            template,
        })
    }

    /// JSON body for a notification.
    pub fn payload(&self, notification: SignalNotification) -> Value {
        notification.into_payload(self.template.as_ref())
    }

    async fn post(client: Client, url: String, body: Value) -> Result<()> {
        let response = client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Notifier(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notification: SignalNotification) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No runtime available, dropping {} notification", notification.action);
                return;
            }
        };

        let body = self.payload(notification);
        let client = self.client.clone();
        let url = self.url.clone();

        handle.spawn(async move {
            match Self::post(client, url, body).await {
                Ok(()) => debug!("Webhook delivered"),
                Err(e) => warn!("Webhook delivery failed: {}", e),
            }
        });
    }
}

/// Keeps notifications in memory and logs them.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SignalNotification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far.
    pub fn sent(&self) -> Vec<SignalNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: SignalNotification) {
        info!(
            "Signal {} {} for strategy {}",
            notification.action, notification.symbol, notification.strategy_id
        );
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
    }
}
