use std::error::Error;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use super::notification::Notification;
use crate::mqtt::MqttClient;

/// Where rendered notifications end up.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, notification: &Notification) -> Result<(), Box<dyn Error + Send>>;

    /// Deliver anything still queued and release the sink's connection.
    async fn close(&self) -> Result<(), Box<dyn Error + Send>> {
        Ok(())
    }
}

/// Writes notifications to the log.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), Box<dyn Error + Send>> {
        info!(
            tag = %notification.tag,
            require_interaction = notification.require_interaction,
            "{}: {}",
            notification.title,
            notification.body
        );
        Ok(())
    }
}

/// Publishes notifications as JSON to `{prefix}/{device_id}`, or
/// `{prefix}/test` for the test notification.
pub struct MqttSink<C: MqttClient> {
    client: Mutex<C>,
    prefix: String,
}

impl<C: MqttClient> MqttSink<C> {
    pub async fn connect(
        mut client: C,
        prefix: impl Into<String>,
    ) -> Result<Self, Box<dyn Error + Send>> {
        client.connect().await?;
        Ok(Self {
            client: Mutex::new(client),
            prefix: prefix.into().trim_end_matches('/').to_string(),
        })
    }

    fn topic(&self, notification: &Notification) -> String {
        format!(
            "{}/{}",
            self.prefix,
            notification.device_id.as_deref().unwrap_or("test")
        )
    }
}

#[async_trait]
impl<C: MqttClient> NotificationSink for MqttSink<C> {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), Box<dyn Error + Send>> {
        let payload = serde_json::to_vec(notification).map_err(|e| -> Box<dyn Error + Send> {
            Box::new(e)
        })?;
        let topic = self.topic(notification);
        self.client
            .lock()
            .await
            .publish(&topic, &payload, false)
            .await
    }

    async fn close(&self) -> Result<(), Box<dyn Error + Send>> {
        self.client.lock().await.disconnect().await
    }
}
