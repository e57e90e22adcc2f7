use std::error::Error;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::client::MqttClient;
use super::client::MqttMessage;
use crate::model::ReadingEvent;
use crate::monitor::MonitorMessage;
use crate::monitor::MonitorSender;
use crate::monitor::ReadingStream;
use crate::monitor::Subscription;

/// Live reading inserts delivered over MQTT.
///
/// Each message on `topic` carries one inserted row as JSON
/// (`{"deviceid": ..., "weight_g": ..., "created_at": ...}`).
pub struct MqttReadingStream<C: MqttClient> {
    client: C,
    topic: String,
}

impl<C: MqttClient + 'static> MqttReadingStream<C> {
    pub fn new(client: C, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
        }
    }

    async fn deliver(
        mut client: C,
        topic: String,
        tx: MonitorSender,
        cancel: CancellationToken,
    ) {
        loop {
            let msg = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                msg = client.poll_message() => msg,
            };

            let Some(msg) = msg else {
                warn!("MQTT connection closed, live readings stopped");
                break;
            };

            let Some(event) = parse_event(&msg) else {
                continue;
            };

            let forwarded = MonitorMessage::ReadingInserted {
                event,
                arrived_at: Utc::now(),
            };
            // A full channel must not keep the release waiting
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = tx.send(forwarded) => sent,
            };
            if sent.is_err() {
                debug!("Monitor gone, stopping live readings");
                break;
            }
        }

        if let Err(e) = client.unsubscribe(&topic).await {
            warn!("Failed to unsubscribe from {}: {}", topic, e);
        } else {
            info!("Unsubscribed from {}", topic);
        }
        if let Err(e) = client.disconnect().await {
            warn!("Failed to disconnect reading stream: {}", e);
        }
    }
}

fn parse_event(msg: &MqttMessage) -> Option<ReadingEvent> {
    match serde_json::from_slice::<ReadingEvent>(&msg.payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Dropping malformed reading on {}: {}", msg.topic, e);
            None
        }
    }
}

#[async_trait]
impl<C: MqttClient + 'static> ReadingStream for MqttReadingStream<C> {
    fn name(&self) -> &str {
        &self.topic
    }

    async fn subscribe(
        self: Box<Self>,
        tx: MonitorSender,
    ) -> Result<Subscription, Box<dyn Error + Send>> {
        let Self { mut client, topic } = *self;
        client.connect().await?;
        client.subscribe(&topic).await?;
        info!("Subscribed to {}", topic);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Self::deliver(client, topic.clone(), tx, cancel.clone()));
        Ok(Subscription::new(topic, cancel, task))
    }
}
