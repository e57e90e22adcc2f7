use std::error::Error;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::MqttOptions;
use rumqttc::Outgoing;
use rumqttc::Packet;
use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::MqttConfig;

/// MQTT message received from a subscription
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Trait for MQTT client operations
///
/// This trait allows for mocking the MQTT client for testing purposes
#[async_trait]
pub trait MqttClient: Send + Sync {
    /// Connect to the MQTT broker
    async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>>;

    /// Subscribe to an MQTT topic filter
    async fn subscribe(&mut self, topic: &str) -> Result<(), Box<dyn Error + Send>>;

    /// Unsubscribe from an MQTT topic filter
    async fn unsubscribe(&mut self, topic: &str) -> Result<(), Box<dyn Error + Send>>;

    /// Publish a message to an MQTT topic
    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Box<dyn Error + Send>>;

    /// Wait for the next message from subscribed topics
    ///
    /// Returns None once the connection is gone for good.
    async fn poll_message(&mut self) -> Option<MqttMessage>;

    /// Flush queued requests, send DISCONNECT and stop the connection
    async fn disconnect(&mut self) -> Result<(), Box<dyn Error + Send>>;
}

/// Upper bound on waiting for the event loop to flush and disconnect
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a [`MockMqttClient`] was asked to do, shared so tests can
/// inspect it after the client moved into a background task.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockMqttState {
    pub is_connected: bool,
    pub disconnects: u32,
    pub subscriptions: Vec<String>,
    pub unsubscriptions: Vec<String>,
    pub published: Vec<(String, Vec<u8>, bool)>,
}

/// Mock MQTT client for testing
///
/// Incoming messages are fed through an unbounded channel. Once the feeding
/// side is dropped and the queue drained, `poll_message` stays pending, like
/// an idle broker connection.
#[cfg(test)]
pub struct MockMqttClient {
    pub state: std::sync::Arc<std::sync::Mutex<MockMqttState>>,
    incoming: mpsc::UnboundedReceiver<MqttMessage>,
}

#[cfg(test)]
impl MockMqttClient {
    /// Create a new mock MQTT client and the sender used to feed it messages
    pub fn new() -> (Self, mpsc::UnboundedSender<MqttMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Default::default(),
                incoming: rx,
            },
            tx,
        )
    }
}

#[cfg(test)]
#[async_trait]
impl MqttClient for MockMqttClient {
    async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        self.state.lock().unwrap().is_connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Box<dyn Error + Send>> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .push(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), Box<dyn Error + Send>> {
        self.state
            .lock()
            .unwrap()
            .unsubscriptions
            .push(topic.to_string());
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Box<dyn Error + Send>> {
        self.state
            .lock()
            .unwrap()
            .published
            .push((topic.to_string(), payload.to_vec(), retain));
        Ok(())
    }

    async fn poll_message(&mut self) -> Option<MqttMessage> {
        match self.incoming.recv().await {
            Some(msg) => Some(msg),
            None => std::future::pending().await,
        }
    }

    async fn disconnect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        let mut state = self.state.lock().unwrap();
        state.is_connected = false;
        state.disconnects += 1;
        Ok(())
    }
}

/// Real MQTT client implementation using rumqttc
pub struct RumqttcClient {
    /// MQTT connection options (stored for lazy initialization)
    mqtt_options: MqttOptions,

    /// AsyncClient (created in connect())
    client: Option<AsyncClient>,

    /// Message receiver (created in connect())
    message_rx: Option<mpsc::UnboundedReceiver<MqttMessage>>,

    /// Background event loop task handle
    event_loop_task: Option<JoinHandle<()>>,
}

impl RumqttcClient {
    /// Create a new RumqttcClient from configuration
    ///
    /// The stream and the alert sink each hold their own connection, so the
    /// client id is passed separately.
    pub fn new(config: &MqttConfig, client_id: impl Into<String>) -> anyhow::Result<Self> {
        let mut mqtt_options = MqttOptions::new(client_id, config.broker.clone(), config.port);

        mqtt_options.set_keep_alive(Duration::from_secs(30));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            mqtt_options.set_credentials(username, password);
        }

        Ok(Self {
            mqtt_options,
            client: None,
            message_rx: None,
            event_loop_task: None,
        })
    }

    fn connected_client(&self) -> Result<&AsyncClient, Box<dyn Error + Send>> {
        self.client.as_ref().ok_or_else(|| -> Box<dyn Error + Send> {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "MQTT client not connected. Call connect() first.",
            ))
        })
    }
}

#[async_trait]
impl MqttClient for RumqttcClient {
    async fn connect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        let (client, mut event_loop) = AsyncClient::new(self.mqtt_options.clone(), 10);

        let (message_tx, message_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = MqttMessage {
                            topic: publish.topic.to_string(),
                            payload: publish.payload.to_vec(),
                        };

                        // Receiver dropped means nobody is listening any more
                        if message_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    // Everything queued before the DISCONNECT has been written
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("MQTT event loop error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            tracing::info!("MQTT event loop task exiting");
        });

        self.client = Some(client);
        self.message_rx = Some(message_rx);
        self.event_loop_task = Some(task);

        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Box<dyn Error + Send>> {
        self.connected_client()?
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| Box::new(e) as Box<dyn Error + Send>)
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), Box<dyn Error + Send>> {
        self.connected_client()?
            .unsubscribe(topic)
            .await
            .map_err(|e| Box::new(e) as Box<dyn Error + Send>)
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Box<dyn Error + Send>> {
        self.connected_client()?
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|e| Box::new(e) as Box<dyn Error + Send>)
    }

    async fn poll_message(&mut self) -> Option<MqttMessage> {
        match &mut self.message_rx {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    async fn disconnect(&mut self) -> Result<(), Box<dyn Error + Send>> {
        self.connected_client()?
            .disconnect()
            .await
            .map_err(|e| Box::new(e) as Box<dyn Error + Send>)?;

        if let Some(mut task) = self.event_loop_task.take() {
            if tokio::time::timeout(DISCONNECT_TIMEOUT, &mut task).await.is_err() {
                tracing::warn!("MQTT event loop did not disconnect in time, aborting");
                task.abort();
            }
        }
        self.client = None;
        self.message_rx = None;
        Ok(())
    }
}

impl Drop for RumqttcClient {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop_task.take() {
            task.abort();
        }
    }
}
