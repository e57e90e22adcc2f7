pub(crate) mod client;
mod stream;

pub use client::MqttClient;
pub use client::MqttMessage;
pub use client::RumqttcClient;
pub use stream::MqttReadingStream;
