use std::error::Error;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::message::MonitorSender;

/// A live source of "reading inserted" events.
#[async_trait]
pub trait ReadingStream: Send {
    fn name(&self) -> &str;

    /// Start delivering events to `tx` as `MonitorMessage::ReadingInserted`.
    ///
    /// Delivery is at-least-once with no ordering guarantee. The returned
    /// guard owns the subscription.
    async fn subscribe(
        self: Box<Self>,
        tx: MonitorSender,
    ) -> Result<Subscription, Box<dyn Error + Send>>;
}

/// Scoped ownership of a live subscription.
///
/// The delivering task watches `cancel` and unsubscribes upstream before it
/// exits. `close` cancels and waits for that; dropping the guard without
/// closing only cancels, and the task finishes the release on its own.
pub struct Subscription {
    name: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(name: impl Into<String>, cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            cancel,
            task: Some(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tear the subscription down and wait for the upstream release.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Subscription '{}' task failed: {}", self.name, e);
            }
        }
        debug!("Subscription '{}' closed", self.name);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.task.is_some() {
            debug!("Subscription '{}' dropped without close, cancelling", self.name);
            self.cancel.cancel();
        }
    }
}
