use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::notification::Notification;
use super::notification::NotificationRequest;
use super::sink::NotificationSink;

/// Requests from the monitor loop to the dispatcher task. Unbounded so the
/// loop never waits on a slow sink.
pub type DispatchSender = mpsc::UnboundedSender<NotificationRequest>;

/// Render each incoming request and hand it to `sink`.
///
/// Runs until every sender is dropped, then closes the sink. A failing sink
/// only loses that one notification.
pub fn spawn_dispatcher(sink: Box<dyn NotificationSink>) -> (DispatchSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<NotificationRequest>();

    let handle = tokio::spawn(async move {
        info!("Notification dispatcher using {} sink", sink.name());
        while let Some(request) = rx.recv().await {
            let notification = Notification::low_weight(&request);
            debug!("Dispatching {:?}", notification.tag);
            if let Err(e) = sink.notify(&notification).await {
                warn!(
                    "Failed to deliver notification for {} via {}: {}",
                    request.device_id,
                    sink.name(),
                    e
                );
            }
        }
        if let Err(e) = sink.close().await {
            warn!("Failed to close {} sink: {}", sink.name(), e);
        }
        debug!("Notification dispatcher stopped");
    });

    (tx, handle)
}
