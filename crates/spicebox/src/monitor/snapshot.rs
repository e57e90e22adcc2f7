use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::debug;
use tracing::warn;

use super::message::MonitorMessage;
use super::message::MonitorSender;
use super::reconciler::SnapshotRequest;
use crate::backend::ReadingSource;
use crate::model::Reading;

/// Fetch the latest reading of every requested device concurrently.
///
/// A failed or empty fetch only loses that device. Returns `None` if the
/// request was cancelled before all fetches finished; outstanding fetches
/// are aborted.
pub async fn load_snapshot(
    source: Arc<dyn ReadingSource>,
    request: &SnapshotRequest,
) -> Option<Vec<Reading>> {
    let mut fetches = JoinSet::new();
    for device_id in &request.device_ids {
        let source = source.clone();
        let device_id = device_id.clone();
        fetches.spawn(async move {
            let result = source.fetch_latest_reading(&device_id).await;
            (device_id, result)
        });
    }

    let mut readings = Vec::with_capacity(request.device_ids.len());
    loop {
        tokio::select! {
            biased;
            _ = request.cancel.cancelled() => {
                debug!("Snapshot generation {} cancelled", request.generation);
                return None;
            }
            next = fetches.join_next() => match next {
                None => break,
                Some(Ok((_, Ok(Some(reading))))) => readings.push(reading),
                Some(Ok((device_id, Ok(None)))) => {
                    debug!("No readings yet for {}", device_id);
                }
                Some(Ok((device_id, Err(e)))) => {
                    warn!("Failed to load latest reading for {}: {}", device_id, e);
                }
                Some(Err(e)) => {
                    warn!("Snapshot fetch task failed: {}", e);
                }
            }
        }
    }

    Some(readings)
}

/// Run a snapshot load in the background and report the result to the
/// monitor loop. Cancelled loads report nothing.
pub fn spawn_snapshot(source: Arc<dyn ReadingSource>, request: SnapshotRequest, tx: MonitorSender) {
    tokio::spawn(async move {
        let Some(readings) = load_snapshot(source, &request).await else {
            return;
        };
        debug!(
            "Snapshot generation {} loaded {} of {} devices",
            request.generation,
            readings.len(),
            request.device_ids.len()
        );
        let msg = MonitorMessage::SnapshotLoaded {
            generation: request.generation,
            readings,
        };
        if tx.send(msg).await.is_err() {
            debug!("Monitor gone before snapshot {} arrived", request.generation);
        }
    });
}
