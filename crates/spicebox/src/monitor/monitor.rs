use std::error::Error;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::DateTime;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::dashboard::Dashboard;
use super::message::MonitorMessage;
use super::message::MonitorReceiver;
use super::message::MonitorSender;
use super::notifier::Notifier;
use super::reconciler::Reconciler;
use super::snapshot::spawn_snapshot;
use super::stream::ReadingStream;
use crate::backend::ReadingSource;
use crate::model::Device;
use crate::notify::DispatchGate;
use crate::notify::DispatchSender;

/// Capacity of the channel feeding the monitor loop
const MONITOR_CHANNEL_SIZE: usize = 1024;

/// One monitoring session.
///
/// Owns the latest-reading view, the notifier's per-device state and the
/// current device list. All of it is mutated only from [`Monitor::run`], one
/// message at a time, and dropped when the session ends.
pub struct Monitor {
    reconciler: Reconciler,
    notifier: Notifier,
    devices: Vec<Device>,

    source: Arc<dyn ReadingSource>,
    gate: Box<dyn DispatchGate>,
    dispatch_tx: DispatchSender,

    /// Published view (readers load the Arc, the loop stores a new one)
    dashboard: Arc<ArcSwap<Dashboard>>,

    message_tx: MonitorSender,
    message_rx: MonitorReceiver,
}

impl Monitor {
    pub fn new(
        source: Arc<dyn ReadingSource>,
        gate: Box<dyn DispatchGate>,
        dispatch_tx: DispatchSender,
    ) -> Self {
        let (message_tx, message_rx) = mpsc::channel(MONITOR_CHANNEL_SIZE);
        Self {
            reconciler: Reconciler::new(),
            notifier: Notifier::new(),
            devices: Vec::new(),
            source,
            gate,
            dispatch_tx,
            dashboard: Arc::new(ArcSwap::from_pointee(Dashboard::default())),
            message_tx,
            message_rx,
        }
    }

    /// Sender for feeding messages (device lists, events) into the loop.
    pub fn sender(&self) -> MonitorSender {
        self.message_tx.clone()
    }

    pub fn dashboard(&self) -> Arc<ArcSwap<Dashboard>> {
        self.dashboard.clone()
    }

    /// Run the session until `shutdown` is cancelled.
    ///
    /// The live subscription is taken once, up front, and released on the
    /// way out whatever ends the loop.
    pub async fn run(
        mut self,
        stream: Box<dyn ReadingStream>,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn Error + Send>> {
        info!("Monitor starting, subscribing to {}", stream.name());
        let subscription = stream.subscribe(self.message_tx.clone()).await?;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Monitor received shutdown");
                    break;
                }
                msg = self.message_rx.recv() => match msg {
                    Some(msg) => self.handle_message(msg, Utc::now()),
                    None => break,
                }
            }
        }

        self.reconciler.cancel_snapshot();
        // Nothing reads the channel from here on; fail pending sends.
        self.message_rx.close();
        info!("Closing subscription {}", subscription.name());
        subscription.close().await;
        info!("Monitor stopped");
        Ok(())
    }

    fn handle_message(&mut self, msg: MonitorMessage, now: DateTime<Utc>) {
        let changed = match msg {
            MonitorMessage::ReadingInserted { event, arrived_at } => self
                .reconciler
                .ingest(event, arrived_at)
                .is_some_and(|outcome| outcome.changed()),
            MonitorMessage::DevicesChanged(devices) => {
                self.set_devices(devices);
                true
            }
            MonitorMessage::SnapshotLoaded {
                generation,
                readings,
            } => self.reconciler.apply_snapshot(generation, readings),
        };

        if changed {
            self.refresh(now);
        }
    }

    fn set_devices(&mut self, devices: Vec<Device>) {
        debug!("Monitoring {} devices", devices.len());
        let ids: Vec<String> = devices.iter().map(|d| d.device_id.clone()).collect();
        self.devices = devices;

        if let Some(request) = self.reconciler.set_device_ids(ids) {
            info!(
                "Loading latest readings for {} devices (generation {})",
                request.device_ids.len(),
                request.generation
            );
            spawn_snapshot(self.source.clone(), request, self.message_tx.clone());
        }
    }

    /// Run a notifier pass over the current view and publish the dashboard.
    fn refresh(&mut self, now: DateTime<Utc>) {
        let requests = self.notifier.evaluate(
            &self.devices,
            self.reconciler.latest(),
            self.gate.as_ref(),
            now,
        );
        for request in requests {
            if let Err(e) = self.dispatch_tx.send(request) {
                warn!("Notification dispatcher gone, dropping {:?}", e.0.device_id);
            }
        }

        self.dashboard.store(Arc::new(Dashboard::build(
            &self.devices,
            self.reconciler.latest(),
            now,
        )));
    }
}
