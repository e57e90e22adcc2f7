use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::message::MonitorMessage;
use super::message::MonitorSender;
use crate::backend::DeviceStore;
use crate::model::Device;

/// Poll the device list and forward it to the monitor whenever it changes.
///
/// The first successful load is always forwarded. Failed loads keep the
/// previous list.
pub async fn watch_devices(
    store: Arc<dyn DeviceStore>,
    tx: MonitorSender,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last: Option<Vec<Device>> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let devices = match store.list_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Error loading devices: {}", e);
                continue;
            }
        };

        if last.as_ref() == Some(&devices) {
            continue;
        }

        info!("Devices loaded: {}", devices.len());
        last = Some(devices.clone());
        if tx.send(MonitorMessage::DevicesChanged(devices)).await.is_err() {
            debug!("Monitor gone, stopping device watcher");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::backend::BackendError;
    use crate::backend::DeviceUpdate;
    use crate::backend::NewDevice;

    /// Returns each queued answer once, then repeats the last one.
    struct ScriptedStore {
        answers: Mutex<Vec<Result<Vec<Device>, u16>>>,
    }

    #[async_trait]
    impl DeviceStore for ScriptedStore {
        async fn list_devices(&self) -> Result<Vec<Device>, BackendError> {
            let mut answers = self.answers.lock().unwrap();
            let answer = if answers.len() > 1 {
                answers.remove(0)
            } else {
                answers[0].clone()
            };
            answer.map_err(|status| BackendError::Status {
                status,
                body: String::new(),
            })
        }

        async fn add_device(&self, _: &NewDevice) -> Result<Device, BackendError> {
            unimplemented!()
        }

        async fn update_device(&self, _: &str, _: &DeviceUpdate) -> Result<Device, BackendError> {
            unimplemented!()
        }

        async fn delete_device(&self, _: &str) -> Result<Device, BackendError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_forwards_only_changes() {
        let one = vec![Device::new("a")];
        let two = vec![Device::new("a"), Device::new("b")];
        let store = ScriptedStore {
            answers: Mutex::new(vec![
                Ok(one.clone()),
                Err(500),
                Ok(one.clone()),
                Ok(two.clone()),
            ]),
        };

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(watch_devices(
            Arc::new(store),
            tx,
            Duration::from_millis(1),
            cancel.clone(),
        ));

        let mut seen = Vec::new();
        while seen.len() < 2 {
            match rx.recv().await {
                Some(MonitorMessage::DevicesChanged(devices)) => seen.push(devices),
                other => panic!("unexpected message: {:?}", other),
            }
        }
        cancel.cancel();
        watcher.await.unwrap();

        assert_eq!(seen, vec![one, two]);
        assert!(rx.try_recv().is_err());
    }
}
