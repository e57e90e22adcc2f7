use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use super::reconciler::LatestReadingMap;
use crate::gauge::Gauge;
use crate::model::Device;
use crate::model::Reading;

/// Read-only view of the monitor for the HTTP API.
///
/// Rebuilt by the monitor loop after every change and swapped in whole.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Dashboard {
    pub devices: Vec<DeviceStatus>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub device: Device,
    pub reading: Option<Reading>,
    pub gauge: Option<Gauge>,
    pub below_minimum: bool,
}

impl Dashboard {
    pub fn build(devices: &[Device], latest: &LatestReadingMap, now: DateTime<Utc>) -> Self {
        let devices = devices
            .iter()
            .map(|device| {
                let reading = latest.get(&device.device_id).cloned();
                let gauge = reading.as_ref().map(|r| Gauge::new(device, r));
                let below_minimum = reading
                    .as_ref()
                    .is_some_and(|r| r.weight_g < device.threshold_g());
                DeviceStatus {
                    device: device.clone(),
                    reading,
                    gauge,
                    below_minimum,
                }
            })
            .collect();

        Self {
            devices,
            updated_at: Some(now),
        }
    }

    pub fn device(&self, device_id: &str) -> Option<&DeviceStatus> {
        self.devices.iter().find(|s| s.device.device_id == device_id)
    }
}
