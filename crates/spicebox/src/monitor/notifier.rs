//! Low-weight notification decisions.
//!
//! Each pass looks at every device once. A device is only re-evaluated when
//! its weight changed since the previous pass, and a low device produces at
//! most one request per [`NOTIFICATION_COOLDOWN`]. Coming back to or above
//! the threshold clears the cooldown, so the next drop notifies immediately.

use std::collections::HashMap;
use std::collections::HashSet;

use chrono::DateTime;
use chrono::Utc;
use tracing::debug;
use tracing::info;

use super::reconciler::LatestReadingMap;
use crate::model::Device;
use crate::model::Reading;
use crate::notify::DispatchGate;
use crate::notify::GateDenial;
use crate::notify::NotificationRequest;
use crate::notify::NOTIFICATION_COOLDOWN;

/// Whether a pass is running. A pass requested while one is running is
/// skipped, not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassState {
    #[default]
    Idle,
    Processing,
}

impl PassState {
    fn try_begin(&mut self) -> bool {
        match self {
            PassState::Idle => {
                *self = PassState::Processing;
                true
            }
            PassState::Processing => false,
        }
    }

    fn finish(&mut self) {
        *self = PassState::Idle;
    }
}

/// Outcome for one device in one pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    NoReading,
    Unchanged,
    Notify(NotificationRequest),
    CoolingDown,
    Denied(GateDenial),
    Normal,
}

#[derive(Debug, Default)]
pub struct Notifier {
    last_notified: HashMap<String, DateTime<Utc>>,
    last_processed: HashMap<String, Reading>,
    pass: PassState,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass_state(&self) -> PassState {
        self.pass
    }

    /// Run one pass over `devices`, returning the notifications to dispatch.
    pub fn evaluate(
        &mut self,
        devices: &[Device],
        latest: &LatestReadingMap,
        gate: &dyn DispatchGate,
        now: DateTime<Utc>,
    ) -> Vec<NotificationRequest> {
        if !self.pass.try_begin() {
            debug!("Notification pass already in progress, skipping");
            return Vec::new();
        }

        // Removed devices start over if they come back
        let ids: HashSet<&str> = devices.iter().map(|d| d.device_id.as_str()).collect();
        self.last_notified.retain(|id, _| ids.contains(id.as_str()));
        self.last_processed.retain(|id, _| ids.contains(id.as_str()));

        let requests = devices
            .iter()
            .filter_map(|device| match self.decide(device, latest, gate, now) {
                Decision::Notify(request) => Some(request),
                _ => None,
            })
            .collect();

        self.pass.finish();
        requests
    }

    fn decide(
        &mut self,
        device: &Device,
        latest: &LatestReadingMap,
        gate: &dyn DispatchGate,
        now: DateTime<Utc>,
    ) -> Decision {
        let device_id = &device.device_id;
        let Some(reading) = latest.get(device_id) else {
            return Decision::NoReading;
        };

        let weight_changed = self
            .last_processed
            .get(device_id)
            .is_none_or(|prev| prev.weight_g != reading.weight_g);
        if !weight_changed {
            return Decision::Unchanged;
        }

        let min_quantity = device.threshold_g();
        let decision = if reading.weight_g < min_quantity {
            self.decide_low(device, reading, gate, now)
        } else {
            if self.last_notified.remove(device_id).is_some() {
                info!("Device {} back to normal weight", device_id);
            }
            Decision::Normal
        };

        self.last_processed
            .insert(device_id.clone(), reading.clone());
        decision
    }

    fn decide_low(
        &mut self,
        device: &Device,
        reading: &Reading,
        gate: &dyn DispatchGate,
        now: DateTime<Utc>,
    ) -> Decision {
        let device_id = &device.device_id;

        if let Some(last) = self.last_notified.get(device_id) {
            // A clock that went backwards counts as still cooling down.
            let cooled = now
                .signed_duration_since(*last)
                .to_std()
                .map(|elapsed| elapsed > NOTIFICATION_COOLDOWN)
                .unwrap_or(false);
            if !cooled {
                debug!("Skipping notification for {}: cooldown active", device_id);
                return Decision::CoolingDown;
            }
        }

        if let Err(denial) = gate.check() {
            debug!("Not notifying for {}: {}", device_id, denial);
            return Decision::Denied(denial);
        }

        info!(
            "Low weight on {} ({}): {}g < {}g",
            device_id,
            device.display_name(),
            reading.weight_g,
            device.threshold_g()
        );
        self.last_notified.insert(device_id.clone(), now);
        Decision::Notify(NotificationRequest::low_weight(device, reading.weight_g, now))
    }
}
