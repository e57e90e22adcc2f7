//! Messages consumed by the monitor loop.
//!
//! Everything that can change the monitor's view (live inserts, device list
//! changes, finished snapshot loads) arrives as a `MonitorMessage` on one
//! channel, and the loop handles them one at a time.

use chrono::DateTime;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::model::Device;
use crate::model::Reading;
use crate::model::ReadingEvent;

/// Bounded, so a flooding broker applies backpressure to the stream task.
pub type MonitorSender = mpsc::Sender<MonitorMessage>;
pub type MonitorReceiver = mpsc::Receiver<MonitorMessage>;

#[derive(Debug, Clone)]
pub enum MonitorMessage {
    /// A reading was inserted upstream. `arrived_at` stands in for the
    /// event's timestamp when it has none.
    ReadingInserted {
        event: ReadingEvent,
        arrived_at: DateTime<Utc>,
    },

    /// The device list was (re)loaded.
    DevicesChanged(Vec<Device>),

    /// A snapshot load finished. Only applied if `generation` is still current.
    SnapshotLoaded {
        generation: u64,
        readings: Vec<Reading>,
    },
}
