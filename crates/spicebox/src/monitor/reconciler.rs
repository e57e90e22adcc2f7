//! Latest-reading-per-device view.
//!
//! Readings come from two places: snapshot loads (one "latest reading"
//! fetch per device) and the live insert stream. Neither is ordered, and the
//! stream may redeliver, so every merge is decided by `created_at` alone:
//! a reading replaces the stored one iff it is at least as new. Ties go to
//! the reading applied last.

use std::collections::BTreeSet;
use std::collections::HashMap;

use chrono::DateTime;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::Reading;
use crate::model::ReadingEvent;

pub type LatestReadingMap = HashMap<String, Reading>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First reading for the device.
    Inserted,
    /// Replaced an older (or equally old) reading.
    Replaced,
    /// Older than what is stored; dropped.
    Stale,
}

impl MergeOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, MergeOutcome::Stale)
    }
}

/// A snapshot load the caller must run.
#[derive(Debug, Clone)]
pub struct SnapshotRequest {
    pub generation: u64,
    pub device_ids: Vec<String>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    latest: LatestReadingMap,
    device_ids: BTreeSet<String>,
    generation: u64,
    in_flight: Option<CancellationToken>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> &LatestReadingMap {
        &self.latest
    }

    pub fn get(&self, device_id: &str) -> Option<&Reading> {
        self.latest.get(device_id)
    }

    /// Generation of the most recently requested snapshot load.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Merge one reading, keeping the map monotonic per device.
    pub fn merge(&mut self, reading: Reading) -> MergeOutcome {
        match self.latest.get(&reading.device_id) {
            Some(stored) if reading.created_at < stored.created_at => {
                debug!(
                    "Ignoring older reading for {} ({} < {})",
                    reading.device_id, reading.created_at, stored.created_at
                );
                MergeOutcome::Stale
            }
            Some(stored) => {
                debug!(
                    "Updated reading for {}: {}g (was {}g)",
                    reading.device_id, reading.weight_g, stored.weight_g
                );
                self.latest.insert(reading.device_id.clone(), reading);
                MergeOutcome::Replaced
            }
            None => {
                debug!(
                    "First reading for {}: {}g",
                    reading.device_id, reading.weight_g
                );
                self.latest.insert(reading.device_id.clone(), reading);
                MergeOutcome::Inserted
            }
        }
    }

    /// Merge a live event. Returns `None` for malformed events, which leave
    /// the map untouched.
    pub fn ingest(&mut self, event: ReadingEvent, arrived_at: DateTime<Utc>) -> Option<MergeOutcome> {
        match event.into_reading(arrived_at) {
            Some(reading) => Some(self.merge(reading)),
            None => {
                debug!("Dropping malformed reading event");
                None
            }
        }
    }

    /// Track a new device-id set.
    ///
    /// When the set differs from the current one, any in-flight load is
    /// cancelled and superseded, and a request for the new set is returned
    /// (unless the new set is empty). Duplicates are removed.
    pub fn set_device_ids<I, S>(&mut self, ids: I) -> Option<SnapshotRequest>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: BTreeSet<String> = ids.into_iter().map(Into::into).collect();
        if ids == self.device_ids {
            return None;
        }

        self.cancel_snapshot();
        self.generation += 1;
        self.device_ids = ids;

        if self.device_ids.is_empty() {
            debug!("No devices to load readings for");
            return None;
        }

        let cancel = CancellationToken::new();
        self.in_flight = Some(cancel.clone());
        Some(SnapshotRequest {
            generation: self.generation,
            device_ids: self.device_ids.iter().cloned().collect(),
            cancel,
        })
    }

    /// Apply a finished snapshot load.
    ///
    /// Results from a superseded generation are discarded whole, including
    /// readings for devices that are still present. Returns whether any
    /// entry changed.
    pub fn apply_snapshot(&mut self, generation: u64, readings: Vec<Reading>) -> bool {
        if generation != self.generation {
            debug!(
                "Discarding snapshot generation {} (current is {})",
                generation, self.generation
            );
            return false;
        }
        self.in_flight = None;

        let mut changed = false;
        for reading in readings {
            if !self.device_ids.contains(&reading.device_id) {
                debug!("Snapshot returned unrequested device {}", reading.device_id);
                continue;
            }
            changed |= self.merge(reading).changed();
        }
        changed
    }

    /// Cancel the in-flight snapshot load, if any.
    pub fn cancel_snapshot(&mut self) {
        if let Some(cancel) = self.in_flight.take() {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_714_564_800 + secs, 0).unwrap()
    }

    fn reading(device: &str, weight: f64, secs: i64) -> Reading {
        Reading::new(device, weight, at(secs))
    }

    #[test]
    fn test_merge_is_monotonic() {
        let mut reconciler = Reconciler::new();
        let sequence = [(5, 1.0), (3, 2.0), (9, 3.0), (9, 4.0), (1, 5.0), (12, 6.0)];

        let mut high_water = None;
        for (secs, weight) in sequence {
            reconciler.merge(reading("a", weight, secs));
            let stored = reconciler.get("a").unwrap().created_at;
            if let Some(prev) = high_water {
                assert!(stored >= prev, "stored timestamp went backwards");
            }
            high_water = Some(stored);
        }
        assert_eq!(reconciler.get("a").unwrap().weight_g, 6.0);
    }

    #[test]
    fn test_out_of_order_delivery() {
        let newer = reading("a", 10.0, 10);
        let older = reading("a", 5.0, 5);

        let mut forward = Reconciler::new();
        forward.merge(older.clone());
        forward.merge(newer.clone());

        let mut backward = Reconciler::new();
        assert_eq!(backward.merge(newer.clone()), MergeOutcome::Inserted);
        assert_eq!(backward.merge(older), MergeOutcome::Stale);

        assert_eq!(forward.get("a"), Some(&newer));
        assert_eq!(backward.get("a"), Some(&newer));
    }

    #[test]
    fn test_equal_timestamps_last_applied_wins() {
        let mut reconciler = Reconciler::new();
        reconciler.merge(reading("a", 7.0, 3));
        assert_eq!(
            reconciler.merge(reading("a", 8.0, 3)),
            MergeOutcome::Replaced
        );
        assert_eq!(reconciler.get("a").unwrap().weight_g, 8.0);
    }

    #[test]
    fn test_devices_are_independent() {
        let mut reconciler = Reconciler::new();
        reconciler.merge(reading("a", 1.0, 100));
        assert_eq!(reconciler.merge(reading("b", 2.0, 1)), MergeOutcome::Inserted);
        assert_eq!(reconciler.latest().len(), 2);
    }

    #[test]
    fn test_malformed_event_is_dropped() {
        let mut reconciler = Reconciler::new();
        let event = ReadingEvent {
            device_id: None,
            weight_g: Some(3.0),
            created_at: Some(at(1)),
        };
        assert_eq!(reconciler.ingest(event, at(2)), None);
        assert!(reconciler.latest().is_empty());
    }

    #[test]
    fn test_event_without_timestamp_uses_arrival() {
        let mut reconciler = Reconciler::new();
        reconciler.merge(reading("a", 20.0, 5));

        let event = ReadingEvent {
            device_id: Some("a".to_string()),
            weight_g: Some(19.0),
            created_at: None,
        };
        assert_eq!(reconciler.ingest(event, at(6)), Some(MergeOutcome::Replaced));
        assert_eq!(reconciler.get("a").unwrap().created_at, at(6));
    }

    #[test]
    fn test_same_device_set_does_not_restart() {
        let mut reconciler = Reconciler::new();
        assert!(reconciler.set_device_ids(["a", "b"]).is_some());
        assert!(reconciler.set_device_ids(["b", "a", "a"]).is_none());
        assert_eq!(reconciler.generation(), 1);
    }

    #[test]
    fn test_snapshot_request_deduplicates() {
        let mut reconciler = Reconciler::new();
        let request = reconciler.set_device_ids(["b", "a", "b"]).unwrap();
        assert_eq!(request.device_ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(request.generation, 1);
        assert!(reconciler.snapshot_in_flight());
    }

    #[test]
    fn test_empty_device_set_cancels_without_new_load() {
        let mut reconciler = Reconciler::new();
        let request = reconciler.set_device_ids(["a"]).unwrap();
        assert!(reconciler.set_device_ids(Vec::<String>::new()).is_none());
        assert!(request.cancel.is_cancelled());
        assert!(!reconciler.snapshot_in_flight());
    }

    #[test]
    fn test_snapshot_does_not_downgrade_live_update() {
        let mut reconciler = Reconciler::new();
        let request = reconciler.set_device_ids(["a"]).unwrap();

        // Live event lands while the load is in flight.
        reconciler.merge(reading("a", 3.0, 20));

        let changed = reconciler.apply_snapshot(request.generation, vec![reading("a", 40.0, 10)]);
        assert!(!changed);
        assert_eq!(reconciler.get("a").unwrap().weight_g, 3.0);
        assert!(!reconciler.snapshot_in_flight());
    }

    #[test]
    fn test_superseded_snapshot_is_discarded() {
        let mut reconciler = Reconciler::new();
        let stale = reconciler.set_device_ids(["a", "b"]).unwrap();
        let current = reconciler.set_device_ids(["a", "b", "c"]).unwrap();
        assert!(stale.cancel.is_cancelled());
        assert!(!current.cancel.is_cancelled());

        // Live event for the new generation.
        reconciler.merge(reading("a", 12.0, 5));

        // The stale load resolves late with a newer-looking row for "a" and
        // a row for "b"; neither may be applied.
        let changed = reconciler.apply_snapshot(
            stale.generation,
            vec![reading("a", 99.0, 50), reading("b", 99.0, 50)],
        );
        assert!(!changed);
        assert_eq!(reconciler.get("a").unwrap().weight_g, 12.0);
        assert!(reconciler.get("b").is_none());

        assert!(reconciler.apply_snapshot(
            current.generation,
            vec![reading("b", 30.0, 1), reading("c", 31.0, 1)],
        ));
        assert_eq!(reconciler.get("b").unwrap().weight_g, 30.0);
        assert_eq!(reconciler.get("c").unwrap().weight_g, 31.0);
    }

    #[test]
    fn test_snapshot_ignores_unrequested_devices() {
        let mut reconciler = Reconciler::new();
        let request = reconciler.set_device_ids(["a"]).unwrap();
        assert!(!reconciler.apply_snapshot(request.generation, vec![reading("z", 1.0, 1)]));
        assert!(reconciler.get("z").is_none());
    }
}
