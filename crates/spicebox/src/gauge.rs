//! Fill gauge shown for each device on the dashboard.

use serde::Serialize;

use crate::model::Device;
use crate::model::Reading;

/// Coarse fill level, by percentage of capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum FillLevel {
    #[strum(serialize = "Low!")]
    Critical,
    #[strum(serialize = "Getting low")]
    GettingLow,
    #[strum(serialize = "Half full")]
    HalfFull,
    #[strum(serialize = "Good level")]
    Good,
}

impl FillLevel {
    pub fn from_percent(percent: u32) -> Self {
        match percent {
            0..=29 => FillLevel::Critical,
            30..=49 => FillLevel::GettingLow,
            50..=69 => FillLevel::HalfFull,
            _ => FillLevel::Good,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gauge {
    /// Weight clamped to `[0, capacity]`.
    pub displayed_g: f64,
    pub capacity_g: f64,
    pub percent: u32,
    /// Grams consumed from a full container, never negative.
    pub used_g: f64,
    pub level: FillLevel,
    pub status: String,
}

impl Gauge {
    pub fn new(device: &Device, reading: &Reading) -> Self {
        let capacity_g = device.capacity_g();
        let displayed_g = clamp_weight(reading.weight_g, capacity_g);
        let percent = (displayed_g / capacity_g * 100.0).round() as u32;
        let level = FillLevel::from_percent(percent);
        let used_g = if reading.weight_g.is_finite() {
            (capacity_g - reading.weight_g).max(0.0)
        } else {
            capacity_g
        };

        Self {
            displayed_g,
            capacity_g,
            percent,
            used_g,
            level,
            status: level.to_string(),
        }
    }
}

/// Clamp an untrusted weight into `[0, max]` for display. Non-finite
/// weights display as empty.
pub fn clamp_weight(weight: f64, max: f64) -> f64 {
    if !weight.is_finite() {
        return 0.0;
    }
    weight.clamp(0.0, max)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn gauge_for(weight: f64, capacity: Option<f64>) -> Gauge {
        let mut device = Device::new("spicebox-01");
        device.max_capacity_g = capacity;
        Gauge::new(&device, &Reading::new("spicebox-01", weight, Utc::now()))
    }

    #[test]
    fn test_clamp_weight() {
        assert_eq!(clamp_weight(-3.0, 500.0), 0.0);
        assert_eq!(clamp_weight(612.0, 500.0), 500.0);
        assert_eq!(clamp_weight(250.0, 500.0), 250.0);
        assert_eq!(clamp_weight(f64::NAN, 500.0), 0.0);
        assert_eq!(clamp_weight(f64::INFINITY, 500.0), 0.0);
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(FillLevel::from_percent(0), FillLevel::Critical);
        assert_eq!(FillLevel::from_percent(29), FillLevel::Critical);
        assert_eq!(FillLevel::from_percent(30), FillLevel::GettingLow);
        assert_eq!(FillLevel::from_percent(50), FillLevel::HalfFull);
        assert_eq!(FillLevel::from_percent(70), FillLevel::Good);
        assert_eq!(FillLevel::from_percent(100), FillLevel::Good);
    }

    #[test]
    fn test_gauge_default_capacity() {
        let gauge = gauge_for(125.0, None);
        assert_eq!(gauge.capacity_g, 500.0);
        assert_eq!(gauge.percent, 25);
        assert_eq!(gauge.used_g, 375.0);
        assert_eq!(gauge.level, FillLevel::Critical);
        assert_eq!(gauge.status, "Low!");
    }

    #[test]
    fn test_gauge_overfull_reading_is_clamped() {
        let gauge = gauge_for(260.0, Some(200.0));
        assert_eq!(gauge.displayed_g, 200.0);
        assert_eq!(gauge.percent, 100);
        assert_eq!(gauge.used_g, 0.0);
        assert_eq!(gauge.status, "Good level");
    }

    #[test]
    fn test_gauge_negative_reading() {
        let gauge = gauge_for(-12.0, Some(100.0));
        assert_eq!(gauge.displayed_g, 0.0);
        assert_eq!(gauge.percent, 0);
        assert_eq!(gauge.used_g, 112.0);
    }

    #[test]
    fn test_gauge_percent_rounds() {
        assert_eq!(gauge_for(333.0, Some(1000.0)).percent, 33);
        assert_eq!(gauge_for(336.0, Some(1000.0)).percent, 34);
    }
}
