//! Core data types shared by the monitor, the backend client and the MQTT
//! reading stream.
//!
//! Field names on the wire follow the backend's table columns (`deviceid`,
//! `weight_g`, `created_at`, ...).

use chrono::DateTime;
use chrono::NaiveDateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Minimum quantity assumed for devices that have none configured.
pub const DEFAULT_MIN_QUANTITY_G: f64 = 10.0;

/// Capacity assumed for devices that have none configured.
pub const DEFAULT_MAX_CAPACITY_G: f64 = 500.0;

/// A monitored spice container.
///
/// Owned by the backend; the monitor only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "deviceid")]
    pub device_id: String,

    #[serde(default)]
    pub container_name: Option<String>,

    /// Low-weight threshold in grams. `None` means [`DEFAULT_MIN_QUANTITY_G`].
    #[serde(default)]
    pub min_quantity_g: Option<f64>,

    /// Container capacity in grams. `None` means [`DEFAULT_MAX_CAPACITY_G`].
    #[serde(default)]
    pub max_capacity_g: Option<f64>,

    #[serde(default)]
    pub image_url: Option<String>,
}

impl Device {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            container_name: None,
            min_quantity_g: None,
            max_capacity_g: None,
            image_url: None,
        }
    }

    pub fn with_min_quantity(mut self, grams: f64) -> Self {
        self.min_quantity_g = Some(grams);
        self
    }

    pub fn with_max_capacity(mut self, grams: f64) -> Self {
        self.max_capacity_g = Some(grams);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = Some(name.into());
        self
    }

    /// Threshold below which the container counts as low.
    pub fn threshold_g(&self) -> f64 {
        self.min_quantity_g.unwrap_or(DEFAULT_MIN_QUANTITY_G)
    }

    /// Capacity used for gauges. Non-positive capacities fall back to the default.
    pub fn capacity_g(&self) -> f64 {
        match self.max_capacity_g {
            Some(c) if c.is_finite() && c > 0.0 => c,
            _ => DEFAULT_MAX_CAPACITY_G,
        }
    }

    /// Name shown to users; empty names count as unnamed.
    pub fn display_name(&self) -> &str {
        match self.container_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => crate::notify::UNNAMED_CONTAINER,
        }
    }
}

/// One timestamped weight measurement.
///
/// `weight_g` is untrusted and may be negative or exceed the container's
/// capacity. `created_at` is the only ordering key between readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(rename = "deviceid")]
    pub device_id: String,

    #[serde(deserialize_with = "deserialize_weight")]
    pub weight_g: f64,

    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Reading {
    pub fn new(device_id: impl Into<String>, weight_g: f64, created_at: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.into(),
            weight_g,
            created_at,
        }
    }
}

/// A "reading inserted" event as delivered by the live stream.
///
/// Every field is optional on the wire. Events without a device id or a
/// weight cannot become a [`Reading`] and are dropped by the reconciler.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ReadingEvent {
    #[serde(default, rename = "deviceid")]
    pub device_id: Option<String>,

    #[serde(default, deserialize_with = "deserialize_optional_weight")]
    pub weight_g: Option<f64>,

    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ReadingEvent {
    /// Convert into a reading, using `arrived_at` when the event carries no
    /// timestamp of its own.
    pub fn into_reading(self, arrived_at: DateTime<Utc>) -> Option<Reading> {
        let device_id = self.device_id.filter(|id| !id.trim().is_empty())?;
        let weight_g = self.weight_g.filter(|w| w.is_finite())?;
        Some(Reading {
            device_id,
            weight_g,
            created_at: self.created_at.unwrap_or(arrived_at),
        })
    }
}

impl From<Reading> for ReadingEvent {
    fn from(reading: Reading) -> Self {
        Self {
            device_id: Some(reading.device_id),
            weight_g: Some(reading.weight_g),
            created_at: Some(reading.created_at),
        }
    }
}

/// Parse a backend timestamp.
///
/// Accepts RFC 3339 with an offset, or a naive ISO-8601 timestamp (with `T`
/// or a space as separator) which is taken to be UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let s = s.trim();
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(rfc_err) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
            .map(|naive| naive.and_utc())
            .map_err(|_| rfc_err),
    }
}

/// Deserialize a weight that may arrive as a number or a numeric string.
///
/// Devices report through different firmware revisions; older ones send
/// the weight as a string.
fn deserialize_optional_weight<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct Weight;

    impl<'de> de::Visitor<'de> for Weight {
        type Value = Option<f64>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("finite number, numeric string, or null")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            deserializer.deserialize_any(Weight)
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() {
                return Err(E::invalid_value(de::Unexpected::Float(v), &self));
            }
            Ok(Some(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            match v.trim().parse::<f64>() {
                Ok(weight) if weight.is_finite() => Ok(Some(weight)),
                _ => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
            }
        }
    }

    deserializer.deserialize_any(Weight)
}

fn deserialize_weight<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_optional_weight(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("weight_g must not be null"))
}

fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) => parse_timestamp(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_timestamp(&s).map_err(serde::de::Error::custom)
}
