//! Hosted backend access: device records and reading history.

mod rest;

use async_trait::async_trait;
use serde::Serialize;

pub use rest::RestBackend;

use crate::model::Device;
use crate::model::Reading;
use crate::model::DEFAULT_MAX_CAPACITY_G;
use crate::model::DEFAULT_MIN_QUANTITY_G;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Device id must not be empty")]
    EmptyDeviceId,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),
}

/// Where snapshot loads get their readings from.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// The most recent reading for `device_id` by `created_at`, if any.
    async fn fetch_latest_reading(&self, device_id: &str) -> Result<Option<Reading>, BackendError>;
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// All devices, newest first.
    async fn list_devices(&self) -> Result<Vec<Device>, BackendError>;

    async fn add_device(&self, device: &NewDevice) -> Result<Device, BackendError>;

    async fn update_device(
        &self,
        device_id: &str,
        update: &DeviceUpdate,
    ) -> Result<Device, BackendError>;

    async fn delete_device(&self, device_id: &str) -> Result<Device, BackendError>;
}

/// A device to register.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewDevice {
    #[serde(rename = "deviceid")]
    pub device_id: String,
    pub container_name: Option<String>,
    pub min_quantity_g: f64,
    pub max_capacity_g: f64,
    pub image_url: Option<String>,
}

impl NewDevice {
    /// Trims the id and name; an empty name registers an unnamed container.
    pub fn new(device_id: &str, container_name: Option<&str>) -> Result<Self, BackendError> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(BackendError::EmptyDeviceId);
        }

        Ok(Self {
            device_id: device_id.to_string(),
            container_name: container_name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            min_quantity_g: DEFAULT_MIN_QUANTITY_G,
            max_capacity_g: DEFAULT_MAX_CAPACITY_G,
            image_url: None,
        })
    }
}

/// Fields to change on an existing device; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_quantity_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_capacity_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl DeviceUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_device_trims_and_defaults() {
        let device = NewDevice::new("  spicebox-01 ", Some("  ")).unwrap();
        assert_eq!(device.device_id, "spicebox-01");
        assert_eq!(device.container_name, None);
        assert_eq!(device.min_quantity_g, 10.0);
        assert_eq!(device.max_capacity_g, 500.0);

        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["deviceid"], "spicebox-01");
        assert!(json["container_name"].is_null());
    }

    #[test]
    fn test_new_device_rejects_blank_id() {
        assert!(matches!(
            NewDevice::new("   ", Some("Cumin")),
            Err(BackendError::EmptyDeviceId)
        ));
    }

    #[test]
    fn test_update_serializes_only_set_fields() {
        let update = DeviceUpdate {
            min_quantity_g: Some(25.0),
            ..Default::default()
        };
        assert!(!update.is_empty());
        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"min_quantity_g":25.0}"#
        );
        assert!(DeviceUpdate::default().is_empty());
    }
}
