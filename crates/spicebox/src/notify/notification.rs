use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use crate::model::Device;

/// Minimum time between two low-weight notifications for the same device.
pub const NOTIFICATION_COOLDOWN: Duration = Duration::from_secs(5);

/// How long a low-weight notification stays up before it is dismissed.
pub const NOTIFICATION_AUTO_DISMISS: Duration = Duration::from_secs(10);

/// How long the test notification stays up.
pub const TEST_NOTIFICATION_AUTO_DISMISS: Duration = Duration::from_secs(3);

pub const UNNAMED_CONTAINER: &str = "Unnamed Container";

/// "For device D, at time T, with weight W and threshold M, a notification is
/// warranted." Produced by the notifier, consumed by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRequest {
    pub device_id: String,
    pub container_name: String,
    pub weight_g: f64,
    pub min_quantity_g: f64,
    pub image_url: Option<String>,
    pub at: DateTime<Utc>,
}

impl NotificationRequest {
    pub fn low_weight(device: &Device, weight_g: f64, at: DateTime<Utc>) -> Self {
        Self {
            device_id: device.device_id.clone(),
            container_name: device.display_name().to_string(),
            weight_g,
            min_quantity_g: device.threshold_g(),
            image_url: device.image_url.clone(),
            at,
        }
    }
}

/// A rendered notification, ready to hand to a sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Notifications sharing a tag replace each other.
    pub tag: String,
    pub icon: Option<String>,
    pub device_id: Option<String>,
    pub require_interaction: bool,
    pub auto_dismiss_secs: u64,
}

impl Notification {
    pub fn low_weight(request: &NotificationRequest) -> Self {
        let name = &request.container_name;
        Self {
            title: format!("Low Spice Alert: {}", name),
            body: format!(
                "{} is running low! Current: {}g, Minimum: {}g",
                name, request.weight_g, request.min_quantity_g
            ),
            tag: format!("spicebox-{}", request.device_id),
            icon: request.image_url.clone(),
            device_id: Some(request.device_id.clone()),
            require_interaction: true,
            auto_dismiss_secs: NOTIFICATION_AUTO_DISMISS.as_secs(),
        }
    }

    pub fn test() -> Self {
        Self {
            title: "Test Notification".to_string(),
            body: "This is a test notification from Spicebox!".to_string(),
            tag: "spicebox-test".to_string(),
            icon: None,
            device_id: None,
            require_interaction: false,
            auto_dismiss_secs: TEST_NOTIFICATION_AUTO_DISMISS.as_secs(),
        }
    }
}
