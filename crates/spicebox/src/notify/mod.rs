//! Low-weight notifications: what gets sent, whether it may be sent, and
//! where it goes.

mod dispatcher;
mod gate;
mod notification;
mod sink;

pub use dispatcher::spawn_dispatcher;
pub use dispatcher::DispatchSender;
pub use gate::notification_preference;
pub use gate::set_notification_preference;
pub use gate::DispatchGate;
pub use gate::FilePreferenceStore;
pub use gate::GateDenial;
pub use gate::NotificationGate;
pub use gate::NotificationPreference;
pub use gate::PermissionSource;
pub use gate::PermissionState;
pub use gate::PreferenceError;
pub use gate::PreferenceStore;
pub use gate::NOTIFICATIONS_KEY;
pub use notification::Notification;
pub use notification::NotificationRequest;
pub use notification::NOTIFICATION_AUTO_DISMISS;
pub use notification::NOTIFICATION_COOLDOWN;
pub use notification::TEST_NOTIFICATION_AUTO_DISMISS;
pub use notification::UNNAMED_CONTAINER;
pub use sink::LogSink;
pub use sink::MqttSink;
pub use sink::NotificationSink;
