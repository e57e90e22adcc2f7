mod dashboard;
mod devices;
mod message;
#[allow(clippy::module_inception)]
mod monitor;
mod notifier;
mod reconciler;
mod snapshot;
mod stream;

pub use dashboard::Dashboard;
pub use dashboard::DeviceStatus;
pub use devices::watch_devices;
pub use message::MonitorMessage;
pub use message::MonitorReceiver;
pub use message::MonitorSender;
pub use monitor::Monitor;
pub use notifier::Decision;
pub use notifier::Notifier;
pub use notifier::PassState;
pub use reconciler::LatestReadingMap;
pub use reconciler::MergeOutcome;
pub use reconciler::Reconciler;
pub use reconciler::SnapshotRequest;
pub use snapshot::load_snapshot;
pub use stream::ReadingStream;
pub use stream::Subscription;
