pub mod api;
pub mod backend;
pub mod config;
pub mod gauge;
pub mod model;
pub mod monitor;
pub mod mqtt;
pub mod notify;

pub use config::Config;
pub use config::LogLevel;
pub use gauge::FillLevel;
pub use gauge::Gauge;
pub use model::Device;
pub use model::Reading;
pub use model::ReadingEvent;
pub use monitor::Dashboard;
pub use monitor::Monitor;
pub use monitor::Notifier;
pub use monitor::Reconciler;
