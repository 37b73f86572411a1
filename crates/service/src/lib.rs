pub mod config;
mod rescan;
mod service;
mod watch;

pub use config::{ConfigError, ServiceConfig};
pub use rescan::ScanStatus;
pub use service::{MusicService, ServiceError};
pub use watch::configure_watcher;
