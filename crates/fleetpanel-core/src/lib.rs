pub mod config;
pub mod duration;
pub mod time;

pub use config::{ConfigError, PanelConfig, PollerConfig, ServerConfig};
pub use duration::parse_duration;
pub use time::epoch_millis;
