pub mod config;
pub mod error;
pub mod types;

pub use config::{dht, protocol, service, ConfigError, NodeConfig};
pub use error::{MeshError, Result};
pub use types::{time_now_ms, TimeMs};
