// Configuration module
// Public interface for configuration loading

pub mod constants;
mod env_file;
mod loader;
mod settings;

pub use env_file::update_env_key;
pub use loader::load_config;
pub use settings::{AuthConfig, RelayConfig, ServerConfig, UpstreamConfig};
