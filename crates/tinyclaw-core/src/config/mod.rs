//! Configuration — schema + loader.

pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, save_config};
pub use schema::{
    AgentConfig, BusConfig, Config, GatewayConfig, HeartbeatConfig, ProviderConfig,
    SecurityConfig, SummarizerConfig, ToolsConfig,
};
