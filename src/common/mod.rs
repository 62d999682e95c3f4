pub mod config;
pub mod config_commands;
pub mod errors;

pub use config::{load_config, AppConfig, ConfigOverrides};
pub use errors::AppError;
