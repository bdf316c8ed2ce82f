mod app_config;
mod config_file;

pub use app_config::{AppConfig, CliOverrides};
