use thiserror::Error;

mod app_config;
mod config;
pub mod fields;
pub mod jobs;
pub mod settings;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use fields::{enabled_fields, FieldType};
pub use jobs::{ItemStatus, JobStatus};
pub use settings::GenerationSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
