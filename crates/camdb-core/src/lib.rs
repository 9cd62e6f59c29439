pub mod app_config;
pub mod campaigns;
pub mod config;
pub mod kpi;
pub mod posts;
pub mod registry;

pub use app_config::{AppConfig, Environment};
pub use campaigns::{Account, Campaign, CampaignStatus};
pub use config::{load_app_config, load_app_config_from_env};
pub use kpi::{Kpi, KpiCategory, Link, LinkStatus, Scope};
pub use posts::{is_video_content_type, Post, PostCounter};
pub use registry::{AggregateFn, CategoryRegistry};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown KPI category: {0}")]
    UnknownCategory(String),

    #[error("invalid campaign status: {0}")]
    InvalidStatus(String),

    #[error("invalid link status: {0}")]
    InvalidLinkStatus(String),
}
