//! HTTP front end for the dataqna SQL generation pipeline

pub mod config;
pub mod http;
pub mod llm;
pub mod logging;
pub mod metrics;

pub use config::{Config, ConfigError};
pub use http::{router, AppState};
pub use metrics::Metrics;
