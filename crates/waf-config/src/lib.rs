pub mod domain;
pub mod global;
pub mod loader;

pub use domain::DomainOverride;
pub use global::{
    AuthConfig, GlobalConfig, LoggingConfig, MetricsConfig, PipelineConfig, ServerConfig,
    StoreBackend, StoreConfig, ValidatorConfig,
};
pub use loader::ConfigLoader;
