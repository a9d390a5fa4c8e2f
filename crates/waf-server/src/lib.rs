pub mod app;
pub mod logging;
pub mod metrics;

pub use app::{build_state, serve, validate_rule_file};
