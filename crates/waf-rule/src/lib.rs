pub mod error;
pub mod execution;
pub mod pipeline;
pub mod repository;
pub mod scope;
pub mod store;

pub use error::{Result, RuleError};
pub use execution::{FaultAction, FaultLog, FaultRecord, TestResult};
pub use pipeline::PipelineCoordinator;
pub use repository::{FileRuleRepository, MemoryRuleRepository, RuleRepository};
pub use scope::{request_scopes, select_rules};
pub use store::{RuleStore, StoreOptions};
