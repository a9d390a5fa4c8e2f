pub mod context;
pub mod decision;
pub mod fault;
pub mod naming;
pub mod policy;
pub mod rule;

pub use context::RequestContext;
pub use decision::Decision;
pub use fault::RuntimeFault;
pub use naming::{validate_domain, validate_slug, ROOT_SLUG};
pub use policy::{DomainPolicy, ExecutionBudget, FailPolicy, PolicyTable};
pub use rule::{DomainStatus, Rule, RuleDraft, RulePatch, RuleSetDocument, RuleStatus};
