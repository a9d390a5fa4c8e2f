use chrono::Utc;
use metrics::{counter, histogram};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};
use waf_script::{RuleArtifact, RuleCompiler, SandboxExecutor, ValidationError};
use waf_types::{Decision, DomainPolicy, PolicyTable, RequestContext, Rule, RuntimeFault};

use crate::execution::{FaultAction, FaultLog, FaultRecord, TestResult};
use crate::scope::select_rules;
use crate::store::RuleStore;

const DEFAULT_FAULT_LOG_CAPACITY: usize = 1024;

/// 规则流水线
///
/// Takes one snapshot of the domain's rules per request and runs the
/// selected rules in order. Mutations landing mid-evaluation only affect the
/// next request.
pub struct PipelineCoordinator {
    store: Arc<RuleStore>,
    compiler: Arc<RuleCompiler>,
    executor: SandboxExecutor,
    policies: PolicyTable,
    faults: FaultLog,
}

impl PipelineCoordinator {
    pub fn new(store: Arc<RuleStore>, policies: PolicyTable) -> Self {
        let compiler = store.compiler().clone();
        Self {
            store,
            compiler,
            executor: SandboxExecutor::new(),
            policies,
            faults: FaultLog::new(DEFAULT_FAULT_LOG_CAPACITY),
        }
    }

    pub fn with_fault_log_capacity(mut self, capacity: usize) -> Self {
        self.faults = FaultLog::new(capacity);
        self
    }

    pub fn policy(&self, domain: &str) -> &DomainPolicy {
        self.policies.get(domain)
    }

    /// 评估请求
    pub async fn evaluate(&self, domain: &str, ctx: &RequestContext) -> Decision {
        let never = AtomicBool::new(false);
        self.evaluate_with_abort(domain, ctx, &never)
            .await
            .unwrap_or_default()
    }

    /// Like [`evaluate`](Self::evaluate), but gives up between rule calls once
    /// `abort` is set, returning `None` and dropping accumulated headers.
    pub async fn evaluate_with_abort(
        &self,
        domain: &str,
        ctx: &RequestContext,
        abort: &AtomicBool,
    ) -> Option<Decision> {
        let policy = self.policies.get(domain);
        counter!("waf_pipeline_evaluations_total", 1, "domain" => domain.to_string());

        let document = match self.store.snapshot(domain).await {
            Ok(document) => document,
            Err(e) => {
                error!(domain = %domain, error = %e, "No rule snapshot available, applying fail policy");
                return Some(policy.fault_decision().unwrap_or(Decision::Continue));
            }
        };

        if !document.enabled {
            debug!(domain = %domain, revision = document.revision, "Protection disabled for domain");
            return Some(finish(domain, Decision::Continue));
        }

        let (scope, rules) = select_rules(&document, ctx);
        debug!(domain = %domain, scope = %scope, rules = rules.len(), revision = document.revision, "Evaluating rules");

        let mut headers = BTreeMap::new();
        for rule in rules {
            if abort.load(Ordering::Acquire) {
                debug!(domain = %domain, "Pipeline abandoned");
                return None;
            }

            match self.run_rule(domain, rule, ctx, policy) {
                Ok(Decision::Continue) => {}
                Ok(Decision::Modify { headers: added }) => headers.extend(added),
                Ok(decision) => {
                    debug!(domain = %domain, rule_id = %rule.id, decision = decision.label(), "Terminal decision");
                    return Some(finish(domain, decision));
                }
                Err(fault) => {
                    let substitute = policy.fault_decision();
                    let action = if substitute.is_some() {
                        FaultAction::Blocked
                    } else {
                        FaultAction::Skipped
                    };
                    self.record_fault(domain, rule, fault, action).await;
                    if let Some(decision) = substitute {
                        return Some(finish(domain, decision));
                    }
                }
            }
        }

        if abort.load(Ordering::Acquire) {
            return None;
        }
        let decision = if headers.is_empty() {
            Decision::Continue
        } else {
            Decision::Modify { headers }
        };
        Some(finish(domain, decision))
    }

    /// 试运行未保存的规则脚本
    pub fn test_rule(
        &self,
        domain: &str,
        code: &str,
        ctx: &RequestContext,
    ) -> Result<TestResult, Vec<ValidationError>> {
        let compiled = self.compiler.compile(code)?;
        let budget = self.policies.get(domain).budget;

        let start = Instant::now();
        let result = self.executor.execute_compiled(&compiled, ctx, &budget);
        let duration_us = start.elapsed().as_micros() as u64;

        Ok(match result {
            Ok(decision) => TestResult {
                decision: Some(decision),
                fault: None,
                duration_us,
            },
            Err(fault) => TestResult {
                decision: None,
                fault: Some(fault),
                duration_us,
            },
        })
    }

    pub async fn recent_faults(&self, domain: &str, limit: usize) -> Vec<FaultRecord> {
        self.faults.recent(domain, limit).await
    }

    fn run_rule(
        &self,
        domain: &str,
        rule: &Rule,
        ctx: &RequestContext,
        policy: &DomainPolicy,
    ) -> Result<Decision, RuntimeFault> {
        let compiled = self.compiler.compile(&rule.code).map_err(|errors| {
            RuntimeFault::script(format!(
                "stored rule no longer compiles: {}",
                errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            ))
        })?;
        let artifact = RuleArtifact {
            rule_id: rule.id.clone(),
            compiled,
            budget: policy.budget,
        };

        let start = Instant::now();
        let result = self.executor.execute(&artifact, ctx);
        histogram!(
            "waf_rule_duration_seconds",
            start.elapsed().as_secs_f64(),
            "domain" => domain.to_string()
        );
        result
    }

    async fn record_fault(&self, domain: &str, rule: &Rule, fault: RuntimeFault, action: FaultAction) {
        warn!(
            domain = %domain,
            rule_id = %rule.id,
            rule_name = %rule.name,
            kind = fault.kind(),
            action = ?action,
            "Rule execution fault: {}",
            fault
        );
        counter!(
            "waf_rule_faults_total",
            1,
            "domain" => domain.to_string(),
            "kind" => fault.kind()
        );
        self.faults
            .push(FaultRecord {
                domain: domain.to_string(),
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                fault,
                action,
                occurred_at: Utc::now(),
            })
            .await;
    }
}

fn finish(domain: &str, decision: Decision) -> Decision {
    counter!(
        "waf_pipeline_decisions_total",
        1,
        "domain" => domain.to_string(),
        "decision" => decision.label()
    );
    decision
}
