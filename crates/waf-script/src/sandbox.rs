use rhai::module_resolvers::DummyModuleResolver;
use rhai::packages::{
    BasicArrayPackage, BasicMapPackage, BasicMathPackage, CorePackage, LogicPackage,
    MoreStringPackage, Package,
};
use rhai::{Dynamic, Engine, EvalAltResult, Module, Scope, Shared};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use waf_types::{Decision, ExecutionBudget, RequestContext, RuntimeFault};

use crate::compiler::{CompiledRule, CONTEXT_VAR};
use crate::verdict::{verdict_api, Verdict};

const TIMEOUT_TOKEN: &str = "timeout";
// progress callback checks the clock every N operations
const CLOCK_CHECK_INTERVAL: u64 = 64;

/// 规则执行单元：规则 ID + 编译产物 + 预算
#[derive(Debug, Clone)]
pub struct RuleArtifact {
    pub rule_id: String,
    pub compiled: Arc<CompiledRule>,
    pub budget: ExecutionBudget,
}

/// `ctx` as seen from rule code.
#[derive(Serialize)]
struct ScriptContext<'a> {
    method: &'a str,
    path: &'a str,
    host: &'a str,
    headers: &'a BTreeMap<String, String>,
    client_ip: &'a str,
    query: &'a BTreeMap<String, String>,
}

impl<'a> From<&'a RequestContext> for ScriptContext<'a> {
    fn from(ctx: &'a RequestContext) -> Self {
        Self {
            method: &ctx.method,
            path: &ctx.path,
            host: &ctx.host,
            headers: &ctx.headers,
            client_ip: &ctx.client_ip,
            query: &ctx.query_params,
        }
    }
}

/// 沙箱执行器
///
/// Every call gets its own engine assembled from immutable shared packages, so
/// limits are per call and nothing a rule does outlives the call. There is no
/// time package, no module loading and no `eval`.
pub struct SandboxExecutor {
    packages: Vec<Shared<Module>>,
}

impl Default for SandboxExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxExecutor {
    pub fn new() -> Self {
        let packages = vec![
            CorePackage::new().as_shared_module(),
            LogicPackage::new().as_shared_module(),
            BasicMathPackage::new().as_shared_module(),
            BasicArrayPackage::new().as_shared_module(),
            BasicMapPackage::new().as_shared_module(),
            MoreStringPackage::new().as_shared_module(),
            Shared::new(rhai::exported_module!(verdict_api)),
        ];
        Self { packages }
    }

    pub fn execute(
        &self,
        artifact: &RuleArtifact,
        context: &RequestContext,
    ) -> Result<Decision, RuntimeFault> {
        self.run(&artifact.rule_id, &artifact.compiled, context, &artifact.budget)
    }

    /// Runs compiled code that is not (yet) part of a stored rule.
    pub fn execute_compiled(
        &self,
        compiled: &CompiledRule,
        context: &RequestContext,
        budget: &ExecutionBudget,
    ) -> Result<Decision, RuntimeFault> {
        self.run("dry-run", compiled, context, budget)
    }

    fn run(
        &self,
        rule_id: &str,
        compiled: &CompiledRule,
        context: &RequestContext,
        budget: &ExecutionBudget,
    ) -> Result<Decision, RuntimeFault> {
        let started = Instant::now();
        let engine = self.build_engine(rule_id, budget, started);

        let ctx = rhai::serde::to_dynamic(ScriptContext::from(context))
            .map_err(|e| RuntimeFault::script(e.to_string()))?;
        let mut scope = Scope::new();
        scope.push_constant_dynamic(CONTEXT_VAR, ctx);

        let result = engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &compiled.ast)
            .map_err(|e| classify(*e, budget, started))?;

        let type_name = result.type_name();
        if result.is_unit() {
            return Ok(Decision::Continue);
        }
        match result.try_cast::<Verdict>() {
            Some(verdict) => verdict.into_decision(),
            None => Err(RuntimeFault::invalid(format!(
                "rule returned {} instead of a verdict",
                type_name
            ))),
        }
    }

    fn build_engine(&self, rule_id: &str, budget: &ExecutionBudget, started: Instant) -> Engine {
        let mut engine = Engine::new_raw();
        for package in &self.packages {
            engine.register_global_module(package.clone());
        }
        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");

        engine.set_max_operations(budget.max_operations);
        engine.set_max_string_size(budget.max_string_size);
        engine.set_max_array_size(budget.max_collection_size);
        engine.set_max_map_size(budget.max_collection_size);
        engine.set_max_call_levels(budget.max_call_depth);

        let deadline = started + budget.timeout();
        engine.on_progress(move |ops| {
            if ops % CLOCK_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
                Some(Dynamic::from(TIMEOUT_TOKEN))
            } else {
                None
            }
        });

        let id = rule_id.to_string();
        engine.on_print(move |text| debug!(rule_id = %id, "rule print: {}", text));
        let id = rule_id.to_string();
        engine.on_debug(move |text, _source, pos| {
            debug!(rule_id = %id, line = ?pos.line(), "rule debug: {}", text)
        });

        engine
    }
}

fn classify(err: EvalAltResult, budget: &ExecutionBudget, started: Instant) -> RuntimeFault {
    match err {
        EvalAltResult::ErrorTerminated(_, _) => RuntimeFault::Timeout {
            elapsed_ms: started.elapsed().as_millis() as u64,
        },
        EvalAltResult::ErrorTooManyOperations(_) => RuntimeFault::OperationLimit {
            limit: budget.max_operations,
        },
        EvalAltResult::ErrorDataTooLarge(what, _) => RuntimeFault::MemoryLimit { detail: what },
        EvalAltResult::ErrorStackOverflow(_) => RuntimeFault::MemoryLimit {
            detail: "call stack".to_string(),
        },
        other => RuntimeFault::script(other.to_string()),
    }
}
