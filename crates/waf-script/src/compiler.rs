use rhai::{ASTNode, Dynamic, Engine, Expr, OptimizationLevel, Position, Scope, Stmt, AST};
use std::sync::Arc;
use tracing::debug;

use crate::cache::{CacheStats, CompileCache};
use crate::code_hash;
use crate::error::{ValidationError, ValidationErrorKind};

pub const DEFAULT_MAX_CODE_BYTES: usize = 16 * 1024;
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// 规则脚本中唯一可见的变量
pub const CONTEXT_VAR: &str = "ctx";

/// Readable `ctx.<field>` accessors.
pub const CONTEXT_FIELDS: &[&str] = &["method", "path", "host", "headers", "client_ip", "query"];

/// Names that reach outside the rule's own data: dynamic code, modules,
/// clocks, sleeping, and anything that reads like filesystem/network/process access.
pub const DENIED_IDENTIFIERS: &[&str] = &[
    "eval", "Fn", "call", "curry", "import", "export", "global", "sleep", "timestamp", "fs",
    "file", "open", "read_file", "write_file", "http", "fetch", "socket", "net", "exec",
    "spawn", "system", "process", "env", "require", "shell",
];

/// 编译产物
#[derive(Debug)]
pub struct CompiledRule {
    /// SHA-256 of the source
    pub hash: String,
    pub ast: AST,
}

/// 规则校验与编译器
pub struct RuleCompiler {
    engine: Engine,
    max_code_bytes: usize,
    cache: CompileCache,
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CODE_BYTES, DEFAULT_CACHE_CAPACITY)
    }
}

impl RuleCompiler {
    pub fn new(max_code_bytes: usize, cache_capacity: usize) -> Self {
        let mut engine = Engine::new_raw();
        engine.set_strict_variables(true);
        // Folding would turn `Fn("..")` into a constant before the AST is inspected.
        engine.set_optimization_level(OptimizationLevel::None);
        engine.set_max_expr_depths(64, 32);

        Self {
            engine,
            max_code_bytes,
            cache: CompileCache::new(cache_capacity),
        }
    }

    pub fn max_code_bytes(&self) -> usize {
        self.max_code_bytes
    }

    /// Validates and compiles rule source, reusing the cached artifact for
    /// source seen before.
    pub fn compile(&self, code: &str) -> Result<Arc<CompiledRule>, Vec<ValidationError>> {
        let hash = code_hash(code);
        if let Some(compiled) = self.cache.get(&hash) {
            return Ok(compiled);
        }

        self.check_size(code)?;

        let mut scope = Scope::new();
        scope.push_dynamic(CONTEXT_VAR, Dynamic::UNIT);

        let ast = self.engine.compile_with_scope(&scope, code).map_err(|e| {
            vec![ValidationError::new(ValidationErrorKind::Syntax, e.0.to_string())
                .at(e.1.line(), e.1.position())]
        })?;

        let errors = inspect_ast(&ast);
        if !errors.is_empty() {
            return Err(errors);
        }

        let compiled = Arc::new(CompiledRule { hash, ast });
        self.cache.insert(compiled.clone());
        debug!(hash = %compiled.hash, "Rule compiled");
        Ok(compiled)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn check_size(&self, code: &str) -> Result<(), Vec<ValidationError>> {
        if code.trim().is_empty() {
            return Err(vec![ValidationError::new(
                ValidationErrorKind::Empty,
                "rule code is empty",
            )]);
        }
        if code.len() > self.max_code_bytes {
            return Err(vec![ValidationError::new(
                ValidationErrorKind::TooLarge,
                format!(
                    "rule code is {} bytes, limit is {}",
                    code.len(),
                    self.max_code_bytes
                ),
            )]);
        }
        Ok(())
    }
}

/// Walks the parsed rule, function bodies included, and reports every
/// denied call or variable plus any use of `ctx` other than `ctx.<field>`.
fn inspect_ast(ast: &AST) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    ast.walk(&mut |path: &[ASTNode]| {
        let Some(node) = path.last() else {
            return true;
        };
        match node {
            ASTNode::Stmt(Stmt::Import(..)) => errors.push(denied("import", node.position())),
            ASTNode::Stmt(Stmt::Export(..)) => errors.push(denied("export", node.position())),
            ASTNode::Expr(expr) => {
                if let Err(e) = check_expr(expr, path) {
                    errors.push(e);
                }
            }
            _ => {}
        }
        true
    });

    errors
}

fn check_expr(expr: &Expr, path: &[ASTNode]) -> Result<(), ValidationError> {
    match expr {
        Expr::FnCall(call, pos) | Expr::MethodCall(call, pos) => {
            if call.is_qualified() {
                return Err(denied(call.namespace.root(), *pos));
            }
            if DENIED_IDENTIFIERS.contains(&call.name.as_str()) {
                return Err(denied(call.name.as_str(), *pos));
            }
        }
        Expr::Variable(var, _, pos) => {
            let name = var.1.as_str();
            if !var.2.is_empty() {
                return Err(denied(var.2.root(), *pos));
            }
            if DENIED_IDENTIFIERS.contains(&name) {
                return Err(denied(name, *pos));
            }
            if name == CONTEXT_VAR {
                let parent = path.len().checked_sub(2).map(|i| &path[i]);
                return check_context_access(expr, parent)
                    .map_err(|e| e.at(pos.line(), pos.position()));
            }
        }
        _ => {}
    }
    Ok(())
}

/// `ctx` must be the receiver of a property chain that starts with a
/// readable field. Aliasing, indexing and method calls on `ctx` itself are rejected.
fn check_context_access(var: &Expr, parent: Option<&ASTNode>) -> Result<(), ValidationError> {
    let field = match parent {
        Some(ASTNode::Expr(Expr::Dot(chain, ..))) if std::ptr::eq(&chain.lhs, var) => {
            leading_property(&chain.rhs)
        }
        _ => None,
    };

    match field {
        Some(name) if CONTEXT_FIELDS.contains(&name) => Ok(()),
        Some(name) => Err(ValidationError::new(
            ValidationErrorKind::UnknownContextField,
            format!(
                "ctx.{} is not available; readable fields are {}",
                name,
                CONTEXT_FIELDS.join(", ")
            ),
        )),
        None => Err(ValidationError::new(
            ValidationErrorKind::UnknownContextField,
            format!(
                "ctx may only be read as ctx.<field>; readable fields are {}",
                CONTEXT_FIELDS.join(", ")
            ),
        )),
    }
}

fn leading_property(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Property(prop, _) => Some(prop.2.as_str()),
        Expr::Dot(chain, ..) | Expr::Index(chain, ..) => leading_property(&chain.lhs),
        _ => None,
    }
}

fn denied(name: &str, pos: Position) -> ValidationError {
    ValidationError::new(
        ValidationErrorKind::DisallowedIdentifier,
        format!("'{}' is not permitted in rule code", name),
    )
    .at(pos.line(), pos.position())
}
