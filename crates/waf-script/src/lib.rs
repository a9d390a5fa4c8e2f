//! Restricted rule language for WAF rules: static validation, a content-hash
//! compile cache and a per-call sandbox.

pub mod cache;
pub mod compiler;
pub mod error;
pub mod sandbox;
pub mod verdict;

pub use cache::{CacheStats, CompileCache};
pub use compiler::{CompiledRule, RuleCompiler, CONTEXT_FIELDS, DENIED_IDENTIFIERS};
pub use error::{ValidationError, ValidationErrorKind};
pub use sandbox::{RuleArtifact, SandboxExecutor};
pub use verdict::Verdict;

/// SHA-256 of rule source, hex encoded.
pub fn code_hash(code: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut h = Sha256::new();
    h.update(code.as_bytes());
    hex::encode(h.finalize())
}

#[cfg(test)]
mod tests;
