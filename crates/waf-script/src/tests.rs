use crate::{RuleArtifact, RuleCompiler, SandboxExecutor, ValidationErrorKind};
use waf_types::{Decision, ExecutionBudget, RequestContext, RuntimeFault};

fn relaxed_budget() -> ExecutionBudget {
    ExecutionBudget {
        timeout_ms: 2_000,
        ..Default::default()
    }
}

fn request(path: &str) -> RequestContext {
    RequestContext::new("GET", "example.com", path)
        .with_header("User-Agent", "Mozilla/5.0")
        .with_client_ip("203.0.113.7")
}

fn run(code: &str, ctx: &RequestContext, budget: ExecutionBudget) -> Result<Decision, RuntimeFault> {
    let compiler = RuleCompiler::default();
    let compiled = compiler.compile(code).expect("rule compiles");
    let artifact = RuleArtifact {
        rule_id: "r1".to_string(),
        compiled,
        budget,
    };
    SandboxExecutor::new().execute(&artifact, ctx)
}

#[test]
fn test_compile_is_cached_by_content() {
    let compiler = RuleCompiler::default();
    let code = r#"if ctx.path == "/login" { block(429) } else { pass() }"#;

    let first = compiler.compile(code).unwrap();
    let second = compiler.compile(code).unwrap();

    assert!(std::sync::Arc::ptr_eq(&first, &second));
    let stats = compiler.cache_stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(first.hash, crate::code_hash(code));
}

#[test]
fn test_rejects_filesystem_and_network_primitives() {
    let compiler = RuleCompiler::default();

    let errors = compiler
        .compile(r#"let data = read_file("/etc/passwd"); pass()"#)
        .unwrap_err();
    assert_eq!(errors[0].kind, ValidationErrorKind::DisallowedIdentifier);
    assert!(errors[0].message.contains("read_file"));
    assert_eq!(errors[0].line, Some(1));

    let errors = compiler
        .compile("let r = fetch(\"http://evil.test\");\nhttp(r)")
        .unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].message.contains("fetch"));
    assert!(errors[1].message.contains("http"));
    assert_eq!(errors[1].line, Some(2));
}

#[test]
fn test_rejects_dynamic_code_and_clocks() {
    let compiler = RuleCompiler::default();
    for code in [
        r#"eval("block(403)")"#,
        r#"let f = Fn("block"); f.call(403)"#,
        "let t = timestamp(); pass()",
        "sleep(10.0); pass()",
        r#"import "os" as os; pass()"#,
    ] {
        let errors = compiler.compile(code).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| e.kind == ValidationErrorKind::DisallowedIdentifier),
            "{} should be rejected",
            code
        );
    }
}

#[test]
fn test_template_interpolation_is_scanned() {
    let compiler = RuleCompiler::default();
    let errors = compiler
        .compile("let s = `${timestamp()}`; pass()")
        .unwrap_err();
    assert!(errors[0].message.contains("timestamp"));
}

#[test]
fn test_quotes_inside_backtick_strings_do_not_hide_code() {
    let compiler = RuleCompiler::default();
    let code = "let a = `\"`; let f = Fn(\"block\"); let r = f.call(403); let b = `\"`; r";

    let errors = compiler.compile(code).unwrap_err();
    let names: Vec<_> = errors
        .iter()
        .filter(|e| e.kind == ValidationErrorKind::DisallowedIdentifier)
        .map(|e| e.message.as_str())
        .collect();
    assert_eq!(names.len(), 2, "{:?}", errors);
    assert!(names[0].contains("'Fn'"));
    assert!(names[1].contains("'call'"));
    assert_eq!(compiler.cache_stats().entries, 0);
}

#[test]
fn test_denied_calls_inside_functions_and_closures() {
    let compiler = RuleCompiler::default();
    for code in [
        "fn later() { timestamp() } pass()",
        "let f = |x| sleep(x); pass()",
        r#"let f = |x| x; call(f, 1); pass()"#,
    ] {
        let errors = compiler.compile(code).unwrap_err();
        assert!(
            errors
                .iter()
                .any(|e| e.kind == ValidationErrorKind::DisallowedIdentifier),
            "{} should be rejected",
            code
        );
    }
}

#[test]
fn test_denied_words_inside_strings_and_comments_are_fine() {
    let compiler = RuleCompiler::default();
    let code = r#"
        // block anything probing for eval or open redirects
        if ctx.path.contains("/eval") || ctx.path.contains("open") {
            return block(403, "fetch denied");
        }
        pass()
    "#;
    assert!(compiler.compile(code).is_ok());
}

#[test]
fn test_unknown_context_field() {
    let compiler = RuleCompiler::default();
    let errors = compiler
        .compile("if ctx.body == \"x\" { block(403) }")
        .unwrap_err();
    assert_eq!(errors[0].kind, ValidationErrorKind::UnknownContextField);
    assert!(errors[0].message.contains("ctx.body"));
}

#[test]
fn test_context_must_be_read_through_fields() {
    let compiler = RuleCompiler::default();
    for code in [
        "let c = ctx; if c.body == () { block(403) }",
        r#"if ctx["body"] == () { block(403) }"#,
        "let n = ctx.len(); pass()",
        "allow_if(ctx)",
    ] {
        let errors = compiler.compile(code).unwrap_err();
        assert_eq!(
            errors[0].kind,
            ValidationErrorKind::UnknownContextField,
            "{} should be rejected",
            code
        );
        assert_eq!(errors[0].line, Some(1));
    }

    let code = r#"
        let ua = ctx.headers["user-agent"];
        if ctx.query?.debug == "1" || ctx.path.to_lower().contains("/wp-") { block(403) }
    "#;
    assert!(compiler.compile(code).is_ok());
}

#[test]
fn test_syntax_and_undefined_variables() {
    let compiler = RuleCompiler::default();

    let errors = compiler.compile("if ctx.path == \"/\" { block(403)").unwrap_err();
    assert_eq!(errors[0].kind, ValidationErrorKind::Syntax);

    let errors = compiler.compile("if secret == 1 { block(403) }").unwrap_err();
    assert_eq!(errors[0].kind, ValidationErrorKind::Syntax);
}

#[test]
fn test_size_ceiling_and_empty() {
    let compiler = RuleCompiler::new(64, 16);

    let long = format!("let x = \"{}\"; pass()", "a".repeat(100));
    let errors = compiler.compile(&long).unwrap_err();
    assert_eq!(errors[0].kind, ValidationErrorKind::TooLarge);

    let errors = compiler.compile("   \n ").unwrap_err();
    assert_eq!(errors[0].kind, ValidationErrorKind::Empty);
}

#[test]
fn test_block_decision() {
    let code = r#"
        if ctx.path.starts_with("/admin") {
            return block(403, "forbidden", #{ "X-Reason": "admin" });
        }
        pass()
    "#;

    let decision = run(code, &request("/admin/users"), relaxed_budget()).unwrap();
    match decision {
        Decision::Block {
            status,
            body,
            headers,
        } => {
            assert_eq!(status, 403);
            assert_eq!(body, "forbidden");
            assert_eq!(headers.get("x-reason").map(String::as_str), Some("admin"));
        }
        other => panic!("expected block, got {:?}", other),
    }

    let decision = run(code, &request("/"), relaxed_budget()).unwrap();
    assert_eq!(decision, Decision::Continue);
}

#[test]
fn test_context_accessors() {
    let code = r#"
        if ctx.method == "POST" && ("debug" in ctx.query) && ctx.client_ip == "203.0.113.7" {
            return block(400);
        }
        if ("user-agent" in ctx.headers) && ctx.headers["user-agent"].contains("sqlmap") {
            return block(403);
        }
        allow()
    "#;

    let ctx = RequestContext::new("POST", "example.com", "/")
        .with_query("debug", "1")
        .with_client_ip("203.0.113.7");
    assert_eq!(run(code, &ctx, relaxed_budget()).unwrap(), Decision::block(400));

    let ctx = request("/").with_header("User-Agent", "sqlmap/1.7");
    assert_eq!(run(code, &ctx, relaxed_budget()).unwrap(), Decision::block(403));

    assert_eq!(
        run(code, &request("/"), relaxed_budget()).unwrap(),
        Decision::AllowAndStop
    );
}

#[test]
fn test_modify_headers() {
    let code = r#"set_header("X-WAF", "checked").set_header("x-client", ctx.client_ip)"#;
    let decision = run(code, &request("/"), relaxed_budget()).unwrap();

    match decision {
        Decision::Modify { headers } => {
            assert_eq!(headers.get("x-waf").map(String::as_str), Some("checked"));
            assert_eq!(
                headers.get("x-client").map(String::as_str),
                Some("203.0.113.7")
            );
        }
        other => panic!("expected modify, got {:?}", other),
    }
}

#[test]
fn test_unit_result_is_continue() {
    let decision = run("let x = 1 + 1;", &request("/"), relaxed_budget()).unwrap();
    assert_eq!(decision, Decision::Continue);
}

#[test]
fn test_operation_budget() {
    let budget = ExecutionBudget {
        timeout_ms: 60_000,
        max_operations: 1_000,
        ..Default::default()
    };
    let fault = run("let x = 0; loop { x += 1; }", &request("/"), budget).unwrap_err();
    assert_eq!(fault, RuntimeFault::OperationLimit { limit: 1_000 });
}

#[test]
fn test_timeout_watchdog() {
    let budget = ExecutionBudget {
        timeout_ms: 20,
        max_operations: 0,
        ..Default::default()
    };
    let fault = run("let x = 0; loop { x += 1; }", &request("/"), budget).unwrap_err();
    assert!(matches!(fault, RuntimeFault::Timeout { .. }), "{:?}", fault);
}

#[test]
fn test_memory_ceiling() {
    let budget = ExecutionBudget {
        timeout_ms: 60_000,
        max_string_size: 1024,
        ..Default::default()
    };
    let fault = run(r#"let s = "ab"; loop { s += s; }"#, &request("/"), budget).unwrap_err();
    assert_eq!(fault.kind(), "memory_limit");
}

#[test]
fn test_invalid_return_and_throw() {
    let fault = run("42", &request("/"), relaxed_budget()).unwrap_err();
    assert_eq!(fault.kind(), "invalid_decision");

    let fault = run("block(7)", &request("/"), relaxed_budget()).unwrap_err();
    assert_eq!(fault.kind(), "invalid_decision");

    let fault = run(r#"throw "boom";"#, &request("/"), relaxed_budget()).unwrap_err();
    assert_eq!(fault.kind(), "script");
}

#[test]
fn test_execution_is_deterministic() {
    let code = r#"
        let score = 0;
        for c in ctx.path.chars() { if c == '.' { score += 1; } }
        if score > 3 { block(403) } else { set_header("x-score", score.to_string()) }
    "#;
    let ctx = request("/a.b.c");
    let first = run(code, &ctx, relaxed_budget()).unwrap();
    let second = run(code, &ctx, relaxed_budget()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_fault_does_not_leak_into_next_call() {
    let compiler = RuleCompiler::default();
    let executor = SandboxExecutor::new();

    let looping = RuleArtifact {
        rule_id: "loop".to_string(),
        compiled: compiler.compile("loop { let y = 1; }").unwrap(),
        budget: ExecutionBudget {
            timeout_ms: 60_000,
            max_operations: 500,
            ..Default::default()
        },
    };
    let simple = RuleArtifact {
        rule_id: "simple".to_string(),
        compiled: compiler.compile("block(401)").unwrap(),
        budget: relaxed_budget(),
    };

    assert!(executor.execute(&looping, &request("/")).is_err());
    assert_eq!(
        executor.execute(&simple, &request("/")).unwrap(),
        Decision::block(401)
    );
}
