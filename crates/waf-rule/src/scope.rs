use waf_types::{RequestContext, Rule, RuleSetDocument, ROOT_SLUG};

/// Scopes a request can match, most specific first: subdomain label, first
/// path segment, then the root.
pub fn request_scopes(domain: &str, ctx: &RequestContext) -> Vec<String> {
    let mut scopes = Vec::with_capacity(3);
    let host = ctx.hostname();

    if let Some(sub) = host
        .strip_suffix(domain)
        .and_then(|prefix| prefix.strip_suffix('.'))
    {
        if !sub.is_empty() {
            scopes.push(sub.to_string());
        }
    }
    if let Some(segment) = ctx.first_path_segment() {
        let segment = segment.to_ascii_lowercase();
        if !scopes.contains(&segment) {
            scopes.push(segment);
        }
    }
    scopes.push(ROOT_SLUG.to_string());
    scopes
}

/// Enabled rules of the most specific scope that has any, in ascending order.
pub fn select_rules<'a>(
    document: &'a RuleSetDocument,
    ctx: &RequestContext,
) -> (String, Vec<&'a Rule>) {
    for scope in request_scopes(&document.domain, ctx) {
        let mut rules: Vec<&Rule> = document.enabled().filter(|r| r.slug == scope).collect();
        if !rules.is_empty() {
            rules.sort_by_key(|r| r.order);
            return (scope, rules);
        }
    }
    (ROOT_SLUG.to_string(), Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use waf_types::{RuleDraft, RuleStatus};

    fn document(slugs: &[(&str, RuleStatus)]) -> RuleSetDocument {
        let rules = slugs
            .iter()
            .enumerate()
            .map(|(i, (slug, status))| {
                let mut rule = Rule::from_draft(
                    "example.com",
                    RuleDraft::new(format!("r{}", i), "pass()").with_slug(*slug),
                    i as u32,
                );
                rule.status = *status;
                rule
            })
            .collect();
        RuleSetDocument::empty("example.com").next(rules)
    }

    #[test]
    fn test_scopes_order() {
        let ctx = RequestContext::new("GET", "api.example.com:443", "/v1/users");
        assert_eq!(request_scopes("example.com", &ctx), vec!["api", "v1", "@"]);

        let ctx = RequestContext::new("GET", "example.com", "/");
        assert_eq!(request_scopes("example.com", &ctx), vec!["@"]);

        // a host that merely ends with the domain text is not a subdomain
        let ctx = RequestContext::new("GET", "notexample.com", "/");
        assert_eq!(request_scopes("example.com", &ctx), vec!["@"]);
    }

    #[test]
    fn test_exact_slug_wins_over_root() {
        let doc = document(&[
            ("@", RuleStatus::Enabled),
            ("api", RuleStatus::Enabled),
            ("@", RuleStatus::Enabled),
        ]);

        let ctx = RequestContext::new("GET", "api.example.com", "/");
        let (scope, rules) = select_rules(&doc, &ctx);
        assert_eq!(scope, "api");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "r1");

        let ctx = RequestContext::new("GET", "www.example.com", "/");
        let (scope, rules) = select_rules(&doc, &ctx);
        assert_eq!(scope, "@");
        let names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["r0", "r2"]);
    }

    #[test]
    fn test_disabled_scope_falls_back_to_root() {
        let doc = document(&[("@", RuleStatus::Enabled), ("api", RuleStatus::Disabled)]);
        let ctx = RequestContext::new("GET", "api.example.com", "/");
        let (scope, rules) = select_rules(&doc, &ctx);
        assert_eq!(scope, "@");
        assert_eq!(rules.len(), 1);
    }
}
