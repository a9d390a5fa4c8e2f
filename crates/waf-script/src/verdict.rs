use rhai::plugin::*;
use rhai::Map;
use std::collections::BTreeMap;
use waf_types::{Decision, RuntimeFault};

/// Value a rule script hands back to the host.
#[derive(Debug, Clone)]
pub enum Verdict {
    Pass,
    Block { status: i64, body: String, headers: Map },
    Allow,
    Modify { headers: Map },
}

impl Verdict {
    /// Checks the script-built verdict and converts it into a `Decision`.
    pub fn into_decision(self) -> Result<Decision, RuntimeFault> {
        match self {
            Verdict::Pass => Ok(Decision::Continue),
            Verdict::Allow => Ok(Decision::AllowAndStop),
            Verdict::Block {
                status,
                body,
                headers,
            } => {
                if !(100..=599).contains(&status) {
                    return Err(RuntimeFault::invalid(format!(
                        "block status {} outside 100..=599",
                        status
                    )));
                }
                Ok(Decision::Block {
                    status: status as u16,
                    body,
                    headers: normalize_headers(headers)?,
                })
            }
            Verdict::Modify { headers } => {
                let headers = normalize_headers(headers)?;
                if headers.is_empty() {
                    Ok(Decision::Continue)
                } else {
                    Ok(Decision::Modify { headers })
                }
            }
        }
    }
}

fn normalize_headers(headers: Map) -> Result<BTreeMap<String, String>, RuntimeFault> {
    let mut out = BTreeMap::new();
    for (name, value) in headers {
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(RuntimeFault::invalid("empty header name"));
        }
        if !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(RuntimeFault::invalid(format!("invalid header name: {}", name)));
        }
        let value = value.to_string();
        if value.contains(['\r', '\n']) {
            return Err(RuntimeFault::invalid(format!(
                "header {} contains a line break",
                name
            )));
        }
        out.insert(name, value);
    }
    Ok(out)
}

/// 规则脚本可用的裁决函数
#[export_module]
pub mod verdict_api {
    use super::Verdict;
    use rhai::Map;

    pub fn pass() -> Verdict {
        Verdict::Pass
    }

    pub fn allow() -> Verdict {
        Verdict::Allow
    }

    pub fn block(status: i64) -> Verdict {
        Verdict::Block {
            status,
            body: String::new(),
            headers: Map::new(),
        }
    }

    #[rhai_fn(name = "block")]
    pub fn block_with_body(status: i64, body: &str) -> Verdict {
        Verdict::Block {
            status,
            body: body.to_string(),
            headers: Map::new(),
        }
    }

    #[rhai_fn(name = "block")]
    pub fn block_with_headers(status: i64, body: &str, headers: Map) -> Verdict {
        Verdict::Block {
            status,
            body: body.to_string(),
            headers,
        }
    }

    pub fn set_header(name: &str, value: &str) -> Verdict {
        let mut headers = Map::new();
        headers.insert(name.into(), value.into());
        Verdict::Modify { headers }
    }

    pub fn set_headers(headers: Map) -> Verdict {
        Verdict::Modify { headers }
    }

    /// `set_header("a", "1").set_header("b", "2")`
    #[rhai_fn(name = "set_header")]
    pub fn chain_header(verdict: Verdict, name: &str, value: &str) -> Verdict {
        match verdict {
            Verdict::Modify { mut headers } => {
                headers.insert(name.into(), value.into());
                Verdict::Modify { headers }
            }
            Verdict::Block {
                status,
                body,
                mut headers,
            } => {
                headers.insert(name.into(), value.into());
                Verdict::Block {
                    status,
                    body,
                    headers,
                }
            }
            Verdict::Pass => set_header(name, value),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_range_checked() {
        let v = Verdict::Block {
            status: 42,
            body: String::new(),
            headers: Map::new(),
        };
        assert!(matches!(
            v.into_decision(),
            Err(RuntimeFault::InvalidDecision { .. })
        ));
    }

    #[test]
    fn test_header_injection_rejected() {
        let mut headers = Map::new();
        headers.insert("x-a".into(), "1\r\nx-b: 2".into());
        let v = Verdict::Modify { headers };
        assert!(v.into_decision().is_err());
    }

    #[test]
    fn test_empty_modify_is_continue() {
        let v = Verdict::Modify {
            headers: Map::new(),
        };
        assert_eq!(v.into_decision().unwrap(), Decision::Continue);
    }
}
