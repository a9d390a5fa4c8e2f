use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 请求执行上下文
///
/// Created at request ingress and dropped with the response. Header names are
/// lower-cased so rules can index them without caring about case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub host: String,
    #[serde(default, deserialize_with = "lowercase_keys")]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub client_ip: String,
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            host: host.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = ip.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Host without port, lower-cased.
    pub fn hostname(&self) -> String {
        let host = self.host.trim();
        let host = match host.rsplit_once(':') {
            Some((name, port)) if !name.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
                name
            }
            _ => host,
        };
        host.trim_end_matches('.').to_ascii_lowercase()
    }

    /// First non-empty path segment, if any.
    pub fn first_path_segment(&self) -> Option<&str> {
        let path = self.path.split(['?', '#']).next().unwrap_or_default();
        path.split('/').find(|s| !s.is_empty())
    }
}

fn lowercase_keys<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v))
        .collect())
}
