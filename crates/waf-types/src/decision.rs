use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 规则或流水线的裁决
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Decision {
    /// 无意见，继续
    Continue,

    /// 终止并拒绝请求
    Block {
        status: u16,
        #[serde(default)]
        body: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },

    /// 终止，跳过剩余规则并原样转发
    AllowAndStop,

    /// 注入请求头后继续
    Modify { headers: BTreeMap<String, String> },
}

impl Decision {
    pub fn block(status: u16) -> Self {
        Decision::Block {
            status,
            body: String::new(),
            headers: BTreeMap::new(),
        }
    }

    /// `block` and `allowAndStop` end the pipeline.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Decision::Block { .. } | Decision::AllowAndStop)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Decision::Continue => "continue",
            Decision::Block { .. } => "block",
            Decision::AllowAndStop => "allow_and_stop",
            Decision::Modify { .. } => "modify",
        }
    }
}

impl Default for Decision {
    fn default() -> Self {
        Decision::Continue
    }
}
