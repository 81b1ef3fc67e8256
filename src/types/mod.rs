use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// 聊天消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// 创建用户消息
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// 创建助手消息
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// 创建系统消息
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 支持的上游提供商（固定集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi = 0,
    Claude = 1,
    Grok = 2,
    Perplexity = 3,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::OpenAi,
        ProviderId::Claude,
        ProviderId::Grok,
        ProviderId::Perplexity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Claude => "claude",
            ProviderId::Grok => "grok",
            ProviderId::Perplexity => "perplexity",
        }
    }

    /// 该提供商凭证所在的环境变量名
    pub fn env_var(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "OPENAI_API_KEY",
            ProviderId::Claude => "CLAUDE_API_KEY",
            ProviderId::Grok => "GROK_API_KEY",
            ProviderId::Perplexity => "PERPLEXITY_API_KEY",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| RelayError::UnknownProvider(s.to_string()))
    }
}

/// 中继端点收到的原始请求体，字段均可能缺失；`provider` 可以是任意 JSON 值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRelayRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
}

impl RawRelayRequest {
    pub fn new(provider: ProviderId, messages: Vec<ChatMessage>) -> Self {
        Self {
            provider: Some(Value::from(provider.as_str())),
            messages: Some(messages),
        }
    }

    /// 用给定的提供商名称构造，名称不必在支持列表中
    pub fn named(provider: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            provider: Some(Value::String(provider.into())),
            messages: Some(messages),
        }
    }

    /// 校验必填字段并解析提供商
    pub fn validate(self) -> Result<RelayRequest, RelayError> {
        let provider = self.provider.and_then(provider_name);
        let (provider, messages) = match (provider, self.messages) {
            (Some(p), Some(m)) if !m.is_empty() => (p, m),
            _ => return Err(RelayError::MissingFields),
        };

        Ok(RelayRequest {
            provider: provider.parse()?,
            messages,
        })
    }
}

/// 空值（null、""、false、0）视为缺失；其余非字符串值按 JSON 文本参与匹配
fn provider_name(value: Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// 校验通过的中继请求
#[derive(Debug, Clone, PartialEq)]
pub struct RelayRequest {
    pub provider: ProviderId,
    pub messages: Vec<ChatMessage>,
}

/// 单个提供商的调用结果，序列化为 `{"content":..}` 或 `{"error":..}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayResult {
    Success { content: String },
    Failure { error: String },
}

impl RelayResult {
    pub fn success(content: impl Into<String>) -> Self {
        RelayResult::Success {
            content: content.into(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        RelayResult::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RelayResult::Success { .. })
    }
}

impl From<crate::Result<String>> for RelayResult {
    fn from(result: crate::Result<String>) -> Self {
        match result {
            Ok(content) => RelayResult::Success { content },
            Err(e) => RelayResult::Failure {
                error: e.to_string(),
            },
        }
    }
}
