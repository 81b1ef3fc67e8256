pub mod anthropic;
pub mod grok;
pub mod openai;
pub mod perplexity;
pub mod prompt;
pub mod routing;

use crate::config::Config;
use crate::error::RelayError;
use crate::types::{ChatMessage, ProviderId};
use crate::Result;
use chrono::{Local, NaiveDate};
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// 所有提供商共用的输出 token 上限
pub const MAX_TOKENS: u32 = 1000;

/// 上游错误响应体截断长度
const MAX_ERROR_BODY_CHARS: usize = 4096;

/// 一次上游调用所需的全部内容
pub struct OutboundRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

impl OutboundRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// 头部可能含凭证，只输出名称
impl fmt::Debug for OutboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.headers.iter().map(|(n, _)| *n).collect();
        f.debug_struct("OutboundRequest")
            .field("url", &self.url)
            .field("headers", &names)
            .field("body", &self.body)
            .finish()
    }
}

/// Provider adapter - 每个上游提供商一个实现
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    /// 写入系统指令的模型名称
    fn display_name(&self) -> &str;

    fn credential(&self) -> Option<&str>;

    /// 提供商特有的能力声明，追加在系统指令中
    fn capability_note(&self) -> Option<&'static str> {
        None
    }

    fn system_instruction(&self, today: NaiveDate) -> String {
        prompt::system_message(self.display_name(), self.capability_note(), today)
    }

    fn build_request(
        &self,
        api_key: &str,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<OutboundRequest>;

    fn extract_reply(&self, body: Value) -> Result<String>;
}

/// 根据配置构建上游 HTTP 客户端（连接池复用）
pub fn build_http_client(config: &Config) -> Result<Client> {
    let mut builder = Client::builder().pool_max_idle_per_host(10);
    if let Some(secs) = config.server.request_timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

/// 执行一次适配器调用：凭证检查 -> 构建请求 -> POST -> 解析响应
pub async fn execute(
    client: &Client,
    adapter: &dyn ProviderAdapter,
    messages: &[ChatMessage],
) -> Result<String> {
    let api_key = adapter
        .credential()
        .ok_or_else(|| RelayError::MissingCredential(adapter.id().env_var()))?;

    let system = adapter.system_instruction(Local::now().date_naive());
    let outbound = adapter.build_request(api_key, &system, messages)?;
    debug!(provider = %adapter.id(), url = %outbound.url, "发送上游请求");

    let mut request = client
        .post(&outbound.url)
        .header("Content-Type", "application/json");
    for (name, value) in &outbound.headers {
        request = request.header(*name, value);
    }

    let response = request.json(&outbound.body).send().await?;
    let status = response.status();
    let text = response.text().await?;

    let body: Value = match serde_json::from_str(&text) {
        Ok(body) => body,
        Err(_) if !status.is_success() => {
            return Err(RelayError::upstream(status.as_u16(), truncate(&text)));
        }
        Err(e) => return Err(e.into()),
    };

    // 结构化错误优先于状态码
    if let Some(message) = provider_error_message(&body) {
        return Err(RelayError::Provider(message));
    }

    if !status.is_success() {
        return Err(RelayError::upstream(status.as_u16(), truncate(&text)));
    }

    adapter.extract_reply(body)
}

/// 提取响应体中的 `error` 字段，空值（null、""、false、0）视为没有错误
fn provider_error_message(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(message) if message.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(message) => Some(message.clone()),
        error => Some(
            error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
        ),
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
