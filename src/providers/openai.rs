use super::{OutboundRequest, ProviderAdapter, MAX_TOKENS};
use crate::config::ProviderSettings;
use crate::error::RelayError;
use crate::types::{ChatMessage, ProviderId};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const DISPLAY_NAME: &str = "ChatGPT (GPT-4o by OpenAI)";

/// chat/completions 请求格式（OpenAI、Grok、Perplexity 通用）
#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionsRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// 构建 chat/completions 请求：系统指令在前，随后是对话消息
pub(crate) fn chat_completions_request(
    url: String,
    model: &str,
    api_key: &str,
    system: &str,
    messages: &[ChatMessage],
) -> Result<OutboundRequest> {
    let mut all_messages = Vec::with_capacity(messages.len() + 1);
    all_messages.push(ChatMessage::system(system));
    all_messages.extend_from_slice(messages);

    let body = ChatCompletionsRequest {
        model,
        messages: all_messages,
        max_tokens: MAX_TOKENS,
    };

    Ok(OutboundRequest {
        url,
        headers: vec![("Authorization", format!("Bearer {}", api_key))],
        body: serde_json::to_value(body)?,
    })
}

/// 提取 `choices[0].message.content`
pub(crate) fn extract_choice_content(provider: ProviderId, body: Value) -> Result<String> {
    let response: ChatCompletionsResponse = serde_json::from_value(body)
        .map_err(|e| RelayError::malformed(provider.as_str(), e.to_string()))?;

    response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| RelayError::malformed(provider.as_str(), "响应中没有 choices"))?
        .message
        .content
        .ok_or_else(|| RelayError::malformed(provider.as_str(), "回复内容为空"))
}

pub struct OpenAiAdapter {
    settings: ProviderSettings,
}

impl OpenAiAdapter {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }

    fn url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.api_base_or(DEFAULT_API_BASE)
        )
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn display_name(&self) -> &str {
        DISPLAY_NAME
    }

    fn credential(&self) -> Option<&str> {
        self.settings.api_key()
    }

    fn build_request(
        &self,
        api_key: &str,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<OutboundRequest> {
        chat_completions_request(
            self.url(),
            self.settings.model_or(DEFAULT_MODEL),
            api_key,
            system,
            messages,
        )
    }

    fn extract_reply(&self, body: Value) -> Result<String> {
        extract_choice_content(ProviderId::OpenAi, body)
    }
}
