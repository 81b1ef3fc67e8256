use super::openai::{chat_completions_request, extract_choice_content};
use super::{OutboundRequest, ProviderAdapter};
use crate::config::ProviderSettings;
use crate::types::{ChatMessage, ProviderId, Role};
use crate::Result;
use serde_json::Value;

const DEFAULT_API_BASE: &str = "https://api.perplexity.ai";
const DEFAULT_MODEL: &str = "sonar-pro";
const DISPLAY_NAME: &str = "Perplexity (Sonar Pro)";

pub struct PerplexityAdapter {
    settings: ProviderSettings,
}

impl PerplexityAdapter {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }
}

/// Perplexity 要求 user/assistant 严格交替，只保留最后一条用户消息
fn last_user_message(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| ChatMessage::user(m.content.clone()))
        .into_iter()
        .collect()
}

impl ProviderAdapter for PerplexityAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Perplexity
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
            format!(
                "{}/chat/completions",
                self.settings.api_base_or(DEFAULT_API_BASE)
            ),
            self.settings.model_or(DEFAULT_MODEL),
            api_key,
            system,
            &last_user_message(messages),
        )
    }

    fn extract_reply(&self, body: Value) -> Result<String> {
        extract_choice_content(ProviderId::Perplexity, body)
    }
}
