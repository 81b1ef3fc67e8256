use super::openai::{chat_completions_request, extract_choice_content};
use super::{OutboundRequest, ProviderAdapter};
use crate::config::ProviderSettings;
use crate::types::{ChatMessage, ProviderId};
use crate::Result;
use serde_json::Value;

const DEFAULT_API_BASE: &str = "https://api.x.ai/v1";
const DEFAULT_MODEL: &str = "grok-4";
const DISPLAY_NAME: &str = "Grok 4 by xAI";

/// xAI API 无法读取 X 的实时数据，必须如实告知
const NO_LIVE_X_ACCESS: &str = "IMPORTANT: You are being accessed via the xAI API, which does NOT have live access to X (Twitter) posts or trends. \
You cannot see real-time X data. \
If asked about current X trends, tweets, or posts, you must clearly state that you don't have live X access via the API and cannot provide real-time information.";

pub struct GrokAdapter {
    settings: ProviderSettings,
}

impl GrokAdapter {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }
}

impl ProviderAdapter for GrokAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Grok
    }

    fn display_name(&self) -> &str {
        DISPLAY_NAME
    }

    fn credential(&self) -> Option<&str> {
        self.settings.api_key()
    }

    fn capability_note(&self) -> Option<&'static str> {
        Some(NO_LIVE_X_ACCESS)
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
            messages,
        )
    }

    fn extract_reply(&self, body: Value) -> Result<String> {
        extract_choice_content(ProviderId::Grok, body)
    }
}
