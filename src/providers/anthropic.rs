use super::{OutboundRequest, ProviderAdapter, MAX_TOKENS};
use crate::config::ProviderSettings;
use crate::error::RelayError;
use crate::types::{ChatMessage, ProviderId, Role};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const DISPLAY_NAME: &str = "Claude (Sonnet 4.5 by Anthropic)";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic API 请求格式
#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: Role,
    content: String,
}

/// Anthropic API 响应格式
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

/// 系统指令放在顶层 `system` 字段，消息中的 system 角色合并进去
fn convert_request<'a>(
    model: &'a str,
    system: &str,
    messages: &[ChatMessage],
) -> AnthropicRequest<'a> {
    let mut system = system.to_string();
    let mut converted = Vec::with_capacity(messages.len());

    for msg in messages {
        if msg.role == Role::System {
            system.push_str("\n\n");
            system.push_str(&msg.content);
        } else {
            converted.push(AnthropicMessage {
                role: msg.role,
                content: msg.content.clone(),
            });
        }
    }

    AnthropicRequest {
        model,
        max_tokens: MAX_TOKENS,
        system,
        messages: converted,
    }
}

pub struct ClaudeAdapter {
    settings: ProviderSettings,
}

impl ClaudeAdapter {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }
}

impl ProviderAdapter for ClaudeAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Claude
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
        let body = convert_request(self.settings.model_or(DEFAULT_MODEL), system, messages);

        Ok(OutboundRequest {
            url: format!(
                "{}/v1/messages",
                self.settings.api_base_or(DEFAULT_API_BASE)
            ),
            headers: vec![
                ("x-api-key", api_key.to_string()),
                ("anthropic-version", ANTHROPIC_VERSION.to_string()),
            ],
            body: serde_json::to_value(body)?,
        })
    }

    /// 提取 `content[0].text`
    fn extract_reply(&self, body: Value) -> Result<String> {
        let response: AnthropicResponse = serde_json::from_value(body)
            .map_err(|e| RelayError::malformed("claude", e.to_string()))?;

        response
            .content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .ok_or_else(|| RelayError::malformed("claude", "响应中没有文本内容"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::execute;
    use mockito::{Server, ServerGuard};
    use serde_json::json;

    async fn setup_mock_server() -> ServerGuard {
        Server::new_async().await
    }

    fn create_test_adapter(api_base: &str) -> ClaudeAdapter {
        ClaudeAdapter::new(ProviderSettings {
            api_key: Some("sk-ant-test".to_string()),
            api_base: Some(api_base.to_string()),
            model: None,
        })
    }

    #[test]
    fn test_convert_request_with_system() {
        let messages = [ChatMessage::system("Be terse"), ChatMessage::user("Hello")];
        let req = convert_request("claude-sonnet-4-5-20250929", "BASE", &messages);

        assert_eq!(req.system, "BASE\n\nBe terse");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, Role::User);
        assert_eq!(req.max_tokens, 1000);
    }

    #[test]
    fn test_build_request_shape() {
        let adapter = ClaudeAdapter::new(ProviderSettings::with_key("sk-ant-test"));
        let req = adapter
            .build_request(
                "sk-ant-test",
                "SYSTEM",
                &[ChatMessage::user("Hello"), ChatMessage::assistant("Hi")],
            )
            .unwrap();

        assert_eq!(req.url, "https://api.anthropic.com/v1/messages");
        assert_eq!(req.header("x-api-key"), Some("sk-ant-test"));
        assert_eq!(req.header("anthropic-version"), Some("2023-06-01"));
        assert_eq!(req.header("Authorization"), None);
        assert_eq!(
            req.body,
            json!({
                "model": "claude-sonnet-4-5-20250929",
                "max_tokens": 1000,
                "system": "SYSTEM",
                "messages": [
                    {"role": "user", "content": "Hello"},
                    {"role": "assistant", "content": "Hi"}
                ]
            })
        );
    }

    #[test]
    fn test_system_instruction_has_no_disclaimer() {
        let adapter = ClaudeAdapter::new(ProviderSettings::default());
        let today = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let system = adapter.system_instruction(today);
        assert!(system.starts_with("You are Claude (Sonnet 4.5 by Anthropic)."));
        assert!(!system.contains("live access to X"));
    }

    #[test]
    fn test_extract_reply_minimal_shape() {
        let adapter = create_test_adapter("http://unused");
        let reply = adapter
            .extract_reply(json!({"content": [{"text": "4"}]}))
            .unwrap();
        assert_eq!(reply, "4");
    }

    #[test]
    fn test_extract_reply_empty_content() {
        let adapter = create_test_adapter("http://unused");
        let err = adapter.extract_reply(json!({"content": []})).unwrap_err();
        assert!(matches!(err, RelayError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_execute_success() {
        let mut server = setup_mock_server().await;

        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-ant-test")
            .match_header("anthropic-version", "2023-06-01")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "claude-sonnet-4-5-20250929",
                "max_tokens": 1000,
                "messages": [{"role": "user", "content": "Hello"}]
            })))
            .with_status(200)
            .with_body(
                r#"{
                "id": "msg_test",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "Hello from Claude!"}],
                "model": "claude-sonnet-4-5-20250929",
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 15, "output_tokens": 25}
            }"#,
            )
            .create_async()
            .await;

        let adapter = create_test_adapter(&server.url());
        let client = reqwest::Client::new();

        let reply = execute(&client, &adapter, &[ChatMessage::user("Hello")])
            .await
            .unwrap();
        assert_eq!(reply, "Hello from Claude!");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_execute_api_error() {
        let mut server = setup_mock_server().await;

        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(401)
            .with_body(r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#)
            .create_async()
            .await;

        let adapter = create_test_adapter(&server.url());
        let client = reqwest::Client::new();

        let err = execute(&client, &adapter, &[ChatMessage::user("Hello")])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid x-api-key");

        mock.assert_async().await;
    }
}
