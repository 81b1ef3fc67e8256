//! 客户端聚合：同一条消息并发发往多个提供商，各自结果互不影响

use crate::error::RelayError;
use crate::providers::routing::Dispatcher;
use crate::types::{ChatMessage, ProviderId, RawRelayRequest, RelayResult};
use crate::Result;
use futures_util::future::join_all;
use reqwest::Client;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// 发起单次中继调用的能力
#[allow(async_fn_in_trait)]
pub trait RelayClient {
    async fn relay(&self, provider: ProviderId, messages: Vec<ChatMessage>) -> RelayResult;
}

/// 进程内直接调用分发器
impl RelayClient for Dispatcher {
    async fn relay(&self, provider: ProviderId, messages: Vec<ChatMessage>) -> RelayResult {
        self.dispatch(RawRelayRequest::new(provider, messages)).await
    }
}

/// 通过 HTTP 调用远端中继
pub struct HttpRelayClient {
    client: Client,
    url: String,
    token: Option<String>,
}

impl HttpRelayClient {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(Client::new(), url, token)
    }

    pub fn with_client(client: Client, url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            token,
        }
    }

    async fn post(&self, body: &RawRelayRequest) -> Result<RelayResult> {
        let mut request = self.client.post(&self.url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        // 中继的 400 也携带 `{error}`，按响应体解析而不看状态码
        serde_json::from_str(&text).map_err(|_| {
            RelayError::upstream(status.as_u16(), text.chars().take(512).collect::<String>())
        })
    }
}

impl RelayClient for HttpRelayClient {
    async fn relay(&self, provider: ProviderId, messages: Vec<ChatMessage>) -> RelayResult {
        let body = RawRelayRequest::new(provider, messages);
        match self.post(&body).await {
            Ok(result) => result,
            Err(e) => RelayResult::failure(e.to_string()),
        }
    }
}

/// 一次扇出的合并结果
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedReplies {
    pub message: String,
    pub replies: BTreeMap<ProviderId, RelayResult>,
}

impl AggregatedReplies {
    pub fn get(&self, provider: ProviderId) -> Option<&RelayResult> {
        self.replies.get(&provider)
    }

    pub fn successes(&self) -> usize {
        self.replies.values().filter(|r| r.is_success()).count()
    }
}

/// 向选中的提供商并发发送同一条单轮消息，等待全部完成
pub async fn fan_out<C: RelayClient>(
    client: &C,
    message: &str,
    providers: &[ProviderId],
) -> Result<AggregatedReplies> {
    let selected: BTreeSet<ProviderId> = providers.iter().copied().collect();
    if selected.is_empty() {
        return Err(RelayError::NoProvidersSelected);
    }

    let messages = vec![ChatMessage::user(message)];
    let calls = selected.iter().map(|&provider| {
        let messages = messages.clone();
        async move {
            let result = client.relay(provider, messages).await;
            debug!(%provider, success = result.is_success(), "提供商调用结束");
            (provider, result)
        }
    });

    let replies = join_all(calls).await.into_iter().collect();

    Ok(AggregatedReplies {
        message: message.to_string(),
        replies,
    })
}
