use super::anthropic::ClaudeAdapter;
use super::grok::GrokAdapter;
use super::openai::OpenAiAdapter;
use super::perplexity::PerplexityAdapter;
use super::{build_http_client, execute, ProviderAdapter};
use crate::config::Config;
use crate::error::RelayError;
use crate::metrics;
use crate::types::{ProviderId, RawRelayRequest, RelayRequest, RelayResult};
use crate::Result;
use reqwest::Client;
use std::collections::HashMap;
use tracing::{info, warn};

/// 无状态的请求分发器：校验请求并路由到对应的 adapter
pub struct Dispatcher {
    adapters: HashMap<ProviderId, Box<dyn ProviderAdapter>>,
    client: Client,
}

impl Dispatcher {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = build_http_client(config)?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: &Config, client: Client) -> Self {
        let mut adapters: HashMap<ProviderId, Box<dyn ProviderAdapter>> = HashMap::new();
        for id in ProviderId::ALL {
            let settings = config.providers.get(id).clone();
            let adapter: Box<dyn ProviderAdapter> = match id {
                ProviderId::OpenAi => Box::new(OpenAiAdapter::new(settings)),
                ProviderId::Claude => Box::new(ClaudeAdapter::new(settings)),
                ProviderId::Grok => Box::new(GrokAdapter::new(settings)),
                ProviderId::Perplexity => Box::new(PerplexityAdapter::new(settings)),
            };
            adapters.insert(id, adapter);
        }

        Self { adapters, client }
    }

    pub fn adapter(&self, id: ProviderId) -> Option<&dyn ProviderAdapter> {
        self.adapters.get(&id).map(|a| a.as_ref())
    }

    /// 处理原始请求，所有错误都转换为 `RelayResult::Failure`
    pub async fn dispatch(&self, raw: RawRelayRequest) -> RelayResult {
        let metrics = metrics::global_metrics();

        let req = match raw.validate() {
            Ok(req) => req,
            Err(e) => {
                metrics.record_rejected();
                warn!(error = %e, "请求校验失败");
                return RelayResult::failure(e.to_string());
            }
        };

        let provider = req.provider;
        let result = self.route(&req).await;
        match &result {
            Ok(content) => {
                metrics.record_success(provider);
                info!(%provider, reply_chars = content.chars().count(), "上游调用成功");
            }
            Err(e) => {
                metrics.record_failure(provider);
                warn!(%provider, kind = ?e.kind(), error = %e, "上游调用失败");
            }
        }

        result.into()
    }

    /// 调用匹配的 adapter，不重试
    pub async fn route(&self, req: &RelayRequest) -> Result<String> {
        let adapter = self
            .adapter(req.provider)
            .ok_or_else(|| RelayError::UnknownProvider(req.provider.to_string()))?;

        execute(&self.client, adapter, &req.messages).await
    }
}
