use crate::types::ProviderId;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct ProviderCounters {
    successful: AtomicU64,
    failed: AtomicU64,
}

/// 简单的指标收集器
#[derive(Debug, Default)]
pub struct Metrics {
    total_requests: AtomicU64,
    rejected_requests: AtomicU64,
    providers: [ProviderCounters; 4],
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录校验失败的请求
    pub fn record_rejected(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录成功请求
    pub fn record_success(&self, provider: ProviderId) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.providers[provider.index()]
            .successful
            .fetch_add(1, Ordering::Relaxed);
    }

    /// 记录失败请求
    pub fn record_failure(&self, provider: ProviderId) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.providers[provider.index()]
            .failed
            .fetch_add(1, Ordering::Relaxed);
    }

    /// 导出 Prometheus 格式
    pub fn export_prometheus(&self) -> String {
        let mut out = format!(
            "# HELP chatrelay_requests_total Total number of relay requests\n\
             # TYPE chatrelay_requests_total counter\n\
             chatrelay_requests_total {}\n\
             # HELP chatrelay_requests_rejected Requests rejected by validation\n\
             # TYPE chatrelay_requests_rejected counter\n\
             chatrelay_requests_rejected {}\n",
            self.total_requests.load(Ordering::Relaxed),
            self.rejected_requests.load(Ordering::Relaxed),
        );

        out.push_str(
            "# HELP chatrelay_provider_requests Provider calls by outcome\n\
             # TYPE chatrelay_provider_requests counter\n",
        );
        for id in ProviderId::ALL {
            let counters = &self.providers[id.index()];
            let _ = writeln!(
                out,
                "chatrelay_provider_requests{{provider=\"{}\",outcome=\"success\"}} {}",
                id,
                counters.successful.load(Ordering::Relaxed)
            );
            let _ = writeln!(
                out,
                "chatrelay_provider_requests{{provider=\"{}\",outcome=\"failure\"}} {}",
                id,
                counters.failed.load(Ordering::Relaxed)
            );
        }

        out
    }
}

/// 获取全局指标实例
pub fn global_metrics() -> &'static Arc<Metrics> {
    use once_cell::sync::Lazy;
    static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| Arc::new(Metrics::new()));
    &METRICS
}
