use thiserror::Error;

/// 错误分类，对应中继对外暴露的四类失败
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 请求本身不完整或格式错误，未发出任何上游调用
    Validation,
    /// 缺少凭证或配置无效
    Configuration,
    /// 上游返回了结构化错误
    Provider,
    /// 网络或解析失败
    Transport,
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Missing provider or messages")]
    MissingFields,

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("No providers selected")]
    NoProvidersSelected,

    #[error("{0} not configured")]
    MissingCredential(&'static str),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML 解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("{0}")]
    Provider(String),

    #[error("Upstream API error: {status} - {message}")]
    UpstreamError { status: u16, message: String },

    #[error("{0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid JSON from provider: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unexpected {provider} response: {detail}")]
    MalformedResponse { provider: String, detail: String },
}

impl RelayError {
    pub fn config(msg: impl Into<String>) -> Self {
        RelayError::ConfigError(msg.into())
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        RelayError::UpstreamError {
            status,
            message: message.into(),
        }
    }

    pub fn malformed(provider: impl Into<String>, detail: impl Into<String>) -> Self {
        RelayError::MalformedResponse {
            provider: provider.into(),
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::MissingFields
            | RelayError::UnknownProvider(_)
            | RelayError::InvalidBody(_)
            | RelayError::NoProvidersSelected => ErrorKind::Validation,
            RelayError::MissingCredential(_)
            | RelayError::ConfigError(_)
            | RelayError::IoError(_)
            | RelayError::YamlError(_) => ErrorKind::Configuration,
            RelayError::Provider(_) | RelayError::UpstreamError { .. } => ErrorKind::Provider,
            RelayError::HttpError(_)
            | RelayError::JsonError(_)
            | RelayError::MalformedResponse { .. } => ErrorKind::Transport,
        }
    }
}
