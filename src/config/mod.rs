use crate::error::RelayError;
use crate::types::ProviderId;
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// 中继共享凭证的环境变量
pub const AUTH_TOKEN_ENV: &str = "RELAY_AUTH_TOKEN";

static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

/// 行内 YAML 注释的起始位置：引号外、位于行首或空白之后的 `#`
fn comment_start(line: &str) -> usize {
    let mut quote = None;
    let mut prev = None;

    for (i, c) in line.char_indices() {
        match (quote, c) {
            (None, '#') if prev.map_or(true, char::is_whitespace) => return i,
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), _) if c == q => quote = None,
            _ => {}
        }
        prev = Some(c);
    }

    line.len()
}

/// 主配置结构
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// 服务端配置
#[derive(Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// 客户端需携带的静态 Bearer 凭证，未配置时不校验
    #[serde(default)]
    pub auth_token: Option<String>,
    /// 上游请求超时，未配置时沿用 HTTP 客户端默认行为
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            auth_token: None,
            request_timeout_secs: None,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// 各提供商配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderSettings,
    #[serde(default)]
    pub claude: ProviderSettings,
    #[serde(default)]
    pub grok: ProviderSettings,
    #[serde(default)]
    pub perplexity: ProviderSettings,
}

impl ProvidersConfig {
    pub fn get(&self, id: ProviderId) -> &ProviderSettings {
        match id {
            ProviderId::OpenAi => &self.openai,
            ProviderId::Claude => &self.claude,
            ProviderId::Grok => &self.grok,
            ProviderId::Perplexity => &self.perplexity,
        }
    }

    pub fn get_mut(&mut self, id: ProviderId) -> &mut ProviderSettings {
        match id {
            ProviderId::OpenAi => &mut self.openai,
            ProviderId::Claude => &mut self.claude,
            ProviderId::Grok => &mut self.grok,
            ProviderId::Perplexity => &mut self.perplexity,
        }
    }
}

/// 单个提供商的凭证与可选覆盖项
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ProviderSettings {
    pub fn with_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// 空字符串视为未配置
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn api_base_or<'a>(&'a self, default: &'a str) -> &'a str {
        match self.api_base.as_deref() {
            Some(base) if !base.is_empty() => base.trim_end_matches('/'),
            _ => default,
        }
    }

    pub fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        match self.model.as_deref() {
            Some(model) if !model.is_empty() => model,
            _ => default,
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &self.api_key().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl Config {
    /// 加载配置：文件可选，缺失的凭证回退到环境变量
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env_fallbacks(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// 从 YAML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let content = Self::replace_env_vars(&content)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 替换配置中的环境变量 ${VAR}，注释中的占位符原样保留
    fn replace_env_vars(content: &str) -> Result<String> {
        let mut result = String::with_capacity(content.len());

        for line in content.split_inclusive('\n') {
            let (code, comment) = line.split_at(comment_start(line));
            let mut replaced = code.to_string();

            for cap in ENV_VAR_PATTERN.captures_iter(code) {
                let var_name = &cap[1];
                let var_value = std::env::var(var_name).map_err(|_| {
                    RelayError::config(format!("环境变量未找到: {}", var_name))
                })?;
                replaced = replaced.replace(&cap[0], &var_value);
            }

            result.push_str(&replaced);
            result.push_str(comment);
        }

        Ok(result)
    }

    /// 为未配置的凭证填充 `<PROVIDER>_API_KEY` 与 `RELAY_AUTH_TOKEN`
    pub fn apply_env_fallbacks<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for id in ProviderId::ALL {
            let settings = self.providers.get_mut(id);
            if settings.api_key().is_none() {
                settings.api_key = lookup(id.env_var()).filter(|v| !v.is_empty());
            }
        }

        let has_token = self
            .server
            .auth_token
            .as_deref()
            .is_some_and(|t| !t.is_empty());
        if !has_token {
            self.server.auth_token = lookup(AUTH_TOKEN_ENV).filter(|v| !v.is_empty());
        }
    }

    /// 验证配置
    fn validate(&self) -> Result<()> {
        if self.server.bind.is_empty() {
            return Err(RelayError::config("server.bind 不能为空"));
        }

        for id in ProviderId::ALL {
            if let Some(base) = self.providers.get(id).api_base.as_deref() {
                if !base.starts_with("http://") && !base.starts_with("https://") {
                    return Err(RelayError::config(format!(
                        "providers.{}.api_base 必须是 http(s) URL: {}",
                        id, base
                    )));
                }
            }
        }

        Ok(())
    }

    /// 已配置凭证的提供商
    pub fn configured_providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|id| self.providers.get(*id).api_key().is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_yaml(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_config_from_valid_yaml() {
        let file = write_yaml(
            r#"
server:
  bind: 127.0.0.1:9000
  auth_token: relay-secret
providers:
  openai:
    api_key: sk-test-key
    api_base: https://proxy.example.com/v1/
  claude:
    api_key: sk-ant-test
    model: claude-haiku-4-5
"#,
        );

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.server.auth_token.as_deref(), Some("relay-secret"));
        assert_eq!(config.providers.openai.api_key(), Some("sk-test-key"));
        assert_eq!(
            config.providers.openai.api_base_or("https://api.openai.com/v1"),
            "https://proxy.example.com/v1"
        );
        assert_eq!(config.providers.claude.model_or("default"), "claude-haiku-4-5");
        // 未出现的提供商使用默认值
        assert_eq!(config.providers.grok.api_key(), None);
        assert_eq!(config.providers.grok.api_base_or("https://api.x.ai/v1"), "https://api.x.ai/v1");
    }

    #[test]
    fn test_config_empty_file_uses_defaults() {
        let file = write_yaml("{}\n");
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert!(config.server.request_timeout_secs.is_none());
        assert!(config.configured_providers().is_empty());
    }

    #[test]
    fn test_config_with_env_vars() {
        env::set_var("CHATRELAY_TEST_GROK_KEY", "xai-from-env");

        let file = write_yaml(
            r#"
providers:
  grok:
    api_key: ${CHATRELAY_TEST_GROK_KEY}
"#,
        );

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.providers.grok.api_key(), Some("xai-from-env"));

        env::remove_var("CHATRELAY_TEST_GROK_KEY");
    }

    #[test]
    fn test_config_missing_env_var() {
        let file = write_yaml(
            r#"
providers:
  openai:
    api_key: ${CHATRELAY_TEST_MISSING_VAR}
"#,
        );

        let result = Config::from_file(file.path());
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("CHATRELAY_TEST_MISSING_VAR"));
    }

    #[test]
    fn test_env_vars_in_comments_are_ignored() {
        env::set_var("CHATRELAY_TEST_BIND", "127.0.0.1:7000");

        let file = write_yaml(
            r#"
# api_key: ${CHATRELAY_TEST_UNSET_IN_COMMENT}
server:
  bind: ${CHATRELAY_TEST_BIND} # was ${CHATRELAY_TEST_UNSET_TRAILING}
  auth_token: "tok#${CHATRELAY_TEST_BIND}"
"#,
        );

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:7000");
        assert_eq!(config.server.auth_token.as_deref(), Some("tok#127.0.0.1:7000"));

        env::remove_var("CHATRELAY_TEST_BIND");
    }

    #[test]
    fn test_comment_start() {
        assert_eq!(comment_start("# all comment"), 0);
        assert_eq!(comment_start("key: value # note"), 11);
        assert_eq!(comment_start("key: a#b"), 8);
        assert_eq!(comment_start("key: 'x # y' # z"), 13);
        assert_eq!(comment_start("no comment\n"), 11);
    }

    #[test]
    fn test_shipped_example_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/chatrelay.example.yaml");
        let config = Config::from_file(path).unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert!(config.server.auth_token.is_none());
        assert_eq!(config.providers.openai.model_or("x"), "gpt-4o");
        assert_eq!(config.providers.perplexity.model_or("x"), "sonar-pro");
        assert!(config.configured_providers().is_empty());
    }

    #[test]
    fn test_config_rejects_bad_api_base() {
        let file = write_yaml(
            r#"
providers:
  perplexity:
    api_base: api.perplexity.ai
"#,
        );

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, RelayError::ConfigError(_)));
        assert!(err.to_string().contains("perplexity"));
    }

    #[test]
    fn test_env_fallbacks_fill_only_missing_keys() {
        let mut config = Config::default();
        config.providers.claude = ProviderSettings::with_key("from-file");

        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-env"),
            ("CLAUDE_API_KEY", "should-not-win"),
            ("GROK_API_KEY", ""),
            ("RELAY_AUTH_TOKEN", "token-env"),
        ]
        .into_iter()
        .collect();

        config.apply_env_fallbacks(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.providers.openai.api_key(), Some("sk-env"));
        assert_eq!(config.providers.claude.api_key(), Some("from-file"));
        assert_eq!(config.providers.grok.api_key(), None);
        assert_eq!(config.providers.perplexity.api_key(), None);
        assert_eq!(config.server.auth_token.as_deref(), Some("token-env"));
        assert_eq!(
            config.configured_providers(),
            vec![ProviderId::OpenAi, ProviderId::Claude]
        );
    }

    #[test]
    fn test_empty_key_counts_as_missing() {
        let settings = ProviderSettings::with_key("");
        assert_eq!(settings.api_key(), None);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let mut config = Config::default();
        config.server.auth_token = Some("relay-secret".to_string());
        config.providers.openai = ProviderSettings::with_key("sk-very-secret");

        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-very-secret"));
        assert!(!debug.contains("relay-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
