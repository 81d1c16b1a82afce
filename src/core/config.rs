use crate::core::error::ExchangeError;
use crate::core::retry_policy::RetryConfig;
use crate::utils::logger::LogConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// 币安U本位合约正式地址
pub const BINANCE_FUTURES_URL: &str = "https://fapi.binance.com";
/// 币安U本位合约测试网地址
pub const BINANCE_FUTURES_TESTNET_URL: &str = "https://testnet.binancefuture.com";

/// 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub testnet: bool,
    /// 为空时按 testnet 选择默认地址
    pub base_url: Option<String>,
    pub recv_window_ms: u64,
    /// 单个HTTP请求的超时时间
    pub request_timeout_secs: u64,
    /// 保证金模式切换后的冷却时间
    pub margin_cooldown_ms: u64,
    /// 交易所单次K线请求上限
    pub kline_page_size: u32,
    /// 限流重试时在 Retry-After 之上额外等待的时间
    pub rate_limit_safety_margin_ms: u64,
    /// 多周期拉取时额外的安全缓冲K线数
    pub extra_buffer: usize,
    pub quote_asset: String,
    pub pending_store_path: String,
    pub retry: RetryConfig,
    pub log: LogConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            testnet: false,
            base_url: None,
            recv_window_ms: 60000,
            request_timeout_secs: 10,
            margin_cooldown_ms: 1000,
            kline_page_size: 1000,
            rate_limit_safety_margin_ms: 1000,
            extra_buffer: 10,
            quote_asset: "USDT".to_string(),
            pending_store_path: "data/pending_protection.json".to_string(),
            retry: RetryConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl ClientConfig {
    /// 从YAML文件加载配置
    pub fn from_file(path: &str) -> Result<Self, ExchangeError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ExchangeError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        let config: ClientConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// 实际使用的交易所地址
    pub fn futures_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if self.testnet => BINANCE_FUTURES_TESTNET_URL.to_string(),
            None => BINANCE_FUTURES_URL.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ExchangeError> {
        url::Url::parse(&self.futures_base_url())
            .map_err(|e| ExchangeError::ConfigError(format!("无效的交易所地址: {}", e)))?;

        if self.kline_page_size == 0 {
            return Err(ExchangeError::ConfigError(
                "kline_page_size 必须大于0".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ExchangeError::ConfigError(
                "request_timeout_secs 必须大于0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn margin_cooldown(&self) -> Duration {
        Duration::from_millis(self.margin_cooldown_ms)
    }

    pub fn rate_limit_safety_margin(&self) -> Duration {
        Duration::from_millis(self.rate_limit_safety_margin_ms)
    }
}

/// API密钥配置
#[derive(Clone)]
pub struct ApiKeys {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .finish()
    }
}

impl ApiKeys {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// 从环境变量加载API密钥，缺失时立即失败
    pub fn from_env(exchange: &str) -> Result<Self, ExchangeError> {
        dotenv::dotenv().ok(); // 加载.env文件，忽略错误

        let exchange_upper = exchange.to_uppercase();

        let api_key = std::env::var(format!("{}_API_KEY", exchange_upper)).map_err(|_| {
            ExchangeError::ConfigError(format!("未找到{}的API_KEY环境变量", exchange))
        })?;

        // 尝试两种格式的密钥名称
        let api_secret = std::env::var(format!("{}_API_SECRET", exchange_upper))
            .or_else(|_| std::env::var(format!("{}_SECRET_KEY", exchange_upper)))
            .map_err(|_| {
                ExchangeError::ConfigError(format!(
                    "未找到{}的API_SECRET或SECRET_KEY环境变量",
                    exchange
                ))
            })?;

        if api_key.trim().is_empty() || api_secret.trim().is_empty() {
            return Err(ExchangeError::ConfigError(format!(
                "{}的API密钥为空",
                exchange
            )));
        }

        Ok(ApiKeys {
            api_key,
            api_secret,
        })
    }

    /// 从指定的 .env 文件加载
    pub fn from_env_file(path: &str, exchange: &str) -> Result<Self, ExchangeError> {
        dotenv::from_filename(path)
            .map_err(|e| ExchangeError::ConfigError(format!("读取环境文件 {} 失败: {}", path, e)))?;
        Self::from_env(exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.futures_base_url(), BINANCE_FUTURES_URL);
        assert_eq!(config.kline_page_size, 1000);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "testnet: true\nmargin_cooldown_ms: 0\n";
        let config: ClientConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.futures_base_url(), BINANCE_FUTURES_TESTNET_URL);
        assert_eq!(config.margin_cooldown(), Duration::ZERO);
        assert_eq!(config.quote_asset, "USDT");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = ClientConfig {
            base_url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ExchangeError::ConfigError(_))
        ));
    }

    #[test]
    fn test_missing_env_file_fails_fast() {
        let result = ApiKeys::from_env_file("/nonexistent/path/.env", "binance");
        assert!(matches!(result, Err(ExchangeError::ConfigError(_))));
    }

    #[test]
    fn test_api_keys_debug_is_redacted() {
        let keys = ApiKeys::new("my-key", "my-secret");
        let debug = format!("{:?}", keys);
        assert!(!debug.contains("my-key"));
        assert!(!debug.contains("my-secret"));
    }
}
