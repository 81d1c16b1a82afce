use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("网络请求错误: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("YAML配置错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("API错误: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("速率限制: {0}")]
    RateLimitError(String, Option<u64>),

    #[error("超时错误: 操作 '{operation}' 超时 ({timeout_seconds}秒)")]
    TimeoutError {
        operation: String,
        timeout_seconds: u64,
    },

    #[error("交易对未找到: {symbol} (不存在或不是有效的永续合约)")]
    SymbolNotFound { symbol: String },

    #[error("获取 {symbol} 价格失败: {reason}")]
    PriceFetch { symbol: String, reason: String },

    #[error("设置 {symbol} 逐仓保证金失败: {reason}")]
    MarginMode { symbol: String, reason: String },

    #[error("订单被拒绝: {symbol} - {reason}")]
    OrderRejected { symbol: String, reason: String },

    #[error("设置 {symbol} 止损止盈单失败: {reason}")]
    ProtectionAttach { symbol: String, reason: String },

    #[error("无可用持仓: {symbol}")]
    PositionNotFound { symbol: String },

    #[error("K线时间戳重复: {symbol} [{interval}] open_time={open_time}")]
    DuplicateBar {
        symbol: String,
        interval: String,
        open_time: i64,
    },

    #[error("获取 {symbol} [{interval}] 历史数据失败，数据不足: {got} < {expected}")]
    InsufficientData {
        symbol: String,
        interval: String,
        expected: usize,
        got: usize,
    },

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("数据解析错误: {0}")]
    ParseError(String),

    #[error("其他错误: {0}")]
    Other(String),
}

impl ExchangeError {
    /// 判断错误是否可以重试
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::NetworkError(_) => true,
            ExchangeError::TimeoutError { .. } => true,
            ExchangeError::RateLimitError(_, _) => true,
            ExchangeError::ApiError { code, .. } => {
                // HTTP 5xx 错误通常可以重试
                *code >= 500 && *code < 600
            }
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ExchangeError::RateLimitError(_, _))
    }

    /// 获取建议的重试等待时间(秒)
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ExchangeError::RateLimitError(_, retry_after) => *retry_after,
            ExchangeError::NetworkError(_) => Some(1),
            ExchangeError::TimeoutError { .. } => Some(2),
            ExchangeError::ApiError { code, .. } if *code >= 500 => Some(5),
            _ => None,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ExchangeError::NetworkError(_) => ErrorSeverity::Warning,
            ExchangeError::TimeoutError { .. } => ErrorSeverity::Warning,
            ExchangeError::RateLimitError(_, _) => ErrorSeverity::Warning,
            ExchangeError::PositionNotFound { .. } => ErrorSeverity::Info,
            ExchangeError::ProtectionAttach { .. } => ErrorSeverity::Critical,
            ExchangeError::DuplicateBar { .. } => ErrorSeverity::Critical,
            ExchangeError::ConfigError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorSeverity {
    Info,     // 信息性错误，通常不影响操作
    Warning,  // 警告性错误，可能影响性能但可以重试
    Error,    // 一般错误，需要用户处理
    Critical, // 严重错误，需要立即处理
}
