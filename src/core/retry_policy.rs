//! 限流重试策略

use crate::core::error::ExchangeError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

/// 重试策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 最大重试次数，None 表示不限次数（由调用方在外部限时）
    pub max_retries: Option<u32>,
    /// 初始延迟（毫秒）
    pub initial_delay_ms: u64,
    /// 最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 指数退避因子
    pub backoff_factor: f64,
    /// 是否添加抖动
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            initial_delay_ms: 1000,
            max_delay_ms: 60000,
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

/// 重试策略trait
pub trait RetryPolicy: Send + Sync {
    /// 判断是否应该重试
    fn should_retry(&self, error: &ExchangeError, attempt: u32) -> bool;

    /// 计算重试延迟
    fn calculate_delay(&self, error: &ExchangeError, attempt: u32) -> Duration;
}

/// 只针对限流错误的重试策略
///
/// 交易所给出 Retry-After 时按其等待并加上安全余量，否则按指数退避。
#[derive(Debug, Clone)]
pub struct RateLimitRetry {
    config: RetryConfig,
    safety_margin: Duration,
}

impl RateLimitRetry {
    pub fn new(config: RetryConfig, safety_margin: Duration) -> Self {
        Self {
            config,
            safety_margin,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = Some(max_retries);
        self
    }

    pub fn with_initial_delay(mut self, delay_ms: u64) -> Self {
        self.config.initial_delay_ms = delay_ms;
        self
    }

    fn backoff_delay_ms(&self, attempt: u32) -> u64 {
        let base_delay =
            self.config.initial_delay_ms as f64 * self.config.backoff_factor.powi(attempt as i32);

        let mut delay_ms = base_delay.min(self.config.max_delay_ms as f64) as u64;

        // 添加抖动以避免雷同重试
        if self.config.jitter && delay_ms > 0 {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            let jitter = rng.gen_range(0..=delay_ms / 4);
            delay_ms += jitter;
        }

        delay_ms
    }

    /// 执行带重试的操作，只有限流错误会被重试
    pub async fn execute_with_retry<F, T, Fut>(&self, operation: F) -> Result<T, ExchangeError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ExchangeError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        log::info!("✅ 操作在第{}次尝试后成功", attempt + 1);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !self.should_retry(&error, attempt) {
                        if error.is_rate_limited() {
                            log::error!("❌ 限流重试次数已用尽: {}", error);
                        }
                        return Err(error);
                    }

                    let delay = self.calculate_delay(&error, attempt);
                    log::warn!(
                        "⚠️ 请求被限流，将在{:.2}秒后重试 (第{}次): {}",
                        delay.as_secs_f64(),
                        attempt + 1,
                        error
                    );

                    attempt += 1;

                    sleep(delay).await;
                }
            }
        }
    }
}

impl RetryPolicy for RateLimitRetry {
    fn should_retry(&self, error: &ExchangeError, attempt: u32) -> bool {
        if let Some(max_retries) = self.config.max_retries {
            if attempt >= max_retries {
                return false;
            }
        }

        error.is_rate_limited()
    }

    fn calculate_delay(&self, error: &ExchangeError, attempt: u32) -> Duration {
        match error {
            ExchangeError::RateLimitError(_, Some(seconds)) => {
                Duration::from_secs(*seconds) + self.safety_margin
            }
            _ => Duration::from_millis(self.backoff_delay_ms(attempt)) + self.safety_margin,
        }
    }
}
