use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::core::error::ExchangeError;
use crate::core::exchange::FuturesExchange;
use crate::core::types::{MarginChange, Result};

/// 逐仓保证金管理
///
/// 每个交易对在一个客户端实例内最多发起一次切换请求。
pub struct MarginModeManager {
    configured: Mutex<HashMap<String, bool>>,
    last_change: Mutex<Option<Instant>>,
    cooldown: Duration,
}

impl MarginModeManager {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            configured: Mutex::new(HashMap::new()),
            last_change: Mutex::new(None),
            cooldown,
        }
    }

    /// 确保交易对为逐仓模式
    pub async fn ensure_isolated(&self, exchange: &dyn FuturesExchange, symbol: &str) -> Result<()> {
        // 持锁直到请求结束，同一交易对不会重复请求
        let mut configured = self.configured.lock().await;
        if configured.get(symbol).copied().unwrap_or(false) {
            return Ok(());
        }

        self.wait_cooldown().await;

        match exchange.set_margin_type(symbol, true).await {
            Ok(MarginChange::Changed) => {
                log::info!("🔧 {} 已切换为逐仓模式", symbol);
                *self.last_change.lock().await = Some(Instant::now());
            }
            Ok(MarginChange::AlreadySet) => {
                log::debug!("{} 已是逐仓模式，无需切换", symbol);
            }
            Err(e) => {
                log::error!("❌ {} 设置逐仓模式失败: {}", symbol, e);
                return Err(ExchangeError::MarginMode {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        configured.insert(symbol.to_string(), true);
        Ok(())
    }

    /// 等待上一次模式切换后的冷却时间
    pub async fn wait_cooldown(&self) {
        let last_change = *self.last_change.lock().await;
        if let Some(changed_at) = last_change {
            let elapsed = changed_at.elapsed();
            if elapsed < self.cooldown {
                let remaining = self.cooldown - elapsed;
                log::debug!("⏳ 保证金模式冷却中，等待 {}ms", remaining.as_millis());
                tokio::time::sleep(remaining).await;
            }
        }
    }

    pub async fn is_configured(&self, symbol: &str) -> bool {
        self.configured
            .lock()
            .await
            .get(symbol)
            .copied()
            .unwrap_or(false)
    }
}
