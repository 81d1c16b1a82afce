use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use crate::core::error::ExchangeError;
use crate::core::exchange::FuturesExchange;
use crate::core::types::{Result, SymbolFilters};

/// 交易对精度解析器
///
/// 步长在会话内不变，第一次查询时从交易所加载并缓存在客户端实例内。
pub struct PrecisionResolver {
    exchange: Arc<dyn FuturesExchange>,
    cache: RwLock<HashMap<String, SymbolFilters>>,
}

impl PrecisionResolver {
    pub fn new(exchange: Arc<dyn FuturesExchange>) -> Self {
        Self {
            exchange,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn cached(&self, symbol: &str) -> Option<SymbolFilters> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.get(symbol).cloned()
    }

    /// 获取交易对的价格/数量步长
    pub async fn filters_for(&self, symbol: &str) -> Result<SymbolFilters> {
        if let Some(filters) = self.cached(symbol) {
            return Ok(filters);
        }

        let pairs = self.exchange.get_futures_symbols().await?;

        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        for pair in &pairs {
            // 已缓存的不覆盖
            cache
                .entry(pair.symbol.clone())
                .or_insert_with(|| pair.filters());
        }
        log::debug!("📐 已缓存 {} 个交易对的精度信息", cache.len());

        cache
            .get(symbol)
            .cloned()
            .ok_or_else(|| ExchangeError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
    }

    /// 返回 (价格精度, 数量精度)
    pub async fn precision_for(&self, symbol: &str) -> Result<(u32, u32)> {
        let filters = self.filters_for(symbol).await?;
        Ok((
            precision_from_step(&filters.price_tick)?,
            precision_from_step(&filters.quantity_step)?,
        ))
    }

    pub fn cached_symbols(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// 步长对应的小数位数，整数步长为0
pub fn precision_from_step(step: &str) -> Result<u32> {
    let step = Decimal::from_str(step.trim())
        .map_err(|e| ExchangeError::ParseError(format!("无效的步长 '{}': {}", step, e)))?;

    if step <= Decimal::ZERO {
        return Err(ExchangeError::ParseError(format!("步长必须大于0: {}", step)));
    }

    Ok(step.normalize().scale())
}

/// 向零截断到指定小数位
pub fn truncate_decimal(value: Decimal, precision: u32) -> Decimal {
    let mut truncated = value.round_dp_with_strategy(precision, RoundingStrategy::ToZero);
    truncated.rescale(precision);
    truncated
}

/// 向零截断，返回恰好带 `precision` 位小数的字符串
pub fn truncate(value: Decimal, precision: u32) -> String {
    truncate_decimal(value, precision).to_string()
}

/// 浮点输入先按最短十进制表示转换，避免二进制误差影响截断
pub fn truncate_f64(value: f64, precision: u32) -> Result<String> {
    let decimal = Decimal::from_str(&value.to_string())
        .ok()
        .or_else(|| Decimal::from_f64(value))
        .ok_or_else(|| ExchangeError::ParseError(format!("无法转换为十进制数: {}", value)))?;
    Ok(truncate(decimal, precision))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_precision_from_step() {
        assert_eq!(precision_from_step("0.00001000").unwrap(), 5);
        assert_eq!(precision_from_step("0.001").unwrap(), 3);
        assert_eq!(precision_from_step("1.00000000").unwrap(), 0);
        assert_eq!(precision_from_step("10").unwrap(), 0);
        assert_eq!(precision_from_step("0.5").unwrap(), 1);
        assert!(precision_from_step("abc").is_err());
        assert!(precision_from_step("0").is_err());
    }

    #[test]
    fn test_truncate_rounds_toward_zero() {
        assert_eq!(truncate(dec("0.123456"), 3), "0.123");
        assert_eq!(truncate(dec("1.23456"), 3), "1.234");
        assert_eq!(truncate(dec("0.9999"), 2), "0.99");
        assert_eq!(truncate(dec("10"), 0), "10");
        assert_eq!(truncate(dec("10.99"), 0), "10");
        assert_eq!(truncate(dec("1.5"), 3), "1.500");
    }

    #[test]
    fn test_truncate_never_exceeds_input() {
        for raw in ["0.000999", "123.456789", "7", "0.1"] {
            let value = dec(raw);
            for precision in 0..6 {
                let out = dec(&truncate(value, precision));
                assert!(out <= value);
                assert!(value - out < Decimal::new(1, precision));
            }
        }
    }

    #[test]
    fn test_truncate_f64_avoids_float_artifacts() {
        assert_eq!(truncate_f64(0.1 + 0.2, 2).unwrap(), "0.30");
        assert_eq!(truncate_f64(1.23456, 3).unwrap(), "1.234");
        assert_eq!(truncate_f64(2.0, 0).unwrap(), "2");
    }
}
