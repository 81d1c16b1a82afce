use rust_decimal::Decimal;
use std::sync::Arc;

use crate::core::error::ExchangeError;
use crate::core::exchange::FuturesExchange;
use crate::core::types::{OrderRequest, OrderSide, OrderType};
use crate::engine::precision::{truncate, truncate_decimal, PrecisionResolver};
use crate::engine::result::{ExecutionResult, ProtectionDetails};

/// 止损止盈下单
///
/// 开仓后挂单和调整止损共用，条件单均为只减仓、按标记价格触发。
pub struct ProtectionPlacer {
    exchange: Arc<dyn FuturesExchange>,
    precision: Arc<PrecisionResolver>,
}

impl ProtectionPlacer {
    pub fn new(exchange: Arc<dyn FuturesExchange>, precision: Arc<PrecisionResolver>) -> Self {
        Self {
            exchange,
            precision,
        }
    }

    /// 为 `side` 方向开出的持仓挂止损/止盈，两条腿各自独立提交
    pub async fn place(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> ExecutionResult<ProtectionDetails> {
        const ACTION: &str = "attach_protection";

        let mut details = ProtectionDetails {
            symbol: symbol.to_string(),
            side: Some(side),
            ..Default::default()
        };

        if stop_loss.is_none() && take_profit.is_none() {
            return ExecutionResult::ok(ACTION, details);
        }

        let (price_precision, quantity_precision) = match self.precision.precision_for(symbol).await
        {
            Ok(precision) => precision,
            Err(e) => {
                let error = ExchangeError::ProtectionAttach {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                };
                return ExecutionResult::failed(ACTION, details, error);
            }
        };

        let truncated_quantity = truncate_decimal(quantity, quantity_precision);
        details.quantity = truncated_quantity.to_string();
        if truncated_quantity.is_zero() {
            let error = ExchangeError::ProtectionAttach {
                symbol: symbol.to_string(),
                reason: format!("数量 {} 小于最小步长", quantity),
            };
            return ExecutionResult::failed(ACTION, details, error);
        }

        let close_side = side.opposite();

        if let Some(price) = stop_loss {
            let stop_price = truncate(price, price_precision);
            details.stop_loss = Some(stop_price.clone());
            let request = OrderRequest::protective(
                symbol,
                close_side,
                OrderType::StopMarket,
                details.quantity.clone(),
                stop_price,
            );
            match self.exchange.create_order(request).await {
                Ok(order) => {
                    log::info!("🛡️ {} 止损单已挂出 @ {:?} (#{})", symbol, details.stop_loss, order.id);
                    details.stop_loss_set = true;
                    details.stop_loss_order_id = Some(order.id);
                }
                Err(e) => {
                    log::error!("❌ {} 止损单提交失败: {}", symbol, e);
                    details.errors.push(format!("止损: {}", e));
                }
            }
        }

        if let Some(price) = take_profit {
            let stop_price = truncate(price, price_precision);
            details.take_profit = Some(stop_price.clone());
            let request = OrderRequest::protective(
                symbol,
                close_side,
                OrderType::TakeProfitMarket,
                details.quantity.clone(),
                stop_price,
            );
            match self.exchange.create_order(request).await {
                Ok(order) => {
                    log::info!("🎯 {} 止盈单已挂出 @ {:?} (#{})", symbol, details.take_profit, order.id);
                    details.take_profit_set = true;
                    details.take_profit_order_id = Some(order.id);
                }
                Err(e) => {
                    log::error!("❌ {} 止盈单提交失败: {}", symbol, e);
                    details.errors.push(format!("止盈: {}", e));
                }
            }
        }

        if details.errors.is_empty() {
            ExecutionResult::ok(ACTION, details)
        } else {
            let error = ExchangeError::ProtectionAttach {
                symbol: symbol.to_string(),
                reason: details.errors.join("; "),
            };
            ExecutionResult::failed(ACTION, details, error)
        }
    }
}
