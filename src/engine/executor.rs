use rust_decimal::Decimal;
use std::sync::Arc;

use crate::core::error::ExchangeError;
use crate::core::exchange::FuturesExchange;
use crate::core::types::{OrderRequest, OrderSide, Result};
use crate::engine::margin::MarginModeManager;
use crate::engine::pending::{PendingProtection, PendingProtectionStore};
use crate::engine::precision::{truncate, truncate_decimal, PrecisionResolver};
use crate::engine::protection::ProtectionPlacer;
use crate::engine::reconciler::PositionReconciler;
use crate::engine::result::{EntryDetails, EntryStage, ExecutionResult, ProtectionDetails};

/// 开仓执行器
///
/// 把"金额 + 杠杆 + 交易对"换算成符合交易所精度的订单，并保证市价开仓后的持仓
/// 要么挂上了止损止盈，要么已被平掉。
pub struct OrderExecutor {
    exchange: Arc<dyn FuturesExchange>,
    precision: Arc<PrecisionResolver>,
    margin: Arc<MarginModeManager>,
    protection: Arc<ProtectionPlacer>,
    reconciler: Arc<PositionReconciler>,
    pending: Arc<dyn PendingProtectionStore>,
}

impl OrderExecutor {
    pub fn new(
        exchange: Arc<dyn FuturesExchange>,
        precision: Arc<PrecisionResolver>,
        margin: Arc<MarginModeManager>,
        protection: Arc<ProtectionPlacer>,
        reconciler: Arc<PositionReconciler>,
        pending: Arc<dyn PendingProtectionStore>,
    ) -> Self {
        Self {
            exchange,
            precision,
            margin,
            protection,
            reconciler,
            pending,
        }
    }

    /// 定价、计算数量、设置杠杆和逐仓，返回截断后的下单数量
    async fn prepare_entry(
        &self,
        details: &mut EntryDetails,
        limit_price: Option<Decimal>,
    ) -> Result<Decimal> {
        let symbol = details.symbol.clone();
        let rejected = |reason: String| ExchangeError::OrderRejected {
            symbol: symbol.clone(),
            reason,
        };

        if details.quote_amount <= Decimal::ZERO {
            return Err(rejected(format!("下单金额必须大于0: {}", details.quote_amount)));
        }
        if details.leverage == 0 {
            return Err(rejected("杠杆倍数必须大于0".to_string()));
        }

        let price = match limit_price {
            Some(price) if price > Decimal::ZERO => price,
            Some(price) => return Err(rejected(format!("限价必须大于0: {}", price))),
            None => {
                let price = self.exchange.get_price(&symbol).await.map_err(|e| match e {
                    ExchangeError::SymbolNotFound { .. } => e,
                    other => ExchangeError::PriceFetch {
                        symbol: symbol.clone(),
                        reason: other.to_string(),
                    },
                })?;
                if price <= Decimal::ZERO {
                    return Err(ExchangeError::PriceFetch {
                        symbol: symbol.clone(),
                        reason: format!("无效的价格: {}", price),
                    });
                }
                price
            }
        };
        details.stage = EntryStage::Priced;

        let (price_precision, quantity_precision) = self.precision.precision_for(&symbol).await?;
        let raw_quantity = details
            .quote_amount
            .checked_div(price)
            .ok_or_else(|| rejected(format!("无法计算数量: {} / {}", details.quote_amount, price)))?;
        let quantity = truncate_decimal(raw_quantity, quantity_precision);

        details.price = Some(truncate(price, price_precision));
        details.quantity = Some(quantity.to_string());

        if quantity.is_zero() {
            return Err(rejected(format!(
                "数量小于最小步长: {} (精度 {})",
                raw_quantity, quantity_precision
            )));
        }
        details.stage = EntryStage::Sized;

        self.exchange.set_leverage(&symbol, details.leverage).await?;
        details.stage = EntryStage::LeverageSet;

        self.margin
            .ensure_isolated(self.exchange.as_ref(), &symbol)
            .await?;
        details.stage = EntryStage::MarginSet;

        // 刚切换过保证金模式时等冷却结束再下单
        self.margin.wait_cooldown().await;

        Ok(quantity)
    }

    /// 市价开仓，可选同时挂止损止盈；挂单失败时平掉刚开的仓位
    pub async fn place_market_entry(
        &self,
        symbol: &str,
        side: OrderSide,
        leverage: u32,
        quote_amount: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> ExecutionResult<EntryDetails> {
        const ACTION: &str = "market_entry";
        let mut details = EntryDetails::new(symbol, side, leverage, quote_amount);

        let quantity = match self.prepare_entry(&mut details, None).await {
            Ok(quantity) => quantity,
            Err(e) => {
                log::error!("❌ {} 市价开仓准备失败 ({:?}): {}", symbol, details.stage, e);
                return ExecutionResult::failed(ACTION, details, e);
            }
        };

        let request = OrderRequest::market(symbol, side, quantity.to_string());
        let order = match self.exchange.create_order(request).await {
            Ok(order) => order,
            Err(e) => {
                log::error!("❌ {} 市价开仓失败: {}", symbol, e);
                return ExecutionResult::failed(ACTION, details, e);
            }
        };
        details.stage = EntryStage::Submitted;
        log::info!(
            "📈 {} 市价开仓 {} 数量 {} 参考价 {} (#{})",
            symbol,
            side.position_side(),
            quantity,
            details.price.as_deref().unwrap_or("-"),
            order.id
        );

        if stop_loss.is_none() && take_profit.is_none() {
            return ExecutionResult::ok(ACTION, details).with_order_id(Some(order.id));
        }

        let protection = self
            .protection
            .place(symbol, side, quantity, stop_loss, take_profit)
            .await;
        let protection_ok = protection.success;
        let protection_error = protection.error_message.clone();
        details.protection = Some(protection.details);

        if protection_ok {
            details.stage = EntryStage::Protected;
            return ExecutionResult::ok(ACTION, details).with_order_id(Some(order.id));
        }

        details.stage = EntryStage::ProtectionFailed;
        let protection_error = protection_error.unwrap_or_else(|| "止损止盈设置失败".to_string());
        log::error!("🚨 {} 止损止盈设置失败，回滚持仓: {}", symbol, protection_error);

        let rollback = self
            .reconciler
            .close_position(symbol, Some(side.position_side()))
            .await;

        let message = if !rollback.success {
            let rollback_error = rollback.error_message.clone().unwrap_or_default();
            log::error!("🚨 {} 回滚失败，持仓可能未受保护: {}", symbol, rollback_error);
            format!("{}; 回滚失败: {}", protection_error, rollback_error)
        } else if !rollback.details.is_flat() {
            // 平仓单未完全成交，剩余持仓只有部分条件单
            let remaining = rollback
                .details
                .remaining_quantity
                .clone()
                .unwrap_or_else(|| "未知".to_string());
            log::error!("🚨 {} 回滚后仍有持仓 {}，持仓未完全受保护", symbol, remaining);
            format!("{}; 回滚后仍有持仓 {}", protection_error, remaining)
        } else {
            details.stage = EntryStage::RolledBack;
            log::warn!("↩️ {} 已回滚持仓", symbol);
            protection_error
        };
        details.rollback = Some(rollback.details);

        ExecutionResult::failed(ACTION, details, message).with_order_id(Some(order.id))
    }

    /// 限价开仓 (GTC)，不会自动挂止损止盈
    pub async fn place_limit_entry(
        &self,
        symbol: &str,
        side: OrderSide,
        price: Decimal,
        leverage: u32,
        quote_amount: Decimal,
    ) -> ExecutionResult<EntryDetails> {
        const ACTION: &str = "limit_entry";
        let mut details = EntryDetails::new(symbol, side, leverage, quote_amount);

        let quantity = match self.prepare_entry(&mut details, Some(price)).await {
            Ok(quantity) => quantity,
            Err(e) => {
                log::error!("❌ {} 限价开仓准备失败 ({:?}): {}", symbol, details.stage, e);
                return ExecutionResult::failed(ACTION, details, e);
            }
        };

        let limit_price = details.price.clone().unwrap_or_else(|| price.to_string());
        let request = OrderRequest::limit(symbol, side, quantity.to_string(), limit_price.clone());
        match self.exchange.create_order(request).await {
            Ok(order) => {
                details.stage = EntryStage::Submitted;
                log::info!(
                    "📝 {} 限价开仓 {} 数量 {} @ {} (#{})",
                    symbol,
                    side.position_side(),
                    quantity,
                    limit_price,
                    order.id
                );
                ExecutionResult::ok(ACTION, details).with_order_id(Some(order.id))
            }
            Err(e) => {
                log::error!("❌ {} 限价开仓失败: {}", symbol, e);
                ExecutionResult::failed(ACTION, details, e)
            }
        }
    }

    /// 限价开仓，并登记成交后需要补挂的止损止盈
    #[allow(clippy::too_many_arguments)]
    pub async fn place_limit_entry_with_protection(
        &self,
        symbol: &str,
        side: OrderSide,
        price: Decimal,
        leverage: u32,
        quote_amount: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> ExecutionResult<EntryDetails> {
        let mut result = self
            .place_limit_entry(symbol, side, price, leverage, quote_amount)
            .await;

        if !result.success || (stop_loss.is_none() && take_profit.is_none()) {
            return result;
        }

        let record = PendingProtection {
            symbol: symbol.to_string(),
            side,
            stop_loss: stop_loss.map(|p| p.to_string()),
            take_profit: take_profit.map(|p| p.to_string()),
            protected_quantity: None,
        };

        match self.pending.put(record) {
            Ok(()) => {
                log::info!("🗂️ {} 止损止盈已登记，待限价单成交后补挂", symbol);
                result.details.protection_deferred = true;
                result
            }
            Err(e) => {
                let order_id = result.order_id.clone().unwrap_or_default();
                log::error!(
                    "🚨 {} 登记待挂止损止盈失败，限价单 #{} 已挂出且成交后不会自动保护: {}",
                    symbol,
                    order_id,
                    e
                );
                result.success = false;
                result.details.live_without_protection = true;
                result.error_message = Some(format!(
                    "限价单 #{} 已挂出，但止损止盈登记失败: {}",
                    order_id, e
                ));
                result
            }
        }
    }

    /// 为已有持仓挂止损止盈
    pub async fn attach_protection(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> ExecutionResult<ProtectionDetails> {
        self.protection
            .place(symbol, side, quantity, stop_loss, take_profit)
            .await
    }
}
