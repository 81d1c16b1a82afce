use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::core::error::ExchangeError;
use crate::core::exchange::FuturesExchange;
use crate::core::types::{Order, OrderRequest, OrderType, PositionSide, Result};
use crate::engine::pending::{PendingProtection, PendingProtectionStore};
use crate::engine::precision::{truncate, PrecisionResolver};
use crate::engine::protection::ProtectionPlacer;
use crate::engine::result::{
    AdjustStopDetails, CancelDetails, CleanupDetails, CloseDetails, ExecutionResult, SweepDetails,
};

/// 持仓对账：平仓、清理孤儿条件单、调整止损、补挂待挂止损止盈
pub struct PositionReconciler {
    exchange: Arc<dyn FuturesExchange>,
    precision: Arc<PrecisionResolver>,
    protection: Arc<ProtectionPlacer>,
}

impl PositionReconciler {
    pub fn new(
        exchange: Arc<dyn FuturesExchange>,
        precision: Arc<PrecisionResolver>,
        protection: Arc<ProtectionPlacer>,
    ) -> Self {
        Self {
            exchange,
            precision,
            protection,
        }
    }

    /// 撤销满足条件的订单，返回 (已撤销, 撤销失败)
    async fn cancel_where<F>(&self, orders: Vec<Order>, keep: F) -> (Vec<String>, Vec<String>)
    where
        F: Fn(&Order) -> bool,
    {
        let mut cancelled = Vec::new();
        let mut failed = Vec::new();

        for order in orders.into_iter().filter(|o| keep(o)) {
            match self.exchange.cancel_order(&order.symbol, &order.id).await {
                Ok(()) => {
                    log::info!(
                        "🗑️ 已撤销 {} {} 订单 #{}",
                        order.symbol,
                        order.order_type,
                        order.id
                    );
                    cancelled.push(order.id);
                }
                Err(e) => {
                    log::warn!("⚠️ 撤销 {} 订单 #{} 失败: {}", order.symbol, order.id, e);
                    failed.push(order.id);
                }
            }
        }

        (cancelled, failed)
    }

    /// 市价平仓
    ///
    /// `side` 为 None 时平掉当前任意方向的持仓；指定方向与实际持仓不符时不做任何操作。
    pub async fn close_position(
        &self,
        symbol: &str,
        side: Option<PositionSide>,
    ) -> ExecutionResult<CloseDetails> {
        const ACTION: &str = "close_position";

        let mut details = CloseDetails {
            symbol: symbol.to_string(),
            ..Default::default()
        };

        let position = match self.exchange.get_position(symbol).await {
            Ok(Some(position)) if position.is_open() => position,
            Ok(_) => {
                log::info!("{} 无持仓，跳过平仓", symbol);
                return ExecutionResult::ok(ACTION, details);
            }
            Err(e) => return ExecutionResult::failed(ACTION, details, e),
        };

        let live_side = position.side();
        details.side = Some(live_side);

        if let Some(requested) = side {
            if requested != live_side {
                log::warn!(
                    "⚠️ {} 持仓方向为 {}，与请求的 {} 不符，跳过平仓",
                    symbol,
                    live_side,
                    requested
                );
                return ExecutionResult::ok(ACTION, details);
            }
        }
        details.position_found = true;

        let close_side = match live_side.entry_side() {
            Some(entry_side) => entry_side.opposite(),
            None => return ExecutionResult::ok(ACTION, details),
        };

        let quantity_precision = match self.precision.precision_for(symbol).await {
            Ok((_, quantity_precision)) => quantity_precision,
            Err(e) => return ExecutionResult::failed(ACTION, details, e),
        };
        let quantity = truncate(position.quantity(), quantity_precision);
        details.quantity = Some(quantity.clone());

        let request = OrderRequest::reduce_only_market(symbol, close_side, quantity);
        let order = match self.exchange.create_order(request).await {
            Ok(order) => order,
            Err(e) => {
                log::error!("❌ {} 平仓失败: {}", symbol, e);
                return ExecutionResult::failed(ACTION, details, e);
            }
        };
        log::info!(
            "✅ {} 平仓单已提交: {} {} (#{})",
            symbol,
            close_side,
            position.quantity(),
            order.id
        );

        // 确认已经没有持仓后再撤条件单
        match self.exchange.get_position(symbol).await {
            Ok(Some(remaining)) if remaining.is_open() => {
                log::warn!(
                    "⚠️ {} 平仓后仍有持仓 {}，保留条件单",
                    symbol,
                    remaining.amount
                );
                details.remaining_quantity = Some(remaining.quantity().to_string());
            }
            Ok(_) => {
                details.flat_after_close = true;
                match self.exchange.get_open_orders(Some(symbol)).await {
                    Ok(orders) => {
                        let (cancelled, failed) = self
                            .cancel_where(orders, |o| o.order_type.is_protective())
                            .await;
                        if !failed.is_empty() {
                            log::warn!("⚠️ {} 有 {} 个条件单撤销失败", symbol, failed.len());
                        }
                        details.cancelled_orders = cancelled;
                    }
                    Err(e) => log::warn!("⚠️ 获取 {} 挂单失败，条件单未清理: {}", symbol, e),
                }
            }
            Err(e) => log::warn!("⚠️ 平仓后查询 {} 持仓失败: {}", symbol, e),
        }

        ExecutionResult::ok(ACTION, details).with_order_id(Some(order.id))
    }

    /// 撤销所有没有对应持仓的止损/止盈/跟踪止损单
    pub async fn clean_orphan_orders(&self) -> ExecutionResult<CleanupDetails> {
        const ACTION: &str = "clean_orphan_orders";
        let mut details = CleanupDetails::default();

        let open_orders = match self.exchange.get_open_orders(None).await {
            Ok(orders) => orders,
            Err(e) => return ExecutionResult::failed(ACTION, details, e),
        };
        let positions = match self.exchange.get_positions(None).await {
            Ok(positions) => positions,
            Err(e) => return ExecutionResult::failed(ACTION, details, e),
        };

        let live_symbols: HashSet<String> = positions
            .into_iter()
            .filter(|p| p.is_open())
            .map(|p| p.symbol)
            .collect();

        let mut by_symbol: BTreeMap<String, Vec<Order>> = BTreeMap::new();
        for order in open_orders
            .into_iter()
            .filter(|o| o.order_type.is_protective())
        {
            by_symbol.entry(order.symbol.clone()).or_default().push(order);
        }
        details.checked_symbols = by_symbol.len();

        for (symbol, orders) in by_symbol {
            if live_symbols.contains(&symbol) {
                continue;
            }
            log::info!("🧹 {} 无持仓，清理 {} 个条件单", symbol, orders.len());
            let (cancelled, failed) = self.cancel_where(orders, |_| true).await;
            details.orphan_symbols.push(symbol);
            details.cancelled_orders.extend(cancelled);
            details.failed_orders.extend(failed);
        }

        if details.failed_orders.is_empty() {
            ExecutionResult::ok(ACTION, details)
        } else {
            let message = format!("{} 个孤儿条件单撤销失败", details.failed_orders.len());
            ExecutionResult::failed(ACTION, details, message)
        }
    }

    /// 调整止损：撤销现有止损单后按当前持仓数量重新挂单
    pub async fn adjust_stop_loss(
        &self,
        symbol: &str,
        side: PositionSide,
        new_price: Decimal,
    ) -> Result<ExecutionResult<AdjustStopDetails>> {
        const ACTION: &str = "adjust_stop_loss";

        let position = self
            .exchange
            .get_position(symbol)
            .await?
            .filter(|p| p.is_open() && p.side() == side)
            .ok_or_else(|| ExchangeError::PositionNotFound {
                symbol: symbol.to_string(),
            })?;

        let entry_side = side
            .entry_side()
            .ok_or_else(|| ExchangeError::PositionNotFound {
                symbol: symbol.to_string(),
            })?;

        let mut details = AdjustStopDetails {
            symbol: symbol.to_string(),
            side: Some(side),
            new_stop_price: new_price.to_string(),
            quantity: position.quantity().to_string(),
            ..Default::default()
        };

        let open_orders = self.exchange.get_open_orders(Some(symbol)).await?;
        let (cancelled, failed) = self
            .cancel_where(open_orders, |o| o.order_type == OrderType::StopMarket)
            .await;
        details.cancelled_orders = cancelled;
        if !failed.is_empty() {
            // 旧止损没撤掉时不再挂新的，避免重复止损
            let message = format!("{} 个原止损单撤销失败: {:?}", failed.len(), failed);
            return Ok(ExecutionResult::failed(ACTION, details, message));
        }

        let placed = self
            .protection
            .place(symbol, entry_side, position.quantity(), Some(new_price), None)
            .await;

        details.quantity = placed.details.quantity.clone();
        if let Some(stop_price) = &placed.details.stop_loss {
            details.new_stop_price = stop_price.clone();
        }

        let order_id = placed.details.stop_loss_order_id.clone();
        if placed.success {
            log::info!("🛡️ {} 止损已调整至 {}", symbol, details.new_stop_price);
            Ok(ExecutionResult::ok(ACTION, details).with_order_id(order_id))
        } else {
            let message = placed
                .error_message
                .unwrap_or_else(|| "止损单提交失败".to_string());
            Ok(ExecutionResult::failed(ACTION, details, message))
        }
    }

    /// 撤销某交易对的全部挂单，可按订单类型过滤
    pub async fn cancel_orders(
        &self,
        symbol: &str,
        order_type: Option<OrderType>,
    ) -> ExecutionResult<CancelDetails> {
        const ACTION: &str = "cancel_orders";

        let mut details = CancelDetails {
            symbol: symbol.to_string(),
            order_type: order_type.clone(),
            ..Default::default()
        };

        let orders = match self.exchange.get_open_orders(Some(symbol)).await {
            Ok(orders) => orders,
            Err(e) => return ExecutionResult::failed(ACTION, details, e),
        };

        let (cancelled, failed) = self
            .cancel_where(orders, |o| {
                order_type.as_ref().map_or(true, |t| &o.order_type == t)
            })
            .await;
        details.cancelled_orders = cancelled;
        details.failed_orders = failed;

        if details.failed_orders.is_empty() {
            ExecutionResult::ok(ACTION, details)
        } else {
            let message = format!("{} 个订单撤销失败", details.failed_orders.len());
            ExecutionResult::failed(ACTION, details, message)
        }
    }

    /// 限价单成交后补挂止损止盈
    ///
    /// 只处理已有对应方向持仓的记录。开仓限价单仍在挂着（部分成交）时按当前持仓挂单并保留记录，
    /// 之后持仓变大时替换为新数量；限价单不再挂着时挂好即删除记录。部分成功时记录只保留失败的一侧。
    pub async fn sweep_pending_protection(
        &self,
        store: &dyn PendingProtectionStore,
    ) -> ExecutionResult<SweepDetails> {
        const ACTION: &str = "sweep_pending_protection";
        let mut details = SweepDetails::default();

        let records = match store.list() {
            Ok(records) => records,
            Err(e) => return ExecutionResult::failed(ACTION, details, e),
        };
        details.pending = records.len();

        for record in records {
            match self.sweep_one(store, &record).await {
                Ok(SweepOutcome::Protected) => details.protected.push(record.symbol),
                Ok(SweepOutcome::PartiallyProtected) => {
                    details.partially_protected.push(record.symbol)
                }
                Ok(SweepOutcome::Waiting) => details.waiting.push(record.symbol),
                Err(e) => {
                    log::error!("❌ {} 补挂止损止盈失败: {}", record.symbol, e);
                    details.failed.push(record.symbol);
                }
            }
        }

        if details.failed.is_empty() {
            ExecutionResult::ok(ACTION, details)
        } else {
            let message = format!("{} 个交易对补挂失败: {:?}", details.failed.len(), details.failed);
            ExecutionResult::failed(ACTION, details, message)
        }
    }

    async fn sweep_one(
        &self,
        store: &dyn PendingProtectionStore,
        record: &PendingProtection,
    ) -> Result<SweepOutcome> {
        let position = match self.exchange.get_position(&record.symbol).await? {
            Some(position) if position.is_open() && position.side() == record.side.position_side() => {
                position
            }
            _ => return Ok(SweepOutcome::Waiting),
        };

        let open_orders = self.exchange.get_open_orders(Some(&record.symbol)).await?;
        let entry_resting = open_orders.iter().any(|o| {
            o.order_type == OrderType::Limit && o.side == record.side && !o.reduce_only
        });

        let (_, quantity_precision) = self.precision.precision_for(&record.symbol).await?;
        let quantity = truncate(position.quantity(), quantity_precision);
        if entry_resting && record.protected_quantity.as_deref() == Some(quantity.as_str()) {
            return Ok(SweepOutcome::PartiallyProtected);
        }

        let close_side = record.side.opposite();
        let previous: Vec<Order> = open_orders
            .into_iter()
            .filter(|o| o.order_type.is_protective() && o.side == close_side)
            .collect();

        let stop_loss = parse_price(&record.stop_loss)?;
        let take_profit = parse_price(&record.take_profit)?;

        let placed = self
            .protection
            .place(
                &record.symbol,
                record.side,
                position.quantity(),
                stop_loss,
                take_profit,
            )
            .await;

        // 新单挂好后再撤同类旧单，避免出现无保护的空窗
        let mut replaced = Vec::new();
        if placed.details.stop_loss_set {
            replaced.push(OrderType::StopMarket);
        }
        if placed.details.take_profit_set {
            replaced.push(OrderType::TakeProfitMarket);
        }
        let (_, failed) = self
            .cancel_where(previous, |o| replaced.contains(&o.order_type))
            .await;
        if !failed.is_empty() {
            log::warn!("⚠️ {} 有 {} 个旧条件单撤销失败", record.symbol, failed.len());
        }

        if placed.success {
            if entry_resting {
                let mut updated = record.clone();
                updated.protected_quantity = Some(placed.details.quantity.clone());
                store.put(updated)?;
                log::info!(
                    "🛡️ {} 限价单部分成交，已按 {} 挂好止损止盈，继续等待成交",
                    record.symbol,
                    placed.details.quantity
                );
                return Ok(SweepOutcome::PartiallyProtected);
            }
            store.remove(&record.symbol)?;
            log::info!("✅ {} 限价单已成交，止损止盈已补挂", record.symbol);
            return Ok(SweepOutcome::Protected);
        }

        let mut remaining = record.clone();
        if !entry_resting {
            if placed.details.stop_loss_set {
                remaining.stop_loss = None;
            }
            if placed.details.take_profit_set {
                remaining.take_profit = None;
            }
        }
        store.put(remaining)?;

        Err(ExchangeError::ProtectionAttach {
            symbol: record.symbol.clone(),
            reason: placed
                .error_message
                .unwrap_or_else(|| "条件单提交失败".to_string()),
        })
    }
}

enum SweepOutcome {
    Protected,
    /// 按部分成交的数量挂好，记录保留
    PartiallyProtected,
    Waiting,
}

fn parse_price(raw: &Option<String>) -> Result<Option<Decimal>> {
    raw.as_deref()
        .map(|p| {
            p.parse::<Decimal>()
                .map_err(|e| ExchangeError::ParseError(format!("无效的价格 '{}': {}", p, e)))
        })
        .transpose()
}
