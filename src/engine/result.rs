//! 变更类操作的执行结果
//! 每个操作带有自己的详情类型，失败时也保留已经完成的步骤
use rust_decimal::Decimal;
use serde::Serialize;

use crate::core::types::{OrderSide, OrderType, PositionSide};

/// 执行结果
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult<D> {
    pub success: bool,
    pub action: String,
    pub details: D,
    pub order_id: Option<String>,
    pub error_message: Option<String>,
}

impl<D> ExecutionResult<D> {
    pub fn ok(action: &str, details: D) -> Self {
        Self {
            success: true,
            action: action.to_string(),
            details,
            order_id: None,
            error_message: None,
        }
    }

    pub fn failed(action: &str, details: D, error: impl ToString) -> Self {
        Self {
            success: false,
            action: action.to_string(),
            details,
            order_id: None,
            error_message: Some(error.to_string()),
        }
    }

    pub fn with_order_id(mut self, order_id: Option<String>) -> Self {
        self.order_id = order_id;
        self
    }
}

/// 开仓流程进行到的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryStage {
    Init,
    Priced,
    Sized,
    LeverageSet,
    MarginSet,
    Submitted,
    Protected,
    ProtectionFailed,
    RolledBack,
}

/// 开仓详情
#[derive(Debug, Clone, Serialize)]
pub struct EntryDetails {
    pub symbol: String,
    pub side: OrderSide,
    pub leverage: u32,
    pub quote_amount: Decimal,
    pub price: Option<String>,
    pub quantity: Option<String>,
    pub stage: EntryStage,
    pub protection: Option<ProtectionDetails>,
    pub rollback: Option<CloseDetails>,
    /// 限价单的止损止盈是否已登记为待挂
    pub protection_deferred: bool,
    /// 订单已在交易所生效，但没有任何止损止盈安排
    pub live_without_protection: bool,
}

impl EntryDetails {
    pub fn new(symbol: &str, side: OrderSide, leverage: u32, quote_amount: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            leverage,
            quote_amount,
            price: None,
            quantity: None,
            stage: EntryStage::Init,
            protection: None,
            rollback: None,
            protection_deferred: false,
            live_without_protection: false,
        }
    }
}

/// 止损止盈详情，`side` 为持仓的开仓方向
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProtectionDetails {
    pub symbol: String,
    pub side: Option<OrderSide>,
    pub quantity: String,
    pub stop_loss: Option<String>,
    pub take_profit: Option<String>,
    pub stop_loss_set: bool,
    pub take_profit_set: bool,
    pub stop_loss_order_id: Option<String>,
    pub take_profit_order_id: Option<String>,
    pub errors: Vec<String>,
}

/// 平仓详情
#[derive(Debug, Clone, Default, Serialize)]
pub struct CloseDetails {
    pub symbol: String,
    pub position_found: bool,
    pub side: Option<PositionSide>,
    pub quantity: Option<String>,
    pub flat_after_close: bool,
    /// 平仓后仍未平掉的数量
    pub remaining_quantity: Option<String>,
    pub cancelled_orders: Vec<String>,
}

impl CloseDetails {
    /// 本来就没有持仓，或平仓后已确认无持仓
    pub fn is_flat(&self) -> bool {
        self.flat_after_close || self.side.is_none()
    }
}

/// 孤儿条件单清理详情
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupDetails {
    pub checked_symbols: usize,
    pub orphan_symbols: Vec<String>,
    pub cancelled_orders: Vec<String>,
    pub failed_orders: Vec<String>,
}

/// 调整止损详情
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdjustStopDetails {
    pub symbol: String,
    pub side: Option<PositionSide>,
    pub new_stop_price: String,
    pub quantity: String,
    pub cancelled_orders: Vec<String>,
}

/// 待挂止损止盈的补挂详情
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepDetails {
    pub pending: usize,
    pub protected: Vec<String>,
    /// 限价单部分成交，已按当前持仓挂单，记录保留
    pub partially_protected: Vec<String>,
    pub waiting: Vec<String>,
    pub failed: Vec<String>,
}

/// 批量撤单详情
#[derive(Debug, Clone, Default, Serialize)]
pub struct CancelDetails {
    pub symbol: String,
    pub order_type: Option<OrderType>,
    pub cancelled_orders: Vec<String>,
    pub failed_orders: Vec<String>,
}
