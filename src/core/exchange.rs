use crate::core::types::{
    Balance, Kline, KlineQuery, MarginChange, Order, OrderRequest, Position, Result, TradingPair,
};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// 永续合约交易所接口
///
/// 执行引擎只依赖这里列出的调用，具体交易所的请求/响应格式由实现负责。
#[async_trait]
pub trait FuturesExchange: Send + Sync {
    /// 获取交易所名称
    fn name(&self) -> &str;

    /// 获取最新成交价
    async fn get_price(&self, symbol: &str) -> Result<Decimal>;

    /// 获取所有期货交易对（含步长、合约类型、交易状态）
    async fn get_futures_symbols(&self) -> Result<Vec<TradingPair>>;

    /// 设置杠杆
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    /// 设置逐仓保证金；交易所返回"无需切换"时给出 `MarginChange::AlreadySet`
    async fn set_margin_type(&self, symbol: &str, isolated: bool) -> Result<MarginChange>;

    /// 创建订单
    async fn create_order(&self, request: OrderRequest) -> Result<Order>;

    /// 取消订单
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()>;

    /// 获取活跃订单，不指定交易对时返回全部
    async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>>;

    /// 获取持仓信息，只返回数量不为零的持仓
    async fn get_positions(&self, symbol: Option<&str>) -> Result<Vec<Position>>;

    /// 获取指定资产余额
    async fn get_balance(&self, asset: &str) -> Result<Balance>;

    /// 获取单页K线
    async fn get_klines(&self, query: KlineQuery) -> Result<Vec<Kline>>;

    /// 获取指定交易对的持仓（单向持仓模式下最多一条）
    async fn get_position(&self, symbol: &str) -> Result<Option<Position>> {
        let positions = self.get_positions(Some(symbol)).await?;
        Ok(positions
            .into_iter()
            .find(|p| p.symbol == symbol && p.is_open()))
    }
}
