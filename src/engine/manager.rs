use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::config::{ApiKeys, ClientConfig};
use crate::core::exchange::FuturesExchange;
use crate::core::retry_policy::RateLimitRetry;
use crate::core::types::{
    Balance, Interval, Kline, Order, OrderSide, OrderType, Position, PositionSide, Result,
};
use crate::engine::executor::OrderExecutor;
use crate::engine::history::{HistoricalDataFetcher, KlineRequest};
use crate::engine::margin::MarginModeManager;
use crate::engine::pending::{JsonFilePendingStore, PendingProtectionStore};
use crate::engine::precision::PrecisionResolver;
use crate::engine::protection::ProtectionPlacer;
use crate::engine::reconciler::PositionReconciler;
use crate::engine::result::{
    AdjustStopDetails, CancelDetails, CleanupDetails, CloseDetails, EntryDetails,
    ExecutionResult, ProtectionDetails, SweepDetails,
};
use crate::exchanges::BinanceFutures;
use crate::utils::to_exchange_symbol;

/// 交易管理器
///
/// 一个实例对应一个客户端会话：精度缓存、逐仓标记、冷却时间都只在实例内共享。
/// 交易对名称在这里统一转换为交易所格式。
pub struct TradeManager {
    exchange: Arc<dyn FuturesExchange>,
    precision: Arc<PrecisionResolver>,
    margin: Arc<MarginModeManager>,
    executor: OrderExecutor,
    reconciler: Arc<PositionReconciler>,
    fetcher: HistoricalDataFetcher,
    pending: Arc<dyn PendingProtectionStore>,
    quote_asset: String,
}

impl TradeManager {
    pub fn new(
        exchange: Arc<dyn FuturesExchange>,
        config: &ClientConfig,
        pending: Arc<dyn PendingProtectionStore>,
    ) -> Self {
        let precision = Arc::new(PrecisionResolver::new(exchange.clone()));
        let margin = Arc::new(MarginModeManager::new(config.margin_cooldown()));
        let protection = Arc::new(ProtectionPlacer::new(exchange.clone(), precision.clone()));
        let reconciler = Arc::new(PositionReconciler::new(
            exchange.clone(),
            precision.clone(),
            protection.clone(),
        ));
        let executor = OrderExecutor::new(
            exchange.clone(),
            precision.clone(),
            margin.clone(),
            protection,
            reconciler.clone(),
            pending.clone(),
        );
        let fetcher = HistoricalDataFetcher::new(
            exchange.clone(),
            RateLimitRetry::new(config.retry.clone(), config.rate_limit_safety_margin()),
            config.kline_page_size,
            config.extra_buffer,
        );

        log::info!("🚀 交易管理器已创建 (交易所: {})", exchange.name());

        Self {
            exchange,
            precision,
            margin,
            executor,
            reconciler,
            fetcher,
            pending,
            quote_asset: config.quote_asset.clone(),
        }
    }

    /// 使用环境变量中的密钥连接币安，待挂记录写入配置的 JSON 文件
    pub fn binance(config: &ClientConfig) -> Result<Self> {
        let api_keys = ApiKeys::from_env("binance")?;
        let exchange = BinanceFutures::new(config, api_keys)?;
        let pending = JsonFilePendingStore::new(&config.pending_store_path);
        Ok(Self::new(Arc::new(exchange), config, Arc::new(pending)))
    }

    pub fn exchange(&self) -> &Arc<dyn FuturesExchange> {
        &self.exchange
    }

    pub fn margin(&self) -> &MarginModeManager {
        &self.margin
    }

    pub fn pending_store(&self) -> &dyn PendingProtectionStore {
        self.pending.as_ref()
    }

    // ============= 查询 =============

    pub async fn get_price(&self, symbol: &str) -> Result<Decimal> {
        self.exchange.get_price(&to_exchange_symbol(symbol)).await
    }

    pub async fn get_positions(&self, symbol: Option<&str>) -> Result<Vec<Position>> {
        let symbol = symbol.map(to_exchange_symbol);
        self.exchange.get_positions(symbol.as_deref()).await
    }

    pub async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>> {
        let symbol = symbol.map(to_exchange_symbol);
        self.exchange.get_open_orders(symbol.as_deref()).await
    }

    /// 不指定资产时查询配置的计价资产
    pub async fn get_balance(&self, asset: Option<&str>) -> Result<Balance> {
        self.exchange
            .get_balance(asset.unwrap_or(self.quote_asset.as_str()))
            .await
    }

    /// (价格精度, 数量精度)
    pub async fn precision(&self, symbol: &str) -> Result<(u32, u32)> {
        self.precision
            .precision_for(&to_exchange_symbol(symbol))
            .await
    }

    // ============= 开仓 =============

    pub async fn place_market_entry(
        &self,
        symbol: &str,
        side: OrderSide,
        leverage: u32,
        quote_amount: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> ExecutionResult<EntryDetails> {
        self.executor
            .place_market_entry(
                &to_exchange_symbol(symbol),
                side,
                leverage,
                quote_amount,
                stop_loss,
                take_profit,
            )
            .await
    }

    pub async fn place_limit_entry(
        &self,
        symbol: &str,
        side: OrderSide,
        price: Decimal,
        leverage: u32,
        quote_amount: Decimal,
    ) -> ExecutionResult<EntryDetails> {
        self.executor
            .place_limit_entry(&to_exchange_symbol(symbol), side, price, leverage, quote_amount)
            .await
    }

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
        self.executor
            .place_limit_entry_with_protection(
                &to_exchange_symbol(symbol),
                side,
                price,
                leverage,
                quote_amount,
                stop_loss,
                take_profit,
            )
            .await
    }

    pub async fn attach_protection(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> ExecutionResult<ProtectionDetails> {
        self.executor
            .attach_protection(
                &to_exchange_symbol(symbol),
                side,
                quantity,
                stop_loss,
                take_profit,
            )
            .await
    }

    // ============= 对账 =============

    pub async fn close_position(
        &self,
        symbol: &str,
        side: Option<PositionSide>,
    ) -> ExecutionResult<CloseDetails> {
        self.reconciler
            .close_position(&to_exchange_symbol(symbol), side)
            .await
    }

    pub async fn clean_orphan_orders(&self) -> ExecutionResult<CleanupDetails> {
        self.reconciler.clean_orphan_orders().await
    }

    pub async fn adjust_stop_loss(
        &self,
        symbol: &str,
        side: PositionSide,
        new_price: Decimal,
    ) -> Result<ExecutionResult<AdjustStopDetails>> {
        self.reconciler
            .adjust_stop_loss(&to_exchange_symbol(symbol), side, new_price)
            .await
    }

    pub async fn cancel_orders(
        &self,
        symbol: &str,
        order_type: Option<OrderType>,
    ) -> ExecutionResult<CancelDetails> {
        self.reconciler
            .cancel_orders(&to_exchange_symbol(symbol), order_type)
            .await
    }

    pub async fn sweep_pending_protection(&self) -> ExecutionResult<SweepDetails> {
        self.reconciler
            .sweep_pending_protection(self.pending.as_ref())
            .await
    }

    // ============= 历史数据 =============

    pub async fn check_symbol_tradable(&self, symbol: &str) -> Result<bool> {
        self.fetcher
            .check_symbol_tradable(&to_exchange_symbol(symbol))
            .await
    }

    pub async fn fetch_history(&self, request: KlineRequest) -> Result<Vec<Kline>> {
        let request = KlineRequest {
            symbol: to_exchange_symbol(&request.symbol),
            ..request
        };
        self.fetcher.fetch(&request).await
    }

    pub async fn fetch_timeframes(
        &self,
        symbol: &str,
        limit: usize,
        buffer: usize,
    ) -> Result<BTreeMap<Interval, Vec<Kline>>> {
        self.fetcher
            .fetch_timeframes(&to_exchange_symbol(symbol), limit, buffer)
            .await
    }

    pub async fn fetch_timeframes_since(
        &self,
        symbol: &str,
        since: i64,
        buffer: usize,
    ) -> Result<BTreeMap<Interval, Vec<Kline>>> {
        self.fetcher
            .fetch_timeframes_since(&to_exchange_symbol(symbol), since, buffer)
            .await
    }
}
