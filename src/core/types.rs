//! 统一的类型定义模块
//! 整合了执行与对账引擎使用的数据结构
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============= 基础类型定义 =============

/// 结果类型别名
pub type Result<T> = std::result::Result<T, crate::core::error::ExchangeError>;

// ============= 订单相关 =============

/// 订单方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    /// 开仓方向对应的持仓方向
    pub fn position_side(&self) -> PositionSide {
        match self {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderSide {
    type Err = crate::core::error::ExchangeError;

    /// 同时接受 "BUY"/"SELL" 与 "LONG"/"SHORT"
    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "BUY" | "LONG" => Ok(OrderSide::Buy),
            "SELL" | "SHORT" => Ok(OrderSide::Sell),
            _ => Err(crate::core::error::ExchangeError::ParseError(format!(
                "无效的订单方向: {}",
                s
            ))),
        }
    }
}

/// 持仓方向，由持仓数量的符号推导
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
    Flat,
}

impl PositionSide {
    pub fn from_amount(amount: Decimal) -> Self {
        if amount > Decimal::ZERO {
            PositionSide::Long
        } else if amount < Decimal::ZERO {
            PositionSide::Short
        } else {
            PositionSide::Flat
        }
    }

    /// 开出该方向持仓的订单方向
    pub fn entry_side(&self) -> Option<OrderSide> {
        match self {
            PositionSide::Long => Some(OrderSide::Buy),
            PositionSide::Short => Some(OrderSide::Sell),
            PositionSide::Flat => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
            PositionSide::Flat => "FLAT",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionSide {
    type Err = crate::core::error::ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "LONG" | "BUY" => Ok(PositionSide::Long),
            "SHORT" | "SELL" => Ok(PositionSide::Short),
            "FLAT" => Ok(PositionSide::Flat),
            _ => Err(crate::core::error::ExchangeError::ParseError(format!(
                "无效的持仓方向: {}",
                s
            ))),
        }
    }
}

/// 订单类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    TakeProfitMarket,
    TrailingStopMarket,
    Other(String),
}

impl OrderType {
    pub fn as_str(&self) -> &str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::TakeProfitMarket => "TAKE_PROFIT_MARKET",
            OrderType::TrailingStopMarket => "TRAILING_STOP_MARKET",
            OrderType::Other(raw) => raw.as_str(),
        }
    }

    pub fn from_exchange(raw: &str) -> Self {
        match raw {
            "MARKET" => OrderType::Market,
            "LIMIT" => OrderType::Limit,
            "STOP_MARKET" => OrderType::StopMarket,
            "TAKE_PROFIT_MARKET" => OrderType::TakeProfitMarket,
            "TRAILING_STOP_MARKET" => OrderType::TrailingStopMarket,
            other => OrderType::Other(other.to_string()),
        }
    }

    /// 止损/止盈/跟踪止损 属于平仓条件单
    pub fn is_protective(&self) -> bool {
        matches!(
            self,
            OrderType::StopMarket | OrderType::TakeProfitMarket | OrderType::TrailingStopMarket
        )
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 订单状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    Unknown,
}

impl OrderStatus {
    pub fn from_exchange(raw: &str) -> Self {
        match raw {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" => OrderStatus::Canceled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            _ => OrderStatus::Unknown,
        }
    }
}

/// 时间有效性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    GTC, // Good Till Cancel
    IOC, // Immediate Or Cancel
    FOK, // Fill Or Kill
    GTX, // Good Till Crossing
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::GTC => "GTC",
            TimeInForce::IOC => "IOC",
            TimeInForce::FOK => "FOK",
            TimeInForce::GTX => "GTX",
        }
    }

    pub fn from_exchange(raw: &str) -> Option<Self> {
        match raw {
            "GTC" => Some(TimeInForce::GTC),
            "IOC" => Some(TimeInForce::IOC),
            "FOK" => Some(TimeInForce::FOK),
            "GTX" => Some(TimeInForce::GTX),
            _ => None,
        }
    }
}

/// 条件单触发价格类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkingType {
    MarkPrice,
    ContractPrice,
}

impl WorkingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkingType::MarkPrice => "MARK_PRICE",
            WorkingType::ContractPrice => "CONTRACT_PRICE",
        }
    }
}

/// 订单请求
///
/// 价格和数量都是已经按交易对精度截断后的字符串，直接提交给交易所。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub stop_price: Option<String>,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub time_in_force: Option<TimeInForce>,
    #[serde(default)]
    pub working_type: Option<WorkingType>,
    #[serde(default)]
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    /// 市价开仓单
    pub fn market(symbol: &str, side: OrderSide, quantity: String) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            reduce_only: false,
            time_in_force: None,
            working_type: None,
            client_order_id: None,
        }
    }

    /// 限价开仓单 (GTC)
    pub fn limit(symbol: &str, side: OrderSide, quantity: String, price: String) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            time_in_force: Some(TimeInForce::GTC),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// 只减仓的市价平仓单
    pub fn reduce_only_market(symbol: &str, side: OrderSide, quantity: String) -> Self {
        Self {
            reduce_only: true,
            ..Self::market(symbol, side, quantity)
        }
    }

    /// 以标记价格触发的只减仓条件单（止损/止盈）
    pub fn protective(
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        quantity: String,
        stop_price: String,
    ) -> Self {
        Self {
            order_type,
            stop_price: Some(stop_price),
            reduce_only: true,
            time_in_force: Some(TimeInForce::GTC),
            working_type: Some(WorkingType::MarkPrice),
            ..Self::market(symbol, side, quantity)
        }
    }
}

/// 订单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
    pub reduce_only: bool,
    pub time_in_force: Option<TimeInForce>,
    pub status: OrderStatus,
}

// ============= 期货相关 =============

/// 持仓信息（单向持仓模式，数量带符号）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub amount: Decimal,
    pub notional: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    #[serde(default)]
    pub leverage: Option<u32>,
}

impl Position {
    pub fn side(&self) -> PositionSide {
        PositionSide::from_amount(self.amount)
    }

    /// 持仓数量的绝对值
    pub fn quantity(&self) -> Decimal {
        self.amount.abs()
    }

    pub fn is_open(&self) -> bool {
        !self.amount.is_zero()
    }
}

/// 保证金模式切换结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginChange {
    /// 交易所实际切换了模式
    Changed,
    /// 交易所返回"无需切换"
    AlreadySet,
}

/// 账户余额
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub used: Decimal,
    pub total: Decimal,
}

/// 期货交易对元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingPair {
    pub symbol: String,
    pub status: String,
    pub contract_type: String,
    pub tick_size: String,
    pub step_size: String,
    #[serde(default)]
    pub min_notional: Option<Decimal>,
}

impl TradingPair {
    /// 正在交易的永续合约
    pub fn is_tradable(&self) -> bool {
        self.contract_type == "PERPETUAL" && self.status == "TRADING"
    }

    pub fn filters(&self) -> SymbolFilters {
        SymbolFilters {
            symbol: self.symbol.clone(),
            price_tick: self.tick_size.clone(),
            quantity_step: self.step_size.clone(),
        }
    }
}

/// 交易对的价格/数量步长，会话内不变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub symbol: String,
    pub price_tick: String,
    pub quantity_step: String,
}

// ============= K线数据 =============

/// K线数据，时间戳均为毫秒
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: i64,
    pub quote_volume: Decimal,
    pub trade_count: u64,
}

/// 单页K线查询
#[derive(Debug, Clone, PartialEq)]
pub struct KlineQuery {
    pub symbol: String,
    pub interval: Interval,
    pub limit: u32,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

/// 时间间隔
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    OneMinute,
    ThreeMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    FourHours,
    SixHours,
    EightHours,
    TwelveHours,
    OneDay,
    ThreeDays,
    OneWeek,
    OneMonth,
}

impl Interval {
    pub fn from_string(s: &str) -> Result<Self> {
        match s {
            "1m" => Ok(Interval::OneMinute),
            "3m" => Ok(Interval::ThreeMinutes),
            "5m" => Ok(Interval::FiveMinutes),
            "15m" => Ok(Interval::FifteenMinutes),
            "30m" => Ok(Interval::ThirtyMinutes),
            "1h" => Ok(Interval::OneHour),
            "2h" => Ok(Interval::TwoHours),
            "4h" => Ok(Interval::FourHours),
            "6h" => Ok(Interval::SixHours),
            "8h" => Ok(Interval::EightHours),
            "12h" => Ok(Interval::TwelveHours),
            "1d" => Ok(Interval::OneDay),
            "3d" => Ok(Interval::ThreeDays),
            "1w" => Ok(Interval::OneWeek),
            "1M" => Ok(Interval::OneMonth),
            _ => Err(crate::core::error::ExchangeError::ParseError(format!(
                "Invalid interval: {}",
                s
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::ThreeMinutes => "3m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
            Interval::TwoHours => "2h",
            Interval::FourHours => "4h",
            Interval::SixHours => "6h",
            Interval::EightHours => "8h",
            Interval::TwelveHours => "12h",
            Interval::OneDay => "1d",
            Interval::ThreeDays => "3d",
            Interval::OneWeek => "1w",
            Interval::OneMonth => "1M",
        }
    }

    /// 周期长度（毫秒），月线按30天估算
    pub fn duration_ms(&self) -> i64 {
        const MINUTE: i64 = 60_000;
        match self {
            Interval::OneMinute => MINUTE,
            Interval::ThreeMinutes => 3 * MINUTE,
            Interval::FiveMinutes => 5 * MINUTE,
            Interval::FifteenMinutes => 15 * MINUTE,
            Interval::ThirtyMinutes => 30 * MINUTE,
            Interval::OneHour => 60 * MINUTE,
            Interval::TwoHours => 120 * MINUTE,
            Interval::FourHours => 240 * MINUTE,
            Interval::SixHours => 360 * MINUTE,
            Interval::EightHours => 480 * MINUTE,
            Interval::TwelveHours => 720 * MINUTE,
            Interval::OneDay => 1_440 * MINUTE,
            Interval::ThreeDays => 3 * 1_440 * MINUTE,
            Interval::OneWeek => 7 * 1_440 * MINUTE,
            Interval::OneMonth => 30 * 1_440 * MINUTE,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = crate::core::error::ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        Interval::from_string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_side_from_amount() {
        assert_eq!(PositionSide::from_amount(Decimal::new(5, 1)), PositionSide::Long);
        assert_eq!(PositionSide::from_amount(Decimal::new(-5, 1)), PositionSide::Short);
        assert_eq!(PositionSide::from_amount(Decimal::ZERO), PositionSide::Flat);
    }

    #[test]
    fn test_order_side_parsing_accepts_position_words() {
        assert_eq!("long".parse::<OrderSide>().unwrap(), OrderSide::Buy);
        assert_eq!("SELL".parse::<OrderSide>().unwrap(), OrderSide::Sell);
        assert!("sideways".parse::<OrderSide>().is_err());
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
    }

    #[test]
    fn test_protective_order_types() {
        assert!(OrderType::StopMarket.is_protective());
        assert!(OrderType::from_exchange("TAKE_PROFIT_MARKET").is_protective());
        assert!(OrderType::TrailingStopMarket.is_protective());
        assert!(!OrderType::Limit.is_protective());
        assert!(!OrderType::from_exchange("STOP").is_protective());
    }

    #[test]
    fn test_interval_round_trip() {
        for raw in ["1m", "15m", "4h", "1d", "1M"] {
            let interval = Interval::from_string(raw).unwrap();
            assert_eq!(interval.to_string(), raw);
        }
        assert_eq!(Interval::FiveMinutes.duration_ms(), 300_000);
        assert!(Interval::from_string("7m").is_err());
    }

    #[test]
    fn test_trading_pair_tradable() {
        let pair = TradingPair {
            symbol: "BTCUSDT".to_string(),
            status: "TRADING".to_string(),
            contract_type: "PERPETUAL".to_string(),
            tick_size: "0.10".to_string(),
            step_size: "0.001".to_string(),
            min_notional: None,
        };
        assert!(pair.is_tradable());

        let quarterly = TradingPair {
            contract_type: "CURRENT_QUARTER".to_string(),
            ..pair
        };
        assert!(!quarterly.is_tradable());
    }
}
