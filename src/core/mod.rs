// 核心模块 - 错误、类型、交易所接口、配置与重试
pub mod config;
pub mod error;
pub mod exchange;
pub mod retry_policy;
pub mod types;

pub use config::*;
pub use error::*;
pub use exchange::*;
pub use retry_policy::{RateLimitRetry, RetryConfig, RetryPolicy};
pub use types::{
    Balance, Interval, Kline, KlineQuery, MarginChange, Order, OrderRequest, OrderSide,
    OrderStatus, OrderType, Position, PositionSide, SymbolFilters, TimeInForce, TradingPair,
    WorkingType,
};
