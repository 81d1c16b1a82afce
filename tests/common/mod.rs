#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use rustperp::core::config::ClientConfig;
use rustperp::core::error::ExchangeError;
use rustperp::core::exchange::FuturesExchange;
use rustperp::core::retry_policy::RetryConfig;
use rustperp::core::types::*;
use rustperp::engine::{MemoryPendingStore, TradeManager};

pub const BASE_TIME: i64 = 1_600_000_000_000;

pub fn dec(raw: &str) -> Decimal {
    raw.parse().unwrap()
}

pub fn pair(symbol: &str, tick_size: &str, step_size: &str) -> TradingPair {
    TradingPair {
        symbol: symbol.to_string(),
        status: "TRADING".to_string(),
        contract_type: "PERPETUAL".to_string(),
        tick_size: tick_size.to_string(),
        step_size: step_size.to_string(),
        min_notional: None,
    }
}

/// 连续的K线，第一根从 `start` 开始
pub fn bars(start: i64, count: usize, interval: Interval) -> Vec<Kline> {
    let step = interval.duration_ms();
    (0..count)
        .map(|i| {
            let open_time = start + step * i as i64;
            Kline {
                open_time,
                open: Decimal::from(100 + i as i64),
                high: Decimal::from(101 + i as i64),
                low: Decimal::from(99 + i as i64),
                close: Decimal::from(100 + i as i64),
                volume: Decimal::from(10),
                close_time: open_time + step - 1,
                quote_volume: Decimal::from(1000),
                trade_count: 42,
            }
        })
        .collect()
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        margin_cooldown_ms: 0,
        kline_page_size: 5,
        rate_limit_safety_margin_ms: 0,
        extra_buffer: 0,
        retry: RetryConfig {
            max_retries: None,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_factor: 2.0,
            jitter: false,
        },
        ..Default::default()
    }
}

pub fn manager_with(mock: &Arc<MockExchange>) -> (TradeManager, Arc<MemoryPendingStore>) {
    manager_with_config(mock, test_config())
}

pub fn manager_with_config(
    mock: &Arc<MockExchange>,
    config: ClientConfig,
) -> (TradeManager, Arc<MemoryPendingStore>) {
    let store = Arc::new(MemoryPendingStore::new());
    let manager = TradeManager::new(mock.clone(), &config, store.clone());
    (manager, store)
}

#[derive(Default)]
pub struct MockState {
    pub pairs: Vec<TradingPair>,
    pub prices: HashMap<String, Decimal>,
    pub positions: HashMap<String, Decimal>,
    pub open_orders: Vec<Order>,
    pub next_order_id: u64,

    pub submitted: Vec<OrderRequest>,
    /// 每个订单到达交易所的时间
    pub order_times: Vec<tokio::time::Instant>,
    pub cancelled: Vec<String>,
    pub calls: Vec<String>,
    pub symbol_list_calls: usize,
    pub margin_calls: usize,
    pub kline_queries: Vec<KlineQuery>,

    // 故障注入
    pub fail_price: bool,
    pub margin_already_set: bool,
    pub margin_error: bool,
    pub reject_order_types: Vec<OrderType>,
    pub fail_cancel_ids: Vec<String>,
    /// 平仓单只成交一半
    pub partial_close: bool,
    pub kline_failures: VecDeque<ExchangeError>,
    /// 忽略 endTime/startTime，每次都返回同一页
    pub ignore_kline_window: bool,
    pub klines: HashMap<(String, Interval), Vec<Kline>>,
}

/// 模拟交易所：市价单立即成交，其它订单挂在订单簿上
pub struct MockExchange {
    state: Mutex<MockState>,
}

impl MockExchange {
    pub fn new() -> Self {
        let mut state = MockState {
            pairs: vec![
                pair("BTCUSDT", "0.10", "0.001"),
                pair("ETHUSDT", "0.01", "0.001"),
                pair("DOGEUSDT", "0.00001", "1"),
                TradingPair {
                    status: "SETTLING".to_string(),
                    ..pair("LUNAUSDT", "0.0001", "1")
                },
            ],
            next_order_id: 1000,
            ..Default::default()
        };
        state.prices.insert("BTCUSDT".to_string(), dec("100"));
        state.prices.insert("ETHUSDT".to_string(), dec("2000"));
        state.prices.insert("DOGEUSDT".to_string(), dec("0.1234"));

        Self {
            state: Mutex::new(state),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn set_position(&self, symbol: &str, amount: &str) {
        self.state()
            .positions
            .insert(symbol.to_string(), dec(amount));
    }

    pub fn position(&self, symbol: &str) -> Decimal {
        self.state()
            .positions
            .get(symbol)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn add_open_order(&self, symbol: &str, order_type: OrderType, side: OrderSide) -> String {
        let mut state = self.state();
        state.next_order_id += 1;
        let id = state.next_order_id.to_string();
        state.open_orders.push(Order {
            id: id.clone(),
            symbol: symbol.to_string(),
            side,
            reduce_only: order_type.is_protective(),
            order_type,
            quantity: dec("1"),
            price: None,
            trigger_price: None,
            time_in_force: Some(TimeInForce::GTC),
            status: OrderStatus::New,
        });
        id
    }

    pub fn open_order_ids(&self, symbol: &str) -> Vec<String> {
        self.state()
            .open_orders
            .iter()
            .filter(|o| o.symbol == symbol)
            .map(|o| o.id.clone())
            .collect()
    }

    pub fn set_klines(&self, symbol: &str, interval: Interval, series: Vec<Kline>) {
        self.state()
            .klines
            .insert((symbol.to_string(), interval), series);
    }

    pub fn submitted_types(&self) -> Vec<OrderType> {
        self.state()
            .submitted
            .iter()
            .map(|r| r.order_type.clone())
            .collect()
    }

    pub fn call_index(&self, call: &str) -> Option<usize> {
        self.state().calls.iter().position(|c| c == call)
    }
}

#[async_trait]
impl FuturesExchange for MockExchange {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_price(&self, symbol: &str) -> Result<Decimal> {
        let mut state = self.state();
        state.calls.push("get_price".to_string());
        if state.fail_price {
            return Err(ExchangeError::Other("ticker unavailable".to_string()));
        }
        state
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
    }

    async fn get_futures_symbols(&self) -> Result<Vec<TradingPair>> {
        let mut state = self.state();
        state.symbol_list_calls += 1;
        Ok(state.pairs.clone())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        self.state()
            .calls
            .push(format!("set_leverage:{}:{}", symbol, leverage));
        Ok(())
    }

    async fn set_margin_type(&self, symbol: &str, isolated: bool) -> Result<MarginChange> {
        let mut state = self.state();
        state.margin_calls += 1;
        state.calls.push(format!("set_margin_type:{}", symbol));
        assert!(isolated);
        if state.margin_error {
            return Err(ExchangeError::ApiError {
                code: -4047,
                message: "Margin type cannot be changed if there exists open orders.".to_string(),
            });
        }
        if state.margin_already_set {
            Ok(MarginChange::AlreadySet)
        } else {
            Ok(MarginChange::Changed)
        }
    }

    async fn create_order(&self, request: OrderRequest) -> Result<Order> {
        let mut state = self.state();
        state
            .calls
            .push(format!("create_order:{}", request.order_type));
        state.submitted.push(request.clone());
        state.order_times.push(tokio::time::Instant::now());

        if state.reject_order_types.contains(&request.order_type) {
            return Err(ExchangeError::OrderRejected {
                symbol: request.symbol.clone(),
                reason: "Order would immediately trigger. (-2021)".to_string(),
            });
        }

        let quantity = dec(&request.quantity);
        state.next_order_id += 1;
        let id = state.next_order_id.to_string();

        let status = if request.order_type == OrderType::Market {
            let signed = match request.side {
                OrderSide::Buy => quantity,
                OrderSide::Sell => -quantity,
            };
            let current = state
                .positions
                .get(&request.symbol)
                .copied()
                .unwrap_or(Decimal::ZERO);
            let next = if request.reduce_only {
                let fill = if state.partial_close {
                    quantity / Decimal::from(2)
                } else {
                    quantity.min(current.abs())
                };
                if current > Decimal::ZERO && request.side == OrderSide::Sell {
                    current - fill
                } else if current < Decimal::ZERO && request.side == OrderSide::Buy {
                    current + fill
                } else {
                    current
                }
            } else {
                current + signed
            };
            state.positions.insert(request.symbol.clone(), next);
            OrderStatus::Filled
        } else {
            OrderStatus::New
        };

        let order = Order {
            id,
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type.clone(),
            quantity,
            price: request.price.as_deref().map(dec),
            trigger_price: request.stop_price.as_deref().map(dec),
            reduce_only: request.reduce_only,
            time_in_force: request.time_in_force,
            status: status.clone(),
        };
        if status == OrderStatus::New {
            state.open_orders.push(order.clone());
        }
        Ok(order)
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("cancel_order:{}", order_id));
        if state.fail_cancel_ids.iter().any(|id| id == order_id) {
            return Err(ExchangeError::ApiError {
                code: -1001,
                message: "Internal error".to_string(),
            });
        }
        let before = state.open_orders.len();
        state
            .open_orders
            .retain(|o| !(o.id == order_id && o.symbol == symbol));
        if state.open_orders.len() == before {
            return Err(ExchangeError::ApiError {
                code: -2011,
                message: "Unknown order sent.".to_string(),
            });
        }
        state.cancelled.push(order_id.to_string());
        Ok(())
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>> {
        let state = self.state();
        Ok(state
            .open_orders
            .iter()
            .filter(|o| symbol.map_or(true, |s| o.symbol == s))
            .cloned()
            .collect())
    }

    async fn get_positions(&self, symbol: Option<&str>) -> Result<Vec<Position>> {
        let state = self.state();
        Ok(state
            .positions
            .iter()
            .filter(|(s, amount)| !amount.is_zero() && symbol.map_or(true, |sym| *s == sym))
            .map(|(s, amount)| {
                let mark_price = state.prices.get(s).copied().unwrap_or(Decimal::ONE);
                Position {
                    symbol: s.clone(),
                    amount: *amount,
                    notional: *amount * mark_price,
                    entry_price: mark_price,
                    mark_price,
                    leverage: Some(5),
                }
            })
            .collect())
    }

    async fn get_balance(&self, asset: &str) -> Result<Balance> {
        Ok(Balance {
            asset: asset.to_string(),
            free: dec("900"),
            used: dec("100"),
            total: dec("1000"),
        })
    }

    async fn get_klines(&self, query: KlineQuery) -> Result<Vec<Kline>> {
        let mut state = self.state();
        state.kline_queries.push(query.clone());

        if let Some(error) = state.kline_failures.pop_front() {
            return Err(error);
        }

        let series = state
            .klines
            .get(&(query.symbol.clone(), query.interval))
            .cloned()
            .unwrap_or_default();
        let limit = query.limit as usize;

        if state.ignore_kline_window {
            let skip = series.len().saturating_sub(limit);
            return Ok(series[skip..].to_vec());
        }

        let window: Vec<Kline> = series
            .into_iter()
            .filter(|k| query.start_time.map_or(true, |start| k.open_time >= start))
            .filter(|k| query.end_time.map_or(true, |end| k.open_time <= end))
            .collect();

        // 有起始时间时取最早的 limit 根，否则取最新的 limit 根
        if query.start_time.is_some() {
            Ok(window.into_iter().take(limit).collect())
        } else {
            let skip = window.len().saturating_sub(limit);
            Ok(window[skip..].to_vec())
        }
    }
}
