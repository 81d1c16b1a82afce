use async_trait::async_trait;
use reqwest::{Method, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};

use crate::core::{
    config::{ApiKeys, ClientConfig},
    error::ExchangeError,
    exchange::FuturesExchange,
    types::*,
};
use crate::utils::{to_exchange_symbol, SignatureHelper};

/// 币安"无需切换保证金模式"
const NO_NEED_TO_CHANGE_MARGIN_TYPE: i32 = -4046;
/// 无效交易对
const INVALID_SYMBOL: i32 = -1121;

/// 下单被交易所拒绝的错误码（精度、最小名义价值、保证金不足、只减仓冲突等）
const ORDER_REJECT_CODES: &[i32] = &[
    -1013, -1111, -2010, -2019, -2021, -2022, -4003, -4131, -4164,
];

#[derive(Debug, Deserialize)]
struct BinanceApiError {
    code: i32,
    msg: String,
}

/// 币安U本位永续合约
pub struct BinanceFutures {
    client: reqwest::Client,
    api_keys: ApiKeys,
    base_url: String,
    recv_window_ms: u64,
    timeout_secs: u64,
}

impl BinanceFutures {
    pub fn new(config: &ClientConfig, api_keys: ApiKeys) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        log::info!(
            "🔗 初始化币安期货客户端: {} (testnet={})",
            config.futures_base_url(),
            config.testnet
        );

        Ok(Self {
            client,
            api_keys,
            base_url: config.futures_base_url(),
            recv_window_ms: config.recv_window_ms,
            timeout_secs: config.request_timeout_secs,
        })
    }

    /// 发送认证请求
    async fn send_signed_request<T>(
        &self,
        method: Method,
        endpoint: &str,
        mut params: Vec<(String, String)>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        params.push(("recvWindow".to_string(), self.recv_window_ms.to_string()));
        params.push((
            "timestamp".to_string(),
            SignatureHelper::timestamp().to_string(),
        ));

        let query_string = SignatureHelper::build_query_string(&params);
        let signature = SignatureHelper::binance_signature(&self.api_keys.api_secret, &query_string);
        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, endpoint, query_string, signature
        );

        log::debug!("➡️ {} {}", method, endpoint);

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_keys.api_key)
            .send()
            .await
            .map_err(|e| self.transport_error(e, endpoint))?;

        self.handle_response(response, endpoint).await
    }

    /// 发送公共请求
    async fn send_public_request<T>(&self, endpoint: &str, params: Vec<(String, String)>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let mut url = format!("{}{}", self.base_url, endpoint);
        if !params.is_empty() {
            url = format!("{}?{}", url, SignatureHelper::build_query_string(&params));
        }

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e, endpoint))?;

        self.handle_response(response, endpoint).await
    }

    fn transport_error(&self, error: reqwest::Error, endpoint: &str) -> ExchangeError {
        if error.is_timeout() {
            ExchangeError::TimeoutError {
                operation: endpoint.to_string(),
                timeout_seconds: self.timeout_secs,
            }
        } else {
            ExchangeError::NetworkError(error)
        }
    }

    async fn handle_response<T>(&self, response: Response, endpoint: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let status = response.status();

        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| self.transport_error(e, endpoint))?;
            return Ok(serde_json::from_str(&body)?);
        }

        // 429: 超出权重限制；418: IP 已被临时封禁
        if status.as_u16() == 429 || status.as_u16() == 418 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            log::warn!(
                "⚠️ 币安限流 {} (HTTP {}), Retry-After={:?}",
                endpoint,
                status.as_u16(),
                retry_after
            );
            return Err(ExchangeError::RateLimitError(
                format!("HTTP {} {}: {}", status.as_u16(), endpoint, body),
                retry_after,
            ));
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "未知错误".to_string());

        match serde_json::from_str::<BinanceApiError>(&body) {
            Ok(api_error) => Err(ExchangeError::ApiError {
                code: api_error.code,
                message: api_error.msg,
            }),
            Err(_) => Err(ExchangeError::ApiError {
                code: status.as_u16() as i32,
                message: body,
            }),
        }
    }
}

fn non_zero(value: Decimal) -> Option<Decimal> {
    if value.is_zero() {
        None
    } else {
        Some(value)
    }
}

fn decimal_at(row: &[serde_json::Value], index: usize) -> Result<Decimal> {
    let raw = row
        .get(index)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ExchangeError::ParseError(format!("K线字段{}缺失", index)))?;
    raw.parse::<Decimal>()
        .map_err(|e| ExchangeError::ParseError(format!("K线字段{}无法解析 '{}': {}", index, raw, e)))
}

fn int_at(row: &[serde_json::Value], index: usize) -> Result<i64> {
    row.get(index)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ExchangeError::ParseError(format!("K线字段{}不是整数", index)))
}

/// 币安K线格式: [开盘时间, 开盘价, 最高价, 最低价, 收盘价, 成交量, 收盘时间, 成交额, 成交次数, ...]
fn parse_kline(row: &[serde_json::Value]) -> Result<Kline> {
    if row.len() < 9 {
        return Err(ExchangeError::ParseError(format!(
            "K线字段数量不足: {}",
            row.len()
        )));
    }

    Ok(Kline {
        open_time: int_at(row, 0)?,
        open: decimal_at(row, 1)?,
        high: decimal_at(row, 2)?,
        low: decimal_at(row, 3)?,
        close: decimal_at(row, 4)?,
        volume: decimal_at(row, 5)?,
        close_time: int_at(row, 6)?,
        quote_volume: decimal_at(row, 7)?,
        trade_count: int_at(row, 8)? as u64,
    })
}

#[serde_as]
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceOrder {
    order_id: i64,
    symbol: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    #[serde_as(as = "DisplayFromStr")]
    orig_qty: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    price: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    stop_price: Decimal,
    #[serde(default)]
    reduce_only: bool,
    #[serde(default)]
    time_in_force: Option<String>,
    status: String,
}

impl BinanceOrder {
    fn into_order(self) -> Result<Order> {
        Ok(Order {
            id: self.order_id.to_string(),
            side: self.side.parse()?,
            order_type: OrderType::from_exchange(&self.order_type),
            quantity: self.orig_qty,
            price: non_zero(self.price),
            trigger_price: non_zero(self.stop_price),
            reduce_only: self.reduce_only,
            time_in_force: self
                .time_in_force
                .as_deref()
                .and_then(TimeInForce::from_exchange),
            status: OrderStatus::from_exchange(&self.status),
            symbol: self.symbol,
        })
    }
}

#[async_trait]
impl FuturesExchange for BinanceFutures {
    fn name(&self) -> &str {
        "binance"
    }

    async fn get_price(&self, symbol: &str) -> Result<Decimal> {
        #[serde_as]
        #[derive(Deserialize)]
        struct BinanceTickerPrice {
            #[serde_as(as = "DisplayFromStr")]
            price: Decimal,
        }

        let exchange_symbol = to_exchange_symbol(symbol);
        let ticker: BinanceTickerPrice = self
            .send_public_request(
                "/fapi/v1/ticker/price",
                vec![("symbol".to_string(), exchange_symbol.clone())],
            )
            .await
            .map_err(|e| match e {
                ExchangeError::ApiError { code, .. } if code == INVALID_SYMBOL => {
                    ExchangeError::SymbolNotFound {
                        symbol: exchange_symbol.clone(),
                    }
                }
                other => other,
            })?;

        Ok(ticker.price)
    }

    async fn get_futures_symbols(&self) -> Result<Vec<TradingPair>> {
        #[derive(Deserialize)]
        struct BinanceExchangeInfo {
            symbols: Vec<BinanceSymbol>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct BinanceSymbol {
            symbol: String,
            status: String,
            #[serde(default)]
            contract_type: String,
            filters: Vec<BinanceFilter>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct BinanceFilter {
            filter_type: String,
            tick_size: Option<String>,
            step_size: Option<String>,
            notional: Option<String>,
        }

        let info: BinanceExchangeInfo = self
            .send_public_request("/fapi/v1/exchangeInfo", Vec::new())
            .await?;

        let mut pairs = Vec::with_capacity(info.symbols.len());
        for symbol in info.symbols {
            let mut tick_size = None;
            let mut step_size = None;
            let mut min_notional = None;

            for filter in symbol.filters {
                match filter.filter_type.as_str() {
                    "PRICE_FILTER" => tick_size = filter.tick_size,
                    "LOT_SIZE" => step_size = filter.step_size,
                    "MIN_NOTIONAL" => {
                        min_notional = filter.notional.and_then(|n| n.parse::<Decimal>().ok())
                    }
                    _ => {}
                }
            }

            match (tick_size, step_size) {
                (Some(tick_size), Some(step_size)) => pairs.push(TradingPair {
                    symbol: symbol.symbol,
                    status: symbol.status,
                    contract_type: symbol.contract_type,
                    tick_size,
                    step_size,
                    min_notional,
                }),
                _ => log::debug!("跳过缺少精度过滤器的交易对: {}", symbol.symbol),
            }
        }

        log::debug!("📋 币安期货交易对数量: {}", pairs.len());
        Ok(pairs)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        #[derive(Deserialize)]
        struct BinanceLeverageResponse {
            leverage: u32,
        }

        let response: BinanceLeverageResponse = self
            .send_signed_request(
                Method::POST,
                "/fapi/v1/leverage",
                vec![
                    ("symbol".to_string(), to_exchange_symbol(symbol)),
                    ("leverage".to_string(), leverage.to_string()),
                ],
            )
            .await?;

        log::debug!("{} 杠杆已设置为 {}x", symbol, response.leverage);
        Ok(())
    }

    async fn set_margin_type(&self, symbol: &str, isolated: bool) -> Result<MarginChange> {
        let margin_type = if isolated { "ISOLATED" } else { "CROSSED" };

        let result: Result<serde_json::Value> = self
            .send_signed_request(
                Method::POST,
                "/fapi/v1/marginType",
                vec![
                    ("symbol".to_string(), to_exchange_symbol(symbol)),
                    ("marginType".to_string(), margin_type.to_string()),
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(MarginChange::Changed),
            Err(ExchangeError::ApiError { code, .. }) if code == NO_NEED_TO_CHANGE_MARGIN_TYPE => {
                Ok(MarginChange::AlreadySet)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_order(&self, request: OrderRequest) -> Result<Order> {
        let exchange_symbol = to_exchange_symbol(&request.symbol);

        let mut params = vec![
            ("symbol".to_string(), exchange_symbol.clone()),
            ("side".to_string(), request.side.as_str().to_string()),
            ("type".to_string(), request.order_type.as_str().to_string()),
            ("quantity".to_string(), request.quantity.clone()),
        ];
        if let Some(price) = &request.price {
            params.push(("price".to_string(), price.clone()));
        }
        if let Some(stop_price) = &request.stop_price {
            params.push(("stopPrice".to_string(), stop_price.clone()));
        }
        if request.reduce_only {
            params.push(("reduceOnly".to_string(), "true".to_string()));
        }
        if let Some(tif) = request.time_in_force {
            if request.order_type == OrderType::Limit {
                params.push(("timeInForce".to_string(), tif.as_str().to_string()));
            }
        }
        if let Some(working_type) = request.working_type {
            params.push(("workingType".to_string(), working_type.as_str().to_string()));
        }
        if let Some(client_order_id) = &request.client_order_id {
            params.push(("newClientOrderId".to_string(), client_order_id.clone()));
        }

        let response: BinanceOrder = self
            .send_signed_request(Method::POST, "/fapi/v1/order", params)
            .await
            .map_err(|e| match e {
                ExchangeError::ApiError { code, message } if ORDER_REJECT_CODES.contains(&code) => {
                    ExchangeError::OrderRejected {
                        symbol: exchange_symbol.clone(),
                        reason: format!("{} ({})", message, code),
                    }
                }
                other => other,
            })?;

        response.into_order()
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
        let _response: serde_json::Value = self
            .send_signed_request(
                Method::DELETE,
                "/fapi/v1/order",
                vec![
                    ("symbol".to_string(), to_exchange_symbol(symbol)),
                    ("orderId".to_string(), order_id.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>> {
        let mut params = Vec::new();
        if let Some(symbol) = symbol {
            params.push(("symbol".to_string(), to_exchange_symbol(symbol)));
        }

        let orders: Vec<BinanceOrder> = self
            .send_signed_request(Method::GET, "/fapi/v1/openOrders", params)
            .await?;

        orders.into_iter().map(BinanceOrder::into_order).collect()
    }

    async fn get_positions(&self, symbol: Option<&str>) -> Result<Vec<Position>> {
        #[serde_as]
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct BinancePosition {
            symbol: String,
            #[serde_as(as = "DisplayFromStr")]
            position_amt: Decimal,
            #[serde_as(as = "DisplayFromStr")]
            entry_price: Decimal,
            #[serde_as(as = "DisplayFromStr")]
            mark_price: Decimal,
            #[serde_as(as = "DisplayFromStr")]
            #[serde(default)]
            notional: Decimal,
            #[serde(default)]
            leverage: Option<String>,
        }

        let mut params = Vec::new();
        if let Some(symbol) = symbol {
            params.push(("symbol".to_string(), to_exchange_symbol(symbol)));
        }

        let positions: Vec<BinancePosition> = self
            .send_signed_request(Method::GET, "/fapi/v2/positionRisk", params)
            .await?;

        // 只返回有持仓的
        Ok(positions
            .into_iter()
            .filter(|p| !p.position_amt.is_zero())
            .map(|p| Position {
                symbol: p.symbol,
                amount: p.position_amt,
                notional: p.notional,
                entry_price: p.entry_price,
                mark_price: p.mark_price,
                leverage: p.leverage.and_then(|l| l.parse().ok()),
            })
            .collect())
    }

    async fn get_balance(&self, asset: &str) -> Result<Balance> {
        #[serde_as]
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct BinanceBalance {
            asset: String,
            #[serde_as(as = "DisplayFromStr")]
            balance: Decimal,
            #[serde_as(as = "DisplayFromStr")]
            available_balance: Decimal,
        }

        let balances: Vec<BinanceBalance> = self
            .send_signed_request(Method::GET, "/fapi/v2/balance", Vec::new())
            .await?;

        let asset = asset.to_uppercase();
        Ok(balances
            .into_iter()
            .find(|b| b.asset == asset)
            .map(|b| Balance {
                free: b.available_balance,
                used: b.balance - b.available_balance,
                total: b.balance,
                asset: b.asset,
            })
            .unwrap_or(Balance {
                asset,
                free: Decimal::ZERO,
                used: Decimal::ZERO,
                total: Decimal::ZERO,
            }))
    }

    async fn get_klines(&self, query: KlineQuery) -> Result<Vec<Kline>> {
        let mut params = vec![
            ("symbol".to_string(), to_exchange_symbol(&query.symbol)),
            ("interval".to_string(), query.interval.as_str().to_string()),
            ("limit".to_string(), query.limit.to_string()),
        ];
        if let Some(start_time) = query.start_time {
            params.push(("startTime".to_string(), start_time.to_string()));
        }
        if let Some(end_time) = query.end_time {
            params.push(("endTime".to_string(), end_time.to_string()));
        }

        let rows: Vec<Vec<serde_json::Value>> =
            self.send_public_request("/fapi/v1/klines", params).await?;

        rows.iter().map(|row| parse_kline(row)).collect()
    }
}
