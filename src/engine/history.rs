use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::core::error::ExchangeError;
use crate::core::exchange::FuturesExchange;
use crate::core::retry_policy::RateLimitRetry;
use crate::core::types::{Interval, Kline, KlineQuery, Result};

/// 多周期拉取使用的周期及其相对5分钟线的数量比例
const TIMEFRAMES: [(Interval, usize); 5] = [
    (Interval::FiveMinutes, 1),
    (Interval::FifteenMinutes, 3),
    (Interval::OneHour, 12),
    (Interval::FourHours, 48),
    (Interval::OneDay, 288),
];

/// K线拉取请求
///
/// 只给 `limit` 时从最新往回翻页；给了 `since` 时从该时间往后翻页。
/// `closed` 为 true 时去掉尚未收盘的最后一根。
#[derive(Debug, Clone, PartialEq)]
pub struct KlineRequest {
    pub symbol: String,
    pub interval: Interval,
    pub limit: Option<usize>,
    pub since: Option<i64>,
    pub closed: bool,
}

impl KlineRequest {
    pub fn latest(symbol: &str, interval: Interval, limit: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval,
            limit: Some(limit),
            since: None,
            closed: true,
        }
    }

    pub fn since(symbol: &str, interval: Interval, since: i64) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval,
            limit: None,
            since: Some(since),
            closed: true,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn include_open_bar(mut self) -> Self {
        self.closed = false;
        self
    }
}

/// 历史K线拉取
pub struct HistoricalDataFetcher {
    exchange: Arc<dyn FuturesExchange>,
    retry: RateLimitRetry,
    page_size: u32,
    extra_buffer: usize,
}

impl HistoricalDataFetcher {
    pub fn new(
        exchange: Arc<dyn FuturesExchange>,
        retry: RateLimitRetry,
        page_size: u32,
        extra_buffer: usize,
    ) -> Self {
        Self {
            exchange,
            retry,
            page_size: page_size.max(1),
            extra_buffer,
        }
    }

    /// 是否为正在交易的永续合约
    pub async fn check_symbol_tradable(&self, symbol: &str) -> Result<bool> {
        let pairs = self.exchange.get_futures_symbols().await?;
        Ok(pairs.iter().any(|p| p.symbol == symbol && p.is_tradable()))
    }

    async fn ensure_tradable(&self, symbol: &str) -> Result<()> {
        if self.check_symbol_tradable(symbol).await? {
            Ok(())
        } else {
            Err(ExchangeError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
        }
    }

    /// 拉取完整的K线序列
    pub async fn fetch(&self, request: &KlineRequest) -> Result<Vec<Kline>> {
        self.ensure_tradable(&request.symbol).await?;
        self.fetch_unchecked(request).await
    }

    async fn fetch_unchecked(&self, request: &KlineRequest) -> Result<Vec<Kline>> {
        match (request.since, request.limit) {
            (Some(since), limit) => self.fetch_forward(request, since, limit).await,
            (None, Some(limit)) => self.fetch_backward(request, limit).await,
            (None, None) => Err(ExchangeError::Other(format!(
                "{} [{}] 拉取K线需要指定 limit 或 since",
                request.symbol, request.interval
            ))),
        }
    }

    /// 单页请求，限流时按策略重试
    async fn fetch_page(&self, query: KlineQuery) -> Result<Vec<Kline>> {
        self.retry
            .execute_with_retry(|| self.exchange.get_klines(query.clone()))
            .await
    }

    fn check_duplicates(
        &self,
        request: &KlineRequest,
        seen: &mut HashSet<i64>,
        page: &[Kline],
    ) -> Result<()> {
        for bar in page {
            if !seen.insert(bar.open_time) {
                log::error!(
                    "❌ {} [{}] 出现重复K线 open_time={}",
                    request.symbol,
                    request.interval,
                    bar.open_time
                );
                return Err(ExchangeError::DuplicateBar {
                    symbol: request.symbol.clone(),
                    interval: request.interval.to_string(),
                    open_time: bar.open_time,
                });
            }
        }
        Ok(())
    }

    fn insufficient(&self, request: &KlineRequest, expected: usize, got: usize) -> ExchangeError {
        log::warn!(
            "⚠️ {} [{}] 历史数据不足: {} < {}",
            request.symbol,
            request.interval,
            got,
            expected
        );
        ExchangeError::InsufficientData {
            symbol: request.symbol.clone(),
            interval: request.interval.to_string(),
            expected,
            got,
        }
    }

    /// 从最新往回翻页，每页以已有最早一根的前一毫秒为结束时间
    async fn fetch_backward(&self, request: &KlineRequest, limit: usize) -> Result<Vec<Kline>> {
        let target = limit + usize::from(request.closed);
        let mut bars: Vec<Kline> = Vec::with_capacity(target);
        let mut seen = HashSet::with_capacity(target);
        let mut end_time: Option<i64> = None;

        while bars.len() < target {
            let page_limit = (target - bars.len()).min(self.page_size as usize);
            let mut page = self
                .fetch_page(KlineQuery {
                    symbol: request.symbol.clone(),
                    interval: request.interval,
                    limit: page_limit as u32,
                    start_time: None,
                    end_time,
                })
                .await?;

            if page.is_empty() {
                break;
            }
            self.check_duplicates(request, &mut seen, &page)?;
            page.sort_by_key(|k| k.open_time);

            let oldest = page[0].open_time;
            let short_page = page.len() < page_limit;
            page.append(&mut bars);
            bars = page;

            log::debug!(
                "{} [{}] 已获取 {}/{} 根K线",
                request.symbol,
                request.interval,
                bars.len(),
                target
            );

            if short_page {
                break;
            }
            end_time = Some(oldest - 1);
        }

        if bars.len() < target {
            return Err(self.insufficient(request, target, bars.len()));
        }
        if bars.len() > target {
            bars.drain(..bars.len() - target);
        }
        if request.closed {
            // 最新一根尚未收盘
            bars.pop();
        }
        Ok(bars)
    }

    /// 从 `since` 往后翻页，游标为已有最新一根的下一毫秒
    async fn fetch_forward(
        &self,
        request: &KlineRequest,
        since: i64,
        limit: Option<usize>,
    ) -> Result<Vec<Kline>> {
        let target = limit.map(|l| l + usize::from(request.closed));
        let mut bars: Vec<Kline> = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = since;

        loop {
            let page_limit = match target {
                Some(target) => (target.saturating_sub(bars.len())).min(self.page_size as usize),
                None => self.page_size as usize,
            };
            if page_limit == 0 {
                break;
            }

            let mut page = self
                .fetch_page(KlineQuery {
                    symbol: request.symbol.clone(),
                    interval: request.interval,
                    limit: page_limit as u32,
                    start_time: Some(cursor),
                    end_time: None,
                })
                .await?;

            if page.is_empty() {
                break;
            }
            self.check_duplicates(request, &mut seen, &page)?;
            page.sort_by_key(|k| k.open_time);

            let newest = page[page.len() - 1].open_time;
            let short_page = page.len() < page_limit;
            bars.append(&mut page);

            if short_page {
                break;
            }
            cursor = newest + 1;
        }

        if request.closed {
            let now = chrono::Utc::now().timestamp_millis();
            if bars.last().map_or(false, |k| k.close_time > now) {
                bars.pop();
            }
        }

        match limit {
            Some(limit) => {
                bars.truncate(limit);
                if bars.len() < limit {
                    return Err(self.insufficient(request, limit, bars.len()));
                }
            }
            None if bars.is_empty() => return Err(self.insufficient(request, 1, 0)),
            None => {}
        }
        Ok(bars)
    }

    fn timeframe_buffer(&self, buffer: usize) -> usize {
        buffer + self.extra_buffer
    }

    /// 同时拉取 5m/15m/1h/4h/1d 最新的K线，更长周期按比例缩减数量
    pub async fn fetch_timeframes(
        &self,
        symbol: &str,
        limit: usize,
        buffer: usize,
    ) -> Result<BTreeMap<Interval, Vec<Kline>>> {
        self.ensure_tradable(symbol).await?;

        let buffer = self.timeframe_buffer(buffer);
        let mut data = BTreeMap::new();
        for (interval, ratio) in TIMEFRAMES {
            let request = KlineRequest::latest(symbol, interval, limit / ratio + buffer);
            log::info!(
                "📊 拉取 {} [{}] {} 根K线",
                symbol,
                interval,
                request.limit.unwrap_or_default()
            );
            data.insert(interval, self.fetch_unchecked(&request).await?);
        }
        Ok(data)
    }

    /// 同时拉取 5m/15m/1h/4h/1d 自 `since` 之后的K线，每个周期再往前多取 `buffer` 根
    pub async fn fetch_timeframes_since(
        &self,
        symbol: &str,
        since: i64,
        buffer: usize,
    ) -> Result<BTreeMap<Interval, Vec<Kline>>> {
        self.ensure_tradable(symbol).await?;

        let buffer = self.timeframe_buffer(buffer) as i64;
        let mut data = BTreeMap::new();
        for (interval, _) in TIMEFRAMES {
            let start = since - interval.duration_ms() * buffer;
            let request = KlineRequest::since(symbol, interval, start);
            data.insert(interval, self.fetch_unchecked(&request).await?);
        }
        Ok(data)
    }
}
