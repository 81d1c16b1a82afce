//! 交易对名称转换
//!
//! 用户输入可以是 "BTC/USDT"、"btc-usdt"、"BTC_USDT" 或 "BTCUSDT"，
//! 提交给币安期货前统一转换为 "BTCUSDT"。

/// 常见的报价货币列表（按优先级排序）
const QUOTE_CURRENCIES: &[&str] = &["USDT", "USDC", "BUSD", "FDUSD", "BTC", "ETH", "BNB"];

/// 转换为币安期货使用的交易对格式
pub fn to_exchange_symbol(symbol: &str) -> String {
    let trimmed = symbol.trim();
    // 兼容 "BTC/USDT:USDT" 这类永续合约写法
    let without_settle = trimmed.split(':').next().unwrap_or(trimmed);

    without_settle
        .chars()
        .filter(|c| !matches!(c, '/' | '-' | '_' | ' '))
        .collect::<String>()
        .to_uppercase()
}

/// 拆分出基础货币和报价货币
pub fn split_symbol(symbol: &str) -> Option<(String, String)> {
    let normalized = to_exchange_symbol(symbol);

    QUOTE_CURRENCIES.iter().find_map(|quote| {
        normalized
            .strip_suffix(quote)
            .filter(|base| !base.is_empty())
            .map(|base| (base.to_string(), quote.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_exchange_symbol() {
        assert_eq!(to_exchange_symbol("BTC/USDT"), "BTCUSDT");
        assert_eq!(to_exchange_symbol("eth-usdt"), "ETHUSDT");
        assert_eq!(to_exchange_symbol("SOL_USDT"), "SOLUSDT");
        assert_eq!(to_exchange_symbol("BTC/USDT:USDT"), "BTCUSDT");
        assert_eq!(to_exchange_symbol("DOGEUSDT"), "DOGEUSDT");
    }

    #[test]
    fn test_split_symbol() {
        assert_eq!(
            split_symbol("BTC/USDT"),
            Some(("BTC".to_string(), "USDT".to_string()))
        );
        assert_eq!(
            split_symbol("ethbtc"),
            Some(("ETH".to_string(), "BTC".to_string()))
        );
        assert_eq!(split_symbol("USDT"), None);
    }
}
