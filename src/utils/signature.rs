use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// 币安请求签名工具
pub struct SignatureHelper;

impl SignatureHelper {
    /// Binance 签名: hex(HMAC-SHA256(query_string))
    pub fn binance_signature(secret: &str, query_string: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC 支持任意长度密钥");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// URL 编码并保持参数顺序，签名和实际发送必须使用同一个字符串
    pub fn build_query_string(params: &[(String, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// 毫秒级时间戳
    pub fn timestamp() -> u64 {
        Utc::now().timestamp_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binance_signature_known_vector() {
        // 币安官方文档中的示例
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            SignatureHelper::binance_signature(secret, query),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_build_query_string_keeps_order_and_encodes() {
        let params = vec![
            ("symbol".to_string(), "BTCUSDT".to_string()),
            ("note".to_string(), "a b".to_string()),
        ];
        assert_eq!(
            SignatureHelper::build_query_string(&params),
            "symbol=BTCUSDT&note=a%20b"
        );
    }
}
