use mockito::{Matcher, Server};
use rust_decimal::Decimal;
use rustperp::core::config::{ApiKeys, ClientConfig};
use rustperp::core::error::ExchangeError;
use rustperp::core::exchange::FuturesExchange;
use rustperp::core::types::{Interval, KlineQuery, MarginChange, OrderRequest, OrderSide};
use rustperp::exchanges::BinanceFutures;

fn client(server: &Server) -> BinanceFutures {
    let config = ClientConfig {
        base_url: Some(server.url()),
        ..Default::default()
    };
    BinanceFutures::new(&config, ApiKeys::new("test-key", "test-secret")).unwrap()
}

#[tokio::test]
async fn test_get_price_normalizes_symbol() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v1/ticker/price")
        .match_query(Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()))
        .with_status(200)
        .with_body(r#"{"symbol":"BTCUSDT","price":"6000.01","time":1589437530011}"#)
        .create_async()
        .await;

    let price = client(&server).get_price("btc/usdt").await.unwrap();
    assert_eq!(price, "6000.01".parse::<Decimal>().unwrap());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_invalid_symbol_maps_to_symbol_not_found() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v1/ticker/price")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"code":-1121,"msg":"Invalid symbol."}"#)
        .create_async()
        .await;

    let err = client(&server).get_price("FOOUSDT").await.unwrap_err();
    assert!(matches!(err, ExchangeError::SymbolNotFound { symbol } if symbol == "FOOUSDT"));
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v1/klines")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("Retry-After", "7")
        .with_body(r#"{"code":-1003,"msg":"Too many requests."}"#)
        .create_async()
        .await;

    let err = client(&server)
        .get_klines(KlineQuery {
            symbol: "BTCUSDT".to_string(),
            interval: Interval::OneHour,
            limit: 10,
            start_time: None,
            end_time: None,
        })
        .await
        .unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(err.retry_after(), Some(7));
}

#[tokio::test]
async fn test_ip_ban_is_rate_limited() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v1/exchangeInfo")
        .with_status(418)
        .create_async()
        .await;

    let err = client(&server).get_futures_symbols().await.unwrap_err();
    assert!(matches!(err, ExchangeError::RateLimitError(_, None)));
}

#[tokio::test]
async fn test_klines_are_parsed_with_window() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v1/klines")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("symbol".into(), "ETHUSDT".into()),
            Matcher::UrlEncoded("interval".into(), "15m".into()),
            Matcher::UrlEncoded("limit".into(), "2".into()),
            Matcher::UrlEncoded("endTime".into(), "1700000899999".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"[
                [1700000000000,"2000.10","2010.00","1995.50","2005.25","120.5",1700000899999,"241000.0",310,"60.1","120500.0","0"],
                [1700000900000,"2005.25","2006.00","2001.00","2002.00","80.0",1700001799999,"160200.0",150,"40.0","80100.0","0"]
            ]"#,
        )
        .create_async()
        .await;

    let klines = client(&server)
        .get_klines(KlineQuery {
            symbol: "ETHUSDT".to_string(),
            interval: Interval::FifteenMinutes,
            limit: 2,
            start_time: None,
            end_time: Some(1700000899999),
        })
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(klines.len(), 2);
    assert_eq!(klines[0].open_time, 1700000000000);
    assert_eq!(klines[1].close, "2002.00".parse::<Decimal>().unwrap());
    assert_eq!(klines[0].trade_count, 310);
}

#[tokio::test]
async fn test_exchange_info_extracts_filters() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v1/exchangeInfo")
        .with_status(200)
        .with_body(
            r#"{"timezone":"UTC","symbols":[
                {"symbol":"BTCUSDT","status":"TRADING","contractType":"PERPETUAL","filters":[
                    {"filterType":"PRICE_FILTER","minPrice":"556.80","maxPrice":"4529764","tickSize":"0.10"},
                    {"filterType":"LOT_SIZE","minQty":"0.001","maxQty":"1000","stepSize":"0.001"},
                    {"filterType":"MIN_NOTIONAL","notional":"100"}
                ]},
                {"symbol":"BTCUSDT_250328","status":"TRADING","contractType":"CURRENT_QUARTER","filters":[
                    {"filterType":"PRICE_FILTER","tickSize":"0.1"},
                    {"filterType":"LOT_SIZE","stepSize":"0.001"}
                ]}
            ]}"#,
        )
        .create_async()
        .await;

    let pairs = client(&server).get_futures_symbols().await.unwrap();
    assert_eq!(pairs.len(), 2);
    assert!(pairs[0].is_tradable());
    assert_eq!(pairs[0].tick_size, "0.10");
    assert_eq!(pairs[0].step_size, "0.001");
    assert_eq!(pairs[0].min_notional, Some(Decimal::from(100)));
    assert!(!pairs[1].is_tradable());
}

#[tokio::test]
async fn test_margin_type_no_change_needed() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/fapi/v1/marginType")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"code":-4046,"msg":"No need to change margin type."}"#)
        .create_async()
        .await;

    let change = client(&server).set_margin_type("BTCUSDT", true).await.unwrap();
    assert_eq!(change, MarginChange::AlreadySet);
}

#[tokio::test]
async fn test_margin_type_changed_and_request_is_signed() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/fapi/v1/marginType")
        .match_header("X-MBX-APIKEY", "test-key")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("marginType".into(), "ISOLATED".into()),
            Matcher::UrlEncoded("recvWindow".into(), "60000".into()),
            Matcher::Regex("signature=[0-9a-f]{64}".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"code":200,"msg":"success"}"#)
        .create_async()
        .await;

    let change = client(&server).set_margin_type("BTCUSDT", true).await.unwrap();
    assert_eq!(change, MarginChange::Changed);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_order_rejection_is_typed() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/fapi/v1/order")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"code":-2019,"msg":"Margin is insufficient."}"#)
        .create_async()
        .await;

    let err = client(&server)
        .create_order(OrderRequest::market("BTCUSDT", OrderSide::Buy, "1.000".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::OrderRejected { .. }));
    assert!(err.to_string().contains("-2019"));
}

#[tokio::test]
async fn test_protective_order_parameters() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/fapi/v1/order")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("type".into(), "STOP_MARKET".into()),
            Matcher::UrlEncoded("side".into(), "SELL".into()),
            Matcher::UrlEncoded("stopPrice".into(), "95.0".into()),
            Matcher::UrlEncoded("reduceOnly".into(), "true".into()),
            Matcher::UrlEncoded("workingType".into(), "MARK_PRICE".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"orderId":42,"symbol":"BTCUSDT","side":"SELL","type":"STOP_MARKET","origQty":"1.234",
                "price":"0","stopPrice":"95.0","reduceOnly":true,"timeInForce":"GTC","status":"NEW"}"#,
        )
        .create_async()
        .await;

    let order = client(&server)
        .create_order(OrderRequest::protective(
            "BTCUSDT",
            OrderSide::Sell,
            rustperp::core::types::OrderType::StopMarket,
            "1.234".to_string(),
            "95.0".to_string(),
        ))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(order.id, "42");
    assert!(order.reduce_only);
    assert_eq!(order.trigger_price, Some("95.0".parse().unwrap()));
}

#[tokio::test]
async fn test_positions_skip_flat_rows() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v2/positionRisk")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"[
                {"symbol":"BTCUSDT","positionAmt":"-0.250","entryPrice":"60000.0","markPrice":"59000.0",
                 "unRealizedProfit":"250.0","notional":"-14750.0","leverage":"10","positionSide":"BOTH"},
                {"symbol":"ETHUSDT","positionAmt":"0.000","entryPrice":"0.0","markPrice":"2000.0",
                 "unRealizedProfit":"0.0","notional":"0","leverage":"20","positionSide":"BOTH"}
            ]"#,
        )
        .create_async()
        .await;

    let positions = client(&server).get_positions(None).await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].symbol, "BTCUSDT");
    assert_eq!(positions[0].quantity(), "0.25".parse::<Decimal>().unwrap());
    assert_eq!(positions[0].leverage, Some(10));
}

#[tokio::test]
async fn test_balance_for_asset() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v2/balance")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"[
                {"accountAlias":"SgsR","asset":"USDT","balance":"122.60","crossWalletBalance":"122.60",
                 "crossUnPnl":"0","availableBalance":"100.10","maxWithdrawAmount":"100.10"},
                {"accountAlias":"SgsR","asset":"BNB","balance":"0.5","crossWalletBalance":"0.5",
                 "crossUnPnl":"0","availableBalance":"0.5","maxWithdrawAmount":"0.5"}
            ]"#,
        )
        .create_async()
        .await;

    let balance = client(&server).get_balance("usdt").await.unwrap();
    assert_eq!(balance.total, "122.60".parse::<Decimal>().unwrap());
    assert_eq!(balance.used, "22.50".parse::<Decimal>().unwrap());

    let missing = client(&server).get_balance("BTC").await.unwrap();
    assert!(missing.total.is_zero());
}
