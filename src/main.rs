use clap::{Arg, ArgAction, ArgMatches, Command};
use rust_decimal::Decimal;
use rustperp::{
    core::config::ClientConfig,
    core::error::ExchangeError,
    core::types::{Interval, OrderSide, OrderType, PositionSide},
    engine::{KlineRequest, TradeManager},
    utils::init_logger,
};
use serde::Serialize;

fn symbol_arg() -> Arg {
    Arg::new("symbol")
        .value_name("SYMBOL")
        .help("交易对，如 BTCUSDT 或 BTC/USDT")
        .required(true)
}

fn side_arg() -> Arg {
    Arg::new("side")
        .value_name("SIDE")
        .help("方向: LONG/BUY 或 SHORT/SELL")
        .required(true)
}

fn entry_args(command: Command) -> Command {
    command
        .arg(symbol_arg())
        .arg(side_arg())
        .arg(
            Arg::new("leverage")
                .short('l')
                .long("leverage")
                .value_name("N")
                .default_value("1"),
        )
        .arg(
            Arg::new("amount")
                .short('a')
                .long("amount")
                .value_name("QUOTE")
                .help("下单金额（计价资产）")
                .required(true),
        )
        .arg(Arg::new("sl").long("sl").value_name("PRICE").help("止损价"))
        .arg(Arg::new("tp").long("tp").value_name("PRICE").help("止盈价"))
}

fn cli() -> Command {
    Command::new("rustperp")
        .version("0.1.0")
        .about("永续合约执行与对账客户端")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("YAML 配置文件路径")
                .global(true),
        )
        .subcommand(Command::new("price").about("查询最新价格").arg(symbol_arg()))
        .subcommand(
            Command::new("balance")
                .about("查询余额")
                .arg(Arg::new("asset").value_name("ASSET")),
        )
        .subcommand(
            Command::new("positions")
                .about("查询持仓")
                .arg(Arg::new("symbol").value_name("SYMBOL")),
        )
        .subcommand(
            Command::new("orders")
                .about("查询挂单")
                .arg(Arg::new("symbol").value_name("SYMBOL")),
        )
        .subcommand(entry_args(Command::new("market").about("市价开仓")))
        .subcommand(
            entry_args(Command::new("limit").about("限价开仓，止损止盈在成交后补挂")).arg(
                Arg::new("price")
                    .short('p')
                    .long("price")
                    .value_name("PRICE")
                    .required(true),
            ),
        )
        .subcommand(
            Command::new("close")
                .about("市价平仓")
                .arg(symbol_arg())
                .arg(Arg::new("side").long("side").value_name("SIDE")),
        )
        .subcommand(
            Command::new("cancel")
                .about("撤销交易对的挂单")
                .arg(symbol_arg())
                .arg(
                    Arg::new("type")
                        .long("type")
                        .value_name("ORDER_TYPE")
                        .help("只撤销该类型，如 STOP_MARKET"),
                ),
        )
        .subcommand(Command::new("clean-orphans").about("清理没有持仓的止损止盈单"))
        .subcommand(
            Command::new("adjust-sl")
                .about("调整止损价")
                .arg(symbol_arg())
                .arg(side_arg())
                .arg(Arg::new("price").value_name("PRICE").required(true)),
        )
        .subcommand(Command::new("sweep-pending").about("为已成交的限价单补挂止损止盈"))
        .subcommand(
            Command::new("history")
                .about("拉取历史K线")
                .arg(symbol_arg())
                .arg(
                    Arg::new("interval")
                        .short('i')
                        .long("interval")
                        .default_value("1h"),
                )
                .arg(Arg::new("limit").short('n').long("limit").value_name("N"))
                .arg(
                    Arg::new("since")
                        .long("since")
                        .value_name("MILLIS")
                        .help("起始时间（毫秒时间戳）"),
                )
                .arg(
                    Arg::new("include-open")
                        .long("include-open")
                        .action(ArgAction::SetTrue)
                        .help("保留尚未收盘的最后一根"),
                ),
        )
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, ExchangeError> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| ExchangeError::ParseError(format!("缺少参数: {}", name)))
}

fn parse_decimal(raw: &str, name: &str) -> Result<Decimal, ExchangeError> {
    raw.parse::<Decimal>()
        .map_err(|e| ExchangeError::ParseError(format!("{} 不是有效数字 '{}': {}", name, raw, e)))
}

fn optional_decimal(matches: &ArgMatches, name: &str) -> Result<Option<Decimal>, ExchangeError> {
    matches
        .get_one::<String>(name)
        .map(|raw| parse_decimal(raw, name))
        .transpose()
}

fn parse_number<T: std::str::FromStr>(raw: &str, name: &str) -> Result<T, ExchangeError> {
    raw.parse::<T>()
        .map_err(|_| ExchangeError::ParseError(format!("{} 不是有效整数: {}", name, raw)))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ExchangeError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(manager: &TradeManager, matches: &ArgMatches) -> Result<(), ExchangeError> {
    match matches.subcommand() {
        Some(("price", sub)) => {
            let symbol = required(sub, "symbol")?;
            println!("{} {}", symbol, manager.get_price(symbol).await?);
        }
        Some(("balance", sub)) => {
            let asset = sub.get_one::<String>("asset").map(String::as_str);
            print_json(&manager.get_balance(asset).await?)?;
        }
        Some(("positions", sub)) => {
            let symbol = sub.get_one::<String>("symbol").map(String::as_str);
            print_json(&manager.get_positions(symbol).await?)?;
        }
        Some(("orders", sub)) => {
            let symbol = sub.get_one::<String>("symbol").map(String::as_str);
            print_json(&manager.get_open_orders(symbol).await?)?;
        }
        Some(("market", sub)) => {
            let side: OrderSide = required(sub, "side")?.parse()?;
            let result = manager
                .place_market_entry(
                    required(sub, "symbol")?,
                    side,
                    parse_number(required(sub, "leverage")?, "leverage")?,
                    parse_decimal(required(sub, "amount")?, "amount")?,
                    optional_decimal(sub, "sl")?,
                    optional_decimal(sub, "tp")?,
                )
                .await;
            print_json(&result)?;
        }
        Some(("limit", sub)) => {
            let side: OrderSide = required(sub, "side")?.parse()?;
            let result = manager
                .place_limit_entry_with_protection(
                    required(sub, "symbol")?,
                    side,
                    parse_decimal(required(sub, "price")?, "price")?,
                    parse_number(required(sub, "leverage")?, "leverage")?,
                    parse_decimal(required(sub, "amount")?, "amount")?,
                    optional_decimal(sub, "sl")?,
                    optional_decimal(sub, "tp")?,
                )
                .await;
            print_json(&result)?;
        }
        Some(("close", sub)) => {
            let side = sub
                .get_one::<String>("side")
                .map(|s| s.parse::<PositionSide>())
                .transpose()?;
            print_json(&manager.close_position(required(sub, "symbol")?, side).await)?;
        }
        Some(("cancel", sub)) => {
            let order_type = sub
                .get_one::<String>("type")
                .map(|t| OrderType::from_exchange(&t.to_uppercase()));
            print_json(
                &manager
                    .cancel_orders(required(sub, "symbol")?, order_type)
                    .await,
            )?;
        }
        Some(("clean-orphans", _)) => {
            print_json(&manager.clean_orphan_orders().await)?;
        }
        Some(("adjust-sl", sub)) => {
            let side: PositionSide = required(sub, "side")?.parse()?;
            let result = manager
                .adjust_stop_loss(
                    required(sub, "symbol")?,
                    side,
                    parse_decimal(required(sub, "price")?, "price")?,
                )
                .await?;
            print_json(&result)?;
        }
        Some(("sweep-pending", _)) => {
            print_json(&manager.sweep_pending_protection().await)?;
        }
        Some(("history", sub)) => {
            let symbol = required(sub, "symbol")?;
            let interval = Interval::from_string(required(sub, "interval")?)?;
            let limit = sub
                .get_one::<String>("limit")
                .map(|n| parse_number::<usize>(n, "limit"))
                .transpose()?;
            let since = sub
                .get_one::<String>("since")
                .map(|n| parse_number::<i64>(n, "since"))
                .transpose()?;

            let mut request = match since {
                Some(since) => KlineRequest::since(symbol, interval, since),
                None => KlineRequest::latest(symbol, interval, limit.unwrap_or(100)),
            };
            if let Some(limit) = limit {
                request = request.with_limit(limit);
            }
            if sub.get_flag("include-open") {
                request = request.include_open_bar();
            }

            let bars = manager.fetch_history(request).await?;
            log::info!("📊 {} [{}] 共 {} 根K线", symbol, interval, bars.len());
            print_json(&bars)?;
        }
        _ => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = cli().get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    init_logger(&config.log)?;

    let manager = TradeManager::binance(&config)?;

    if let Err(e) = run(&manager, &matches).await {
        log::error!("❌ 执行失败: {}", e);
        return Err(e.into());
    }
    Ok(())
}
