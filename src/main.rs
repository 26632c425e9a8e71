//! WEEX Futures Trader CLI
//!
//! Account queries, order helpers and the tiered stop-loss monitor.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use weex_trader::exchange::new_client_oid;
use weex_trader::services::{plan_trade, TradePlan, TradeSignal};
use weex_trader::{
    Config, MarginMode, OrderSide, PlanHistoryQuery, TieredPositionMonitor, WeexClient,
};

#[derive(Parser)]
#[command(name = "weex-trader")]
#[command(about = "Trading tools for WEEX USDT-margined futures")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tiered stop-loss monitor until Ctrl+C
    Monitor {
        /// Contract symbol (defaults to MONITOR_SYMBOL)
        #[arg(short, long)]
        symbol: Option<String>,

        /// Poll interval in seconds (defaults to MONITOR_INTERVAL_SECONDS)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Log close decisions without placing orders
        #[arg(long)]
        dry_run: bool,
    },

    /// Show open positions
    Positions {
        /// Only this symbol
        #[arg(short, long)]
        symbol: Option<String>,
    },

    /// Show futures account balances
    Assets,

    /// Show recent K-line bars
    Candles {
        #[arg(short, long, default_value = "cmt_btcusdt")]
        symbol: String,

        /// Bar interval, e.g. 1m, 15m, 1h
        #[arg(short, long, default_value = "15m")]
        granularity: String,

        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Set leverage for a symbol
    Leverage {
        #[arg(short, long)]
        symbol: String,

        /// cross or isolated
        #[arg(short, long, default_value = "cross")]
        margin_mode: MarginMode,

        #[arg(long)]
        long: Decimal,

        /// Defaults to the long leverage
        #[arg(long)]
        short: Option<Decimal>,
    },

    /// Open a position with a market order
    Order {
        #[arg(short, long)]
        symbol: String,

        /// buy (long) or sell (short)
        #[arg(long)]
        side: OrderSide,

        #[arg(long)]
        size: Decimal,
    },

    /// Close every open position with reduce-only market orders
    CloseAll {
        /// Only this symbol
        #[arg(short, long)]
        symbol: Option<String>,

        /// Show what would be closed without placing orders
        #[arg(long)]
        dry_run: bool,
    },

    /// Show trigger-order history
    PlanHistory {
        #[arg(short, long, default_value = "cmt_btcusdt")]
        symbol: String,

        /// 1 open long, 2 open short, 3 close long, 4 close short
        #[arg(short, long)]
        delegate_type: Option<u8>,

        /// Start of window, milliseconds since epoch
        #[arg(long)]
        start: Option<i64>,

        /// End of window, milliseconds since epoch
        #[arg(long)]
        end: Option<i64>,

        #[arg(short, long, default_value = "100")]
        page_size: u32,
    },

    /// Turn an LLM reply into an order plan
    Signal {
        /// File holding the model's reply
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long, default_value = "cmt_btcusdt")]
        symbol: String,

        /// Size for new positions
        #[arg(short, long, default_value = "0.001")]
        amount: Decimal,

        /// Place the order instead of only printing the plan
        #[arg(long)]
        execute: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let client = WeexClient::new(&config.exchange).context("failed to build HTTP client")?;

    match cli.command {
        Commands::Monitor { symbol, interval, dry_run } => {
            run_monitor(config, client, symbol, interval, dry_run).await?
        }
        Commands::Positions { symbol } => show_positions(&client, symbol.as_deref()).await?,
        Commands::Assets => show_assets(&client).await?,
        Commands::Candles { symbol, granularity, limit } => {
            show_candles(&client, &symbol, &granularity, limit).await?
        }
        Commands::Leverage { symbol, margin_mode, long, short } => {
            let short = short.unwrap_or(long);
            client.set_leverage(&symbol, margin_mode, long, short).await?;
            println!("Leverage for {} set to {}x long / {}x short", symbol, long, short);
        }
        Commands::Order { symbol, side, size } => {
            let ack = client.open_market(&symbol, side, size).await?;
            println!("Order placed: {} (client id {})", ack.order_id, ack.client_oid);
        }
        Commands::CloseAll { symbol, dry_run } => close_all(&client, symbol.as_deref(), dry_run).await?,
        Commands::PlanHistory { symbol, delegate_type, start, end, page_size } => {
            let query = PlanHistoryQuery {
                symbol,
                start_time: start,
                end_time: end,
                delegate_type,
                page_size: Some(page_size),
            };
            show_plan_history(&client, &query).await?
        }
        Commands::Signal { file, symbol, amount, execute } => {
            run_signal(&client, &file, &symbol, amount, execute).await?
        }
    }

    Ok(())
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

async fn run_monitor(
    config: Config,
    client: WeexClient,
    symbol: Option<String>,
    interval: Option<u64>,
    dry_run: bool,
) -> Result<()> {
    if !config.has_credentials() {
        anyhow::bail!("the monitor needs WEEX_API_KEY, WEEX_API_SECRET and WEEX_ACCESS_PASSPHRASE");
    }

    let mut monitor_config = config.monitor;
    if let Some(symbol) = symbol {
        monitor_config.symbol = symbol;
    }
    if let Some(secs) = interval {
        monitor_config.interval = Duration::from_secs(secs.max(1));
    }
    monitor_config.dry_run |= dry_run;

    println!("\n{}", "=".repeat(70));
    println!("  TIERED STOP-LOSS MONITOR");
    println!(
        "  Symbol: {} | Interval: {}s | Fixed stop: {}%",
        monitor_config.symbol,
        monitor_config.interval.as_secs(),
        monitor_config.fixed_stop_loss_pct * Decimal::ONE_HUNDRED
    );
    for (i, tier) in monitor_config.tiers.iter().enumerate() {
        println!(
            "  Tier {}: trigger {}% | give-back {}%",
            i,
            tier.trigger_profit_pct * Decimal::ONE_HUNDRED,
            tier.give_back_ratio * Decimal::ONE_HUNDRED
        );
    }
    println!("  Mode: {}", if monitor_config.dry_run { "DRY RUN" } else { "LIVE" });
    println!("{}\n", "=".repeat(70));

    let mut monitor = TieredPositionMonitor::new(client, monitor_config);
    monitor.run().await;
    Ok(())
}

async fn show_positions(client: &WeexClient, symbol: Option<&str>) -> Result<()> {
    let positions = client.fetch_positions(symbol).await?;

    println!("\n{}", "=".repeat(90));
    println!("  OPEN POSITIONS ({})", positions.len());
    println!("{}", "=".repeat(90));

    if positions.is_empty() {
        println!("  No open positions");
        return Ok(());
    }

    println!(
        "  {:<16} {:<6} {:>10} {:>14} {:>6} {:>12} {:>14}",
        "SYMBOL", "SIDE", "SIZE", "ENTRY", "LEV", "UPNL", "LIQ PRICE"
    );
    println!("  {}", "-".repeat(86));
    for p in &positions {
        println!(
            "  {:<16} {:<6} {:>10} {:>14.2} {:>6} {:>12.4} {:>14.2}",
            p.symbol, p.side, p.size, p.entry_price, p.leverage, p.unrealized_pnl, p.liquidation_price
        );
    }

    Ok(())
}

async fn show_assets(client: &WeexClient) -> Result<()> {
    let assets = client.account_assets().await?;

    println!("\n{}", "=".repeat(70));
    println!("  ACCOUNT ASSETS");
    println!("{}", "=".repeat(70));
    println!(
        "  {:<8} {:>14} {:>14} {:>14} {:>14}",
        "COIN", "AVAILABLE", "FROZEN", "EQUITY", "UPNL"
    );
    println!("  {}", "-".repeat(66));
    for a in &assets {
        println!(
            "  {:<8} {:>14.4} {:>14.4} {:>14.4} {:>14.4}",
            a.coin_name, a.available, a.frozen, a.equity, a.unrealized_pnl
        );
    }

    Ok(())
}

async fn show_candles(client: &WeexClient, symbol: &str, granularity: &str, limit: u32) -> Result<()> {
    let mut candles = client.fetch_candles(symbol, granularity, limit, None, None).await?;
    candles.sort_by_key(|c| c.timestamp);

    println!("\n{}", "=".repeat(90));
    println!("  {} {} ({} bars)", symbol, granularity, candles.len());
    println!("{}", "=".repeat(90));
    println!(
        "  {:<20} {:>12} {:>12} {:>12} {:>12} {:>14}",
        "TIME (UTC)", "OPEN", "HIGH", "LOW", "CLOSE", "VOLUME"
    );
    println!("  {}", "-".repeat(86));
    for c in &candles {
        println!(
            "  {:<20} {:>12} {:>12} {:>12} {:>12} {:>14}",
            format_millis(c.timestamp),
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume
        );
    }

    if let (Some(first), Some(last)) = (candles.first(), candles.last()) {
        if !first.open.is_zero() {
            let change = (last.close - first.open) / first.open * Decimal::ONE_HUNDRED;
            println!("\n  Change over window: {:.2}%", change);
        }
    }

    Ok(())
}

async fn close_all(client: &WeexClient, symbol: Option<&str>, dry_run: bool) -> Result<()> {
    let positions = client.fetch_positions(symbol).await?;
    if positions.is_empty() {
        println!("No open positions to close");
        return Ok(());
    }

    let mut failures = 0;
    for open in &positions {
        let position = open.priced(open.entry_price);
        if dry_run {
            println!("[DRY RUN] Would close {} {} size {}", open.symbol, open.side, open.size);
            continue;
        }
        match client.close_position(&position).await {
            Ok(ack) => println!("Closed {} {} size {} (order {})", open.symbol, open.side, open.size, ack.order_id),
            Err(e) => {
                error!("Failed to close {} {}: {}", open.symbol, open.side, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} positions failed to close", failures, positions.len());
    }
    Ok(())
}

async fn show_plan_history(client: &WeexClient, query: &PlanHistoryQuery) -> Result<()> {
    let page = client.plan_order_history(query).await?;

    println!("\n{}", "=".repeat(100));
    println!("  PLAN ORDER HISTORY - {} ({} orders)", query.symbol, page.orders.len());
    println!("{}", "=".repeat(100));
    println!(
        "  {:<20} {:<20} {:<12} {:>12} {:>12} {:>10} {:<14}",
        "ORDER ID", "CREATED (UTC)", "TYPE", "TRIGGER", "PRICE", "VOLUME", "STATUS"
    );
    println!("  {}", "-".repeat(96));
    for o in &page.orders {
        println!(
            "  {:<20} {:<20} {:<12} {:>12} {:>12} {:>10} {:<14}",
            o.order_id,
            format_millis(o.create_time),
            o.delegate_label(),
            o.trigger_price,
            o.price,
            o.volume,
            o.status_label()
        );
    }
    if page.has_more {
        println!("\n  More orders available; narrow the time window to see them");
    }

    Ok(())
}

async fn run_signal(
    client: &WeexClient,
    file: &Path,
    symbol: &str,
    amount: Decimal,
    execute: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let signal = TradeSignal::from_completion(&text)?;

    println!("Signal:     {:?}", signal.signal);
    println!("Confidence: {}", signal.confidence);
    println!("Reason:     {}", signal.reason);
    if let Some(stop) = signal.stop_loss {
        println!("Stop loss:  {}", stop);
    }
    if let Some(target) = signal.take_profit {
        println!("Take profit: {}", target);
    }

    let positions = client.fetch_positions(Some(symbol)).await?;
    let current = positions.first();
    if positions.len() > 1 {
        info!("{} has {} positions; planning against the first", symbol, positions.len());
    }

    let plan = plan_trade(&signal, current, amount);
    println!("Plan:       {}", plan);

    let Some(order) = plan.to_order(symbol, new_client_oid()) else {
        return Ok(());
    };
    if !execute {
        println!("Not executing (pass --execute to place the order)");
        return Ok(());
    }

    let ack = client.place_order(&order).await?;
    if matches!(plan, TradePlan::Close { .. }) {
        println!("Closed opposing position (order {})", ack.order_id);
    } else {
        println!("Order placed: {}", ack.order_id);
    }
    Ok(())
}
