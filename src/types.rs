//! Core types for the WEEX trader

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Order side that reduces a position of this direction
    pub fn closing_side(self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => f.pad("LONG"),
            PositionSide::Short => f.pad("SHORT"),
        }
    }
}

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => f.pad("BUY"),
            OrderSide::Sell => f.pad("SELL"),
        }
    }
}

impl std::str::FromStr for OrderSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" | "long" => Ok(OrderSide::Buy),
            "sell" | "short" => Ok(OrderSide::Sell),
            other => Err(format!("unknown order side '{}'", other)),
        }
    }
}

/// Position as reported by the exchange
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenPosition {
    pub id: String,
    pub symbol: String,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub leverage: Decimal,
    pub unrealized_pnl: Decimal,
    pub liquidation_price: Decimal,
    pub margin_mode: String,
}

impl OpenPosition {
    /// Attach a sampled market price
    pub fn priced(&self, current_price: Decimal) -> Position {
        Position {
            symbol: self.symbol.clone(),
            side: self.side,
            size: self.size,
            entry_price: self.entry_price,
            current_price,
        }
    }
}

/// Position snapshot with a sampled current price, rebuilt on every poll
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
}

impl Position {
    /// Unrealized profit as a fraction of entry price, signed by direction
    pub fn unrealized_pnl_pct(&self) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        let raw = (self.current_price - self.entry_price) / self.entry_price;
        match self.side {
            PositionSide::Long => raw,
            PositionSide::Short => -raw,
        }
    }
}

/// Futures account balance for one coin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAsset {
    pub coin_id: i64,
    pub coin_name: String,
    pub available: Decimal,
    pub frozen: Decimal,
    pub equity: Decimal,
    #[serde(rename = "unrealizePnl", default)]
    pub unrealized_pnl: Decimal,
}

/// One K-line bar
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    /// Open time in milliseconds since epoch
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub turnover: Decimal,
}

/// How an order is priced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderPricing {
    Market,
    Limit(Decimal),
}

/// Order placement request
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub size: Decimal,
    pub pricing: OrderPricing,
    /// Only decrease an existing position
    pub reduce_only: bool,
    pub client_order_id: String,
}

impl OrderRequest {
    /// Reduce-only market order that flattens `position`
    pub fn close(position: &Position, client_order_id: impl Into<String>) -> Self {
        Self {
            symbol: position.symbol.clone(),
            side: position.side.closing_side(),
            size: position.size,
            pricing: OrderPricing::Market,
            reduce_only: true,
            client_order_id: client_order_id.into(),
        }
    }

    /// Market order opening or adding to a position
    pub fn open_market(
        symbol: impl Into<String>,
        side: OrderSide,
        size: Decimal,
        client_order_id: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            pricing: OrderPricing::Market,
            reduce_only: false,
            client_order_id: client_order_id.into(),
        }
    }

    /// Exchange order `type` code: 1 open long, 2 open short, 3 close long, 4 close short
    pub fn type_code(&self) -> &'static str {
        match (self.reduce_only, self.side) {
            (false, OrderSide::Buy) => "1",
            (false, OrderSide::Sell) => "2",
            (true, OrderSide::Sell) => "3",
            (true, OrderSide::Buy) => "4",
        }
    }
}

/// Acknowledgement returned by order placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub client_oid: String,
}

/// Trigger (plan) order from history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOrder {
    pub order_id: String,
    pub symbol: String,
    pub delegate_type: u8,
    pub price: Decimal,
    pub volume: Decimal,
    pub status: i32,
    pub trigger_price: Decimal,
    pub create_time: i64,
    #[serde(default)]
    pub reduce_only: bool,
}

impl PlanOrder {
    pub fn delegate_label(&self) -> &'static str {
        match self.delegate_type {
            1 => "open long",
            2 => "open short",
            3 => "close long",
            4 => "close short",
            _ => "unknown",
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self.status {
            0 => "pending",
            1 => "triggered",
            2 => "trigger failed",
            3 => "cancelled",
            4 => "paused",
            5 => "not triggered",
            _ => "unknown",
        }
    }
}

/// One page of plan-order history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanOrderPage {
    pub orders: Vec<PlanOrder>,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(side: PositionSide, entry: Decimal, current: Decimal) -> Position {
        Position {
            symbol: "cmt_btcusdt".to_string(),
            side,
            size: dec!(0.01),
            entry_price: entry,
            current_price: current,
        }
    }

    #[test]
    fn test_pnl_pct_long_and_short() {
        assert_eq!(position(PositionSide::Long, dec!(100), dec!(103)).unrealized_pnl_pct(), dec!(0.03));
        assert_eq!(position(PositionSide::Short, dec!(100), dec!(103)).unrealized_pnl_pct(), dec!(-0.03));
        assert_eq!(position(PositionSide::Short, dec!(100), dec!(90)).unrealized_pnl_pct(), dec!(0.1));
    }

    #[test]
    fn test_close_order_is_opposite_and_reduce_only() {
        let long_close = OrderRequest::close(&position(PositionSide::Long, dec!(100), dec!(99)), "c1");
        assert_eq!(long_close.side, OrderSide::Sell);
        assert!(long_close.reduce_only);
        assert_eq!(long_close.type_code(), "3");

        let short_close = OrderRequest::close(&position(PositionSide::Short, dec!(100), dec!(99)), "c2");
        assert_eq!(short_close.side, OrderSide::Buy);
        assert_eq!(short_close.type_code(), "4");
        assert_eq!(short_close.size, dec!(0.01));
    }

    #[test]
    fn test_open_type_codes() {
        assert_eq!(OrderRequest::open_market("s", OrderSide::Buy, dec!(1), "a").type_code(), "1");
        assert_eq!(OrderRequest::open_market("s", OrderSide::Sell, dec!(1), "b").type_code(), "2");
    }
}
