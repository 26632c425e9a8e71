//! LLM trade signals
//!
//! A chat model is prompted elsewhere to answer with a JSON object such as
//! `{"signal":"BUY","reason":"...","stop_loss":64000,"take_profit":69000,"confidence":"HIGH"}`,
//! usually wrapped in prose. This module pulls that object out of the reply
//! and turns it into an order plan against the current position.

use crate::types::{OpenPosition, OrderPricing, OrderRequest, OrderSide, PositionSide};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("completion contains no JSON object")]
    NoJsonObject,
    #[error("malformed signal JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    #[serde(alias = "buy")]
    Buy,
    #[serde(alias = "sell")]
    Sell,
    #[serde(alias = "hold")]
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    #[serde(alias = "high")]
    High,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "low")]
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "HIGH"),
            Confidence::Medium => write!(f, "MEDIUM"),
            Confidence::Low => write!(f, "LOW"),
        }
    }
}

/// Structured recommendation extracted from a model reply
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeSignal {
    pub signal: SignalKind,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    pub confidence: Confidence,
}

impl TradeSignal {
    /// Parse the text between the first `{` and the last `}`
    pub fn from_completion(text: &str) -> Result<Self, SignalError> {
        let start = text.find('{').ok_or(SignalError::NoJsonObject)?;
        let end = text.rfind('}').ok_or(SignalError::NoJsonObject)?;
        if end < start {
            return Err(SignalError::NoJsonObject);
        }
        Ok(serde_json::from_str(&text[start..=end])?)
    }
}

/// What to do about a signal given the current position
#[derive(Debug, Clone, PartialEq)]
pub enum TradePlan {
    Hold,
    /// Flatten the opposing position
    Close { side: PositionSide, size: Decimal },
    /// Open or add in `side`'s direction
    Open { side: OrderSide, size: Decimal },
}

impl TradePlan {
    /// Market order carrying out the plan; `None` for `Hold`
    pub fn to_order(&self, symbol: &str, client_order_id: impl Into<String>) -> Option<OrderRequest> {
        match *self {
            TradePlan::Hold => None,
            TradePlan::Close { side, size } => Some(OrderRequest {
                symbol: symbol.to_string(),
                side: side.closing_side(),
                size,
                pricing: OrderPricing::Market,
                reduce_only: true,
                client_order_id: client_order_id.into(),
            }),
            TradePlan::Open { side, size } => Some(OrderRequest::open_market(
                symbol,
                side,
                size,
                client_order_id,
            )),
        }
    }
}

impl fmt::Display for TradePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradePlan::Hold => write!(f, "hold, no order"),
            TradePlan::Close { side, size } => write!(f, "close {} {}", side, size),
            TradePlan::Open { side, size } => write!(f, "open {} {}", side, size),
        }
    }
}

/// BUY closes a short or else opens/adds long; SELL mirrors it; HOLD does nothing
pub fn plan_trade(signal: &TradeSignal, current: Option<&OpenPosition>, amount: Decimal) -> TradePlan {
    let wanted = match signal.signal {
        SignalKind::Hold => return TradePlan::Hold,
        SignalKind::Buy => OrderSide::Buy,
        SignalKind::Sell => OrderSide::Sell,
    };

    match current {
        Some(position) if position.side.closing_side() == wanted => TradePlan::Close {
            side: position.side,
            size: position.size,
        },
        _ => TradePlan::Open {
            side: wanted,
            size: amount,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn open(side: PositionSide) -> OpenPosition {
        OpenPosition {
            id: "7".to_string(),
            symbol: "cmt_btcusdt".to_string(),
            side,
            size: dec!(0.005),
            entry_price: dec!(65000),
            leverage: dec!(10),
            unrealized_pnl: Decimal::ZERO,
            liquidation_price: Decimal::ZERO,
            margin_mode: "SHARED".to_string(),
        }
    }

    fn signal(kind: SignalKind) -> TradeSignal {
        TradeSignal {
            signal: kind,
            reason: String::new(),
            stop_loss: None,
            take_profit: None,
            confidence: Confidence::Medium,
        }
    }

    #[test]
    fn test_parses_json_wrapped_in_prose() {
        let reply = "Analysis done.\n```json\n{\"signal\": \"BUY\", \"reason\": \"breakout above {resistance}\", \
                     \"stop_loss\": 64000, \"take_profit\": \"69000.5\", \"confidence\": \"HIGH\"}\n```";
        let parsed = TradeSignal::from_completion(reply).unwrap();

        assert_eq!(parsed.signal, SignalKind::Buy);
        assert_eq!(parsed.confidence, Confidence::High);
        assert_eq!(parsed.stop_loss, Some(dec!(64000)));
        assert_eq!(parsed.take_profit, Some(dec!(69000.5)));
        assert!(parsed.reason.contains("{resistance}"));
    }

    #[test]
    fn test_rejects_missing_or_broken_json() {
        assert!(matches!(
            TradeSignal::from_completion("I would hold for now."),
            Err(SignalError::NoJsonObject)
        ));
        assert!(matches!(
            TradeSignal::from_completion("} backwards {"),
            Err(SignalError::NoJsonObject)
        ));
        assert!(matches!(
            TradeSignal::from_completion(r#"{"signal":"MAYBE","confidence":"LOW"}"#),
            Err(SignalError::Malformed(_))
        ));
    }

    #[test]
    fn test_buy_closes_short_first() {
        let short = open(PositionSide::Short);
        let plan = plan_trade(&signal(SignalKind::Buy), Some(&short), dec!(0.001));
        assert_eq!(
            plan,
            TradePlan::Close {
                side: PositionSide::Short,
                size: dec!(0.005)
            }
        );

        let order = plan.to_order("cmt_btcusdt", "oid").unwrap();
        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.type_code(), "4");
    }

    #[test]
    fn test_buy_opens_long_when_flat_or_long() {
        let expected = TradePlan::Open {
            side: OrderSide::Buy,
            size: dec!(0.001),
        };
        assert_eq!(plan_trade(&signal(SignalKind::Buy), None, dec!(0.001)), expected);

        let long = open(PositionSide::Long);
        assert_eq!(plan_trade(&signal(SignalKind::Buy), Some(&long), dec!(0.001)), expected);
    }

    #[test]
    fn test_sell_mirrors_buy() {
        let long = open(PositionSide::Long);
        let plan = plan_trade(&signal(SignalKind::Sell), Some(&long), dec!(0.001));
        assert_eq!(plan.to_order("cmt_btcusdt", "oid").unwrap().type_code(), "3");

        let plan = plan_trade(&signal(SignalKind::Sell), None, dec!(0.001));
        assert_eq!(plan.to_order("cmt_btcusdt", "oid").unwrap().type_code(), "2");
    }

    #[test]
    fn test_hold_does_nothing() {
        let long = open(PositionSide::Long);
        let plan = plan_trade(&signal(SignalKind::Hold), Some(&long), dec!(0.001));
        assert_eq!(plan, TradePlan::Hold);
        assert!(plan.to_order("cmt_btcusdt", "oid").is_none());
    }
}
