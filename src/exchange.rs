//! Typed WEEX contract endpoints
//!
//! Wraps [`SignedApiClient`] with one method per endpoint and decodes each
//! response against a single explicit schema. Anything that does not match is
//! reported as [`ExchangeError::Schema`] rather than patched over.

use crate::config::ExchangeConfig;
use crate::services::api_client::{ApiResult, SignedApiClient};
use crate::services::api_errors::ApiFailure;
use crate::services::transport::{ReqwestTransport, Transport, TransportError};
use crate::types::{
    AccountAsset, Candle, OpenPosition, OrderAck, OrderPricing, OrderRequest, OrderSide,
    PlanOrder, PlanOrderPage, Position, PositionSide,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

const POSITIONS_PATH: &str = "/capi/v2/account/position/allPosition";
const PLACE_ORDER_PATH: &str = "/capi/v2/order/placeOrder";
const LEVERAGE_PATH: &str = "/capi/v2/account/leverage";
const ASSETS_PATH: &str = "/capi/v2/account/assets";
const CANDLES_PATH: &str = "/capi/v2/market/candles";
const PLAN_HISTORY_PATH: &str = "/capi/v2/order/historyPlan";

/// Largest page the plan-history endpoint serves
pub const MAX_PLAN_PAGE_SIZE: u32 = 500;

/// Envelope codes the exchange uses for success
const SUCCESS_CODES: [&str; 3] = ["0", "200", "00000"];

/// Errors from the typed exchange layer
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Api(#[from] ApiFailure),

    #[error("unexpected response from {endpoint}: {message}")]
    Schema {
        endpoint: &'static str,
        message: String,
    },

    #[error("exchange rejected request (code {code}): {msg}")]
    Rejected { code: String, msg: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ExchangeError {
    fn schema(endpoint: &'static str, message: impl fmt::Display) -> Self {
        ExchangeError::Schema {
            endpoint,
            message: message.to_string(),
        }
    }
}

/// Account margin mode, sent as an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginMode {
    Cross,
    Isolated,
}

impl MarginMode {
    pub fn code(self) -> u8 {
        match self {
            MarginMode::Cross => 1,
            MarginMode::Isolated => 3,
        }
    }
}

impl FromStr for MarginMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cross" | "1" => Ok(MarginMode::Cross),
            "isolated" | "3" => Ok(MarginMode::Isolated),
            other => Err(format!("unknown margin mode '{}'", other)),
        }
    }
}

/// Filters for plan-order history
#[derive(Debug, Clone, Default)]
pub struct PlanHistoryQuery {
    pub symbol: String,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    /// 1 open long, 2 open short, 3 close long, 4 close short
    pub delegate_type: Option<u8>,
    pub page_size: Option<u32>,
}

impl PlanHistoryQuery {
    pub fn for_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    fn to_params(&self) -> Result<Vec<(String, String)>, ExchangeError> {
        if self.symbol.trim().is_empty() {
            return Err(ExchangeError::InvalidInput("symbol must not be empty".into()));
        }
        if let Some(kind) = self.delegate_type {
            if !(1..=4).contains(&kind) {
                return Err(ExchangeError::InvalidInput(format!(
                    "delegate type must be within 1..=4, got {}",
                    kind
                )));
            }
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Err(ExchangeError::InvalidInput(format!(
                    "start time {} is after end time {}",
                    start, end
                )));
            }
        }

        let mut params = vec![("symbol".to_string(), self.symbol.clone())];
        if let Some(start) = self.start_time {
            params.push(("startTime".to_string(), start.to_string()));
        }
        if let Some(end) = self.end_time {
            params.push(("endTime".to_string(), end.to_string()));
        }
        if let Some(kind) = self.delegate_type {
            params.push(("delegateType".to_string(), kind.to_string()));
        }
        if let Some(size) = self.page_size {
            if size == 0 {
                return Err(ExchangeError::InvalidInput("page size must be positive".into()));
            }
            let size = size.min(MAX_PLAN_PAGE_SIZE);
            params.push(("pageSize".to_string(), size.to_string()));
        }
        Ok(params)
    }
}

/// Exchange operations the position monitor relies on
pub trait FuturesExchange: Send + Sync {
    /// Open positions for one symbol
    fn open_positions(
        &self,
        symbol: &str,
    ) -> impl Future<Output = Result<Vec<OpenPosition>, ExchangeError>> + Send;

    /// Latest traded price
    fn last_price(&self, symbol: &str) -> impl Future<Output = Result<Decimal, ExchangeError>> + Send;

    /// Reduce-only market close of the whole position
    fn close_position(
        &self,
        position: &Position,
    ) -> impl Future<Output = Result<OrderAck, ExchangeError>> + Send;
}

// ---- raw response shapes ----

#[derive(Debug, Deserialize)]
struct RawPosition {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    symbol: String,
    side: String,
    size: Decimal,
    open_value: Decimal,
    leverage: Decimal,
    #[serde(rename = "unrealizePnl", default)]
    unrealize_pnl: Decimal,
    #[serde(rename = "liquidatePrice", default)]
    liquidate_price: Decimal,
    #[serde(default)]
    margin_mode: String,
}

/// `[ts, open, high, low, close, volume, turnover]`
type RawCandle = (Decimal, Decimal, Decimal, Decimal, Decimal, Decimal, Decimal);

#[derive(Debug, Deserialize)]
struct RawOrderAck {
    #[serde(deserialize_with = "string_or_number")]
    order_id: String,
    #[serde(default)]
    client_oid: String,
}

#[derive(Debug, Deserialize)]
struct RawPlanPage {
    list: Vec<PlanOrder>,
    #[serde(rename = "nextPage", default)]
    next_page: bool,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

impl RawPosition {
    fn into_position(self) -> Result<OpenPosition, String> {
        let side = match self.side.to_uppercase().as_str() {
            "LONG" => PositionSide::Long,
            "SHORT" => PositionSide::Short,
            other => return Err(format!("unknown position side '{}'", other)),
        };
        if self.size <= Decimal::ZERO {
            return Err(format!("position {} has non-positive size {}", self.id, self.size));
        }
        Ok(OpenPosition {
            entry_price: self.open_value / self.size,
            id: self.id,
            symbol: self.symbol,
            side,
            size: self.size,
            leverage: self.leverage,
            unrealized_pnl: self.unrealize_pnl,
            liquidation_price: self.liquidate_price,
            margin_mode: self.margin_mode,
        })
    }
}

fn into_candle(raw: RawCandle) -> Result<Candle, String> {
    let (ts, open, high, low, close, volume, turnover) = raw;
    let timestamp = ts
        .to_i64()
        .ok_or_else(|| format!("candle timestamp {} out of range", ts))?;
    Ok(Candle {
        timestamp,
        open,
        high,
        low,
        close,
        volume,
        turnover,
    })
}

/// Reject envelopes that carry a non-success `code`
fn check_envelope(value: Value) -> Result<Value, ExchangeError> {
    let code = match value.get("code") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => Some(other.to_string()),
    };
    let Some(code) = code else {
        return Ok(value);
    };
    if SUCCESS_CODES.contains(&code.as_str()) {
        return Ok(value);
    }
    let msg = value
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or("no message")
        .to_string();
    Err(ExchangeError::Rejected { code, msg })
}

fn decode<D: DeserializeOwned>(endpoint: &'static str, result: ApiResult) -> Result<D, ExchangeError> {
    let value = check_envelope(result.into_result()?)?;
    serde_json::from_value(value).map_err(|e| ExchangeError::schema(endpoint, e))
}

/// Fresh client order id
pub fn new_client_oid() -> String {
    Uuid::new_v4().simple().to_string()
}

/// WEEX contract API client
pub struct WeexClient<T = ReqwestTransport> {
    api: SignedApiClient<T>,
}

impl WeexClient<ReqwestTransport> {
    pub fn new(config: &ExchangeConfig) -> Result<Self, TransportError> {
        Ok(Self {
            api: SignedApiClient::new(config)?,
        })
    }
}

impl<T: Transport> WeexClient<T> {
    pub fn with_api(api: SignedApiClient<T>) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &SignedApiClient<T> {
        &self.api
    }

    /// Open positions, optionally filtered by symbol
    pub async fn fetch_positions(&self, symbol: Option<&str>) -> Result<Vec<OpenPosition>, ExchangeError> {
        let params = match symbol {
            Some(symbol) => vec![("symbol".to_string(), symbol.to_string())],
            None => Vec::new(),
        };
        let raw: Vec<RawPosition> = decode(POSITIONS_PATH, self.api.get(POSITIONS_PATH, &params).await)?;

        let positions = raw
            .into_iter()
            .filter(|row| {
                let flat = row.size.is_zero();
                if flat {
                    debug!("[Exchange] Skipping flat {} {} row {}", row.symbol, row.side, row.id);
                }
                !flat
            })
            .map(RawPosition::into_position)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ExchangeError::schema(POSITIONS_PATH, e))?;

        debug!("[Exchange] {} open position(s)", positions.len());
        Ok(positions)
    }

    /// K-line bars; `granularity` is the exchange interval name such as `1m` or `15m`
    pub async fn fetch_candles(
        &self,
        symbol: &str,
        granularity: &str,
        limit: u32,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<Vec<Candle>, ExchangeError> {
        if symbol.trim().is_empty() {
            return Err(ExchangeError::InvalidInput("symbol must not be empty".into()));
        }
        let mut params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("granularity".to_string(), granularity.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        if let Some(start) = start_time {
            params.push(("startTime".to_string(), start.to_string()));
        }
        if let Some(end) = end_time {
            params.push(("endTime".to_string(), end.to_string()));
        }

        let raw: Vec<RawCandle> = decode(CANDLES_PATH, self.api.get_public(CANDLES_PATH, &params).await)?;
        raw.into_iter()
            .map(into_candle)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ExchangeError::schema(CANDLES_PATH, e))
    }

    /// Close of the most recent one-minute bar
    pub async fn last_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        let candles = self.fetch_candles(symbol, "1m", 1, None, None).await?;
        candles
            .iter()
            .max_by_key(|c| c.timestamp)
            .map(|c| c.close)
            .ok_or_else(|| ExchangeError::schema(CANDLES_PATH, format!("no candles for {}", symbol)))
    }

    /// Submit an order
    pub async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        if order.symbol.trim().is_empty() {
            return Err(ExchangeError::InvalidInput("symbol must not be empty".into()));
        }
        if order.size <= Decimal::ZERO {
            return Err(ExchangeError::InvalidInput(format!(
                "order size must be positive, got {}",
                order.size
            )));
        }

        let mut body = json!({
            "symbol": order.symbol,
            "client_oid": order.client_order_id,
            "size": order.size.to_string(),
            "type": order.type_code(),
            "order_type": "0",
            "match_price": "1",
        });
        if let OrderPricing::Limit(price) = order.pricing {
            if price <= Decimal::ZERO {
                return Err(ExchangeError::InvalidInput(format!(
                    "limit price must be positive, got {}",
                    price
                )));
            }
            body["match_price"] = json!("0");
            body["price"] = json!(price.to_string());
        }

        let raw: RawOrderAck = decode(PLACE_ORDER_PATH, self.api.post(PLACE_ORDER_PATH, &body).await)?;
        info!(
            "[Exchange] Order {} accepted: {} {} {} (type {})",
            raw.order_id,
            order.side,
            order.size,
            order.symbol,
            order.type_code()
        );

        Ok(OrderAck {
            order_id: raw.order_id,
            client_oid: if raw.client_oid.is_empty() {
                order.client_order_id.clone()
            } else {
                raw.client_oid
            },
        })
    }

    /// Reduce-only market order for the full position size
    pub async fn close_position(&self, position: &Position) -> Result<OrderAck, ExchangeError> {
        self.place_order(&OrderRequest::close(position, new_client_oid()))
            .await
    }

    /// Market order opening or adding to a position
    pub async fn open_market(
        &self,
        symbol: &str,
        side: OrderSide,
        size: Decimal,
    ) -> Result<OrderAck, ExchangeError> {
        self.place_order(&OrderRequest::open_market(symbol, side, size, new_client_oid()))
            .await
    }

    /// Set leverage for both directions; cross margin requires them to match
    pub async fn set_leverage(
        &self,
        symbol: &str,
        margin_mode: MarginMode,
        long_leverage: Decimal,
        short_leverage: Decimal,
    ) -> Result<Value, ExchangeError> {
        if long_leverage <= Decimal::ZERO || short_leverage <= Decimal::ZERO {
            return Err(ExchangeError::InvalidInput("leverage must be positive".into()));
        }
        if margin_mode == MarginMode::Cross && long_leverage != short_leverage {
            return Err(ExchangeError::InvalidInput(format!(
                "cross margin needs equal leverage, got long {} short {}",
                long_leverage, short_leverage
            )));
        }

        let body = json!({
            "symbol": symbol,
            "marginMode": margin_mode.code(),
            "longLeverage": long_leverage.to_string(),
            "shortLeverage": short_leverage.to_string(),
        });
        decode(LEVERAGE_PATH, self.api.post(LEVERAGE_PATH, &body).await)
    }

    /// Futures account balances
    pub async fn account_assets(&self) -> Result<Vec<AccountAsset>, ExchangeError> {
        decode(ASSETS_PATH, self.api.get(ASSETS_PATH, &[]).await)
    }

    /// Trigger-order history
    pub async fn plan_order_history(&self, query: &PlanHistoryQuery) -> Result<PlanOrderPage, ExchangeError> {
        let params = query.to_params()?;
        let raw: RawPlanPage = decode(PLAN_HISTORY_PATH, self.api.get(PLAN_HISTORY_PATH, &params).await)?;
        Ok(PlanOrderPage {
            orders: raw.list,
            has_more: raw.next_page,
        })
    }
}

impl<T: Transport> FuturesExchange for WeexClient<T> {
    async fn open_positions(&self, symbol: &str) -> Result<Vec<OpenPosition>, ExchangeError> {
        let positions = self.fetch_positions(Some(symbol)).await?;
        Ok(positions.into_iter().filter(|p| p.symbol == symbol).collect())
    }

    async fn last_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        WeexClient::last_price(self, symbol).await
    }

    async fn close_position(&self, position: &Position) -> Result<OrderAck, ExchangeError> {
        WeexClient::close_position(self, position).await
    }
}
