//! WEEX Futures Trader Library
//!
//! Client and tooling for the WEEX contract REST API:
//!
//! 1. **Signed client**: HMAC-SHA256 request signing with bounded retry and
//!    exponential backoff, returning a uniform result instead of panicking.
//!
//! 2. **Tiered position monitor**: polls open positions, tracks the best profit
//!    each one has reached, and closes it with a reduce-only market order when
//!    price gives back past its tier's stop or breaches the fixed stop loss.

pub mod config;
pub mod exchange;
pub mod services;
pub mod types;

pub use config::{Config, Credentials, ExchangeConfig, MonitorConfig, Tier, TierLadder};
pub use exchange::{ExchangeError, FuturesExchange, MarginMode, PlanHistoryQuery, WeexClient};
pub use services::{ApiErrorKind, ApiFailure, ApiResult, SignedApiClient, TieredPositionMonitor};
pub use types::{
    AccountAsset, Candle, OpenPosition, OrderAck, OrderRequest, OrderSide, PlanOrder, Position,
    PositionSide,
};
