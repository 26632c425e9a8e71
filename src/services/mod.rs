//! Exchange client and trading services

pub mod api_client;
pub mod api_errors;
pub mod retry;
pub mod signal;
pub mod signer;
pub mod tiered_monitor;
pub mod transport;

pub use api_client::{ApiResult, SignedApiClient};
pub use api_errors::{ApiErrorKind, ApiFailure};
pub use retry::{with_retry, RetryConfig};
pub use signal::{plan_trade, Confidence, SignalError, SignalKind, TradePlan, TradeSignal};
pub use tiered_monitor::{CloseDecision, CloseReason, CycleReport, TierState, TieredPositionMonitor};
pub use transport::{HttpMethod, ReqwestTransport, Transport, TransportError};
