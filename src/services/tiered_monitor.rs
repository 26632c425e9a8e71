//! Tiered Position Monitor - polls open positions and closes them on stop triggers
//!
//! Each cycle samples a price for every open position and checks, in order:
//! - Fixed Stop Loss: loss reached the configured hard limit
//! - Tier Stop Loss: the highest tier ever reached has its stop price crossed
//!
//! Tier progress lives in memory only and is dropped as soon as the position is
//! gone or has been closed by the monitor.

use crate::config::MonitorConfig;
use crate::exchange::FuturesExchange;
use crate::types::{Position, PositionSide};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Tier progress for one open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TierState {
    /// Best unrealized profit seen while the position has been open
    pub highest_profit_pct: Decimal,
    /// Highest tier reached; `None` until the first trigger is crossed
    pub current_tier: Option<usize>,
}

/// Why a position is being closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    FixedStopLoss,
    TierStopLoss(usize),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::FixedStopLoss => write!(f, "fixed stop loss"),
            CloseReason::TierStopLoss(tier) => write!(f, "tier {} stop loss", tier),
        }
    }
}

/// A close the monitor decided on during a cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CloseDecision {
    pub symbol: String,
    pub side: PositionSide,
    pub reason: CloseReason,
    pub profit_pct: Decimal,
    pub price: Decimal,
}

/// What happened during one poll cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Position fetch failed; nothing else was done
    pub fetch_failed: bool,
    pub evaluated: usize,
    /// Positions without a price this cycle
    pub skipped: usize,
    pub decisions: Vec<CloseDecision>,
    pub closed: usize,
    pub failed_closes: usize,
}

/// One state per symbol and direction, so hedge-mode accounts stay separate
type PositionKey = (String, PositionSide);

/// Stop price for a tier, measured from entry
pub fn tier_stop_price(position: &Position, give_back_ratio: Decimal) -> Decimal {
    match position.side {
        PositionSide::Long => position.entry_price * (Decimal::ONE - give_back_ratio),
        PositionSide::Short => position.entry_price * (Decimal::ONE + give_back_ratio),
    }
}

/// Advance `state` with a fresh snapshot and decide whether to close
pub fn evaluate(
    config: &MonitorConfig,
    state: &mut TierState,
    position: &Position,
) -> Option<CloseReason> {
    let profit = position.unrealized_pnl_pct();

    if profit <= -config.fixed_stop_loss_pct {
        return Some(CloseReason::FixedStopLoss);
    }

    state.highest_profit_pct = state.highest_profit_pct.max(profit);

    if let Some(candidate) = config.tiers.qualifying_tier(state.highest_profit_pct) {
        if state.current_tier.map_or(true, |current| candidate > current) {
            state.current_tier = Some(candidate);
        }
    }

    let tier_index = state.current_tier?;
    let tier = config.tiers.get(tier_index)?;
    let stop = tier_stop_price(position, tier.give_back_ratio);
    let crossed = match position.side {
        PositionSide::Long => position.current_price <= stop,
        PositionSide::Short => position.current_price >= stop,
    };

    crossed.then_some(CloseReason::TierStopLoss(tier_index))
}

/// Tiered stop-loss monitor service
pub struct TieredPositionMonitor<E> {
    exchange: E,
    config: MonitorConfig,
    states: HashMap<PositionKey, TierState>,
}

impl<E: FuturesExchange> TieredPositionMonitor<E> {
    pub fn new(exchange: E, config: MonitorConfig) -> Self {
        Self {
            exchange,
            config,
            states: HashMap::new(),
        }
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn state(&self, symbol: &str, side: PositionSide) -> Option<&TierState> {
        self.states.get(&(symbol.to_string(), side))
    }

    pub fn tracked(&self) -> usize {
        self.states.len()
    }

    /// Run until Ctrl-C
    pub async fn run(&mut self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Poll on the configured interval until `shutdown` resolves
    pub async fn run_until<F: Future<Output = ()>>(&mut self, shutdown: F) {
        info!(
            "Tiered position monitor started for {} (every {:?}, fixed stop {}%, {} tiers{})",
            self.config.symbol,
            self.config.interval,
            self.config.fixed_stop_loss_pct * Decimal::ONE_HUNDRED,
            self.config.tiers.len(),
            if self.config.dry_run { ", dry run" } else { "" }
        );

        tokio::pin!(shutdown);
        loop {
            let report = self.poll_cycle().await;
            debug!(
                "Cycle done: {} evaluated, {} skipped, {} closed, {} close failures",
                report.evaluated, report.skipped, report.closed, report.failed_closes
            );

            tokio::select! {
                _ = sleep(self.config.interval) => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping position monitor");
                    break;
                }
            }
        }
    }

    /// Fetch, evaluate and act once
    pub async fn poll_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        let positions: Vec<_> = match self.exchange.open_positions(&self.config.symbol).await {
            Ok(positions) => positions
                .into_iter()
                .filter(|p| p.symbol == self.config.symbol)
                .collect(),
            Err(e) => {
                warn!("Failed to fetch positions for {}: {}", self.config.symbol, e);
                report.fetch_failed = true;
                return report;
            }
        };

        let open: HashSet<PositionKey> = positions
            .iter()
            .map(|p| (p.symbol.clone(), p.side))
            .collect();
        self.states.retain(|key, _| {
            let keep = open.contains(key);
            if !keep {
                info!("{} {} no longer open, dropping tier state", key.0, key.1);
            }
            keep
        });

        let mut prices: HashMap<String, Decimal> = HashMap::new();

        for open_position in positions {
            let key = (open_position.symbol.clone(), open_position.side);
            self.states.entry(key.clone()).or_insert_with(|| {
                info!(
                    "Tracking {} {} size {} entry {}",
                    open_position.symbol, open_position.side, open_position.size, open_position.entry_price
                );
                TierState::default()
            });

            let price = match prices.get(&open_position.symbol) {
                Some(price) => *price,
                None => match self.exchange.last_price(&open_position.symbol).await {
                    Ok(price) => {
                        prices.insert(open_position.symbol.clone(), price);
                        price
                    }
                    Err(e) => {
                        warn!("No price for {} this cycle: {}", open_position.symbol, e);
                        report.skipped += 1;
                        continue;
                    }
                },
            };

            let position = open_position.priced(price);
            report.evaluated += 1;

            let Some(state) = self.states.get_mut(&key) else {
                continue;
            };
            let before = *state;
            let reason = evaluate(&self.config, state, &position);

            if state.current_tier != before.current_tier {
                if let Some(tier) = state.current_tier {
                    info!(
                        "{} {} reached tier {} (peak profit {:.2}%)",
                        position.symbol,
                        position.side,
                        tier,
                        state.highest_profit_pct * Decimal::ONE_HUNDRED
                    );
                }
            }

            let Some(reason) = reason else {
                debug!(
                    "{} {} @ {}: profit {:.2}%, tier {:?}",
                    position.symbol,
                    position.side,
                    price,
                    position.unrealized_pnl_pct() * Decimal::ONE_HUNDRED,
                    state.current_tier
                );
                continue;
            };

            let decision = CloseDecision {
                symbol: position.symbol.clone(),
                side: position.side,
                reason,
                profit_pct: position.unrealized_pnl_pct(),
                price,
            };
            info!(
                "[Close] {} {} triggered {} at {} ({:.2}%)",
                decision.symbol,
                decision.side,
                decision.reason,
                decision.price,
                decision.profit_pct * Decimal::ONE_HUNDRED
            );
            report.decisions.push(decision);

            if self.config.dry_run {
                info!("[DRY RUN] Would close {} {} size {}", position.symbol, position.side, position.size);
                continue;
            }

            match self.exchange.close_position(&position).await {
                Ok(ack) => {
                    info!("[Close] {} {} closed, order {}", position.symbol, position.side, ack.order_id);
                    self.states.remove(&key);
                    report.closed += 1;
                }
                Err(e) => {
                    error!("[Close] Failed to close {} {}: {}", position.symbol, position.side, e);
                    report.failed_closes += 1;
                }
            }
        }

        report
    }
}
