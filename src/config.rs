//! Configuration management for the WEEX trader

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default contract API host
pub const DEFAULT_BASE_URL: &str = "https://api-contract.weex.com";

/// API credentials for signed requests
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl Credentials {
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            passphrase: passphrase.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key_hint: String = self.api_key.chars().take(4).collect();
        f.debug_struct("Credentials")
            .field("api_key", &format!("{}***", key_hint))
            .field("secret", &"***")
            .field("passphrase", &"***")
            .finish()
    }
}

/// Settings for the signed REST client
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub base_url: String,
    /// Sent as the `locale` header on every request
    pub locale: String,
    pub credentials: Option<Credentials>,
    /// Per-call HTTP timeout
    pub timeout: Duration,
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Backoff before the first retry; doubles with each further attempt
    pub retry_base_delay: Duration,
    /// Upper bound for any single backoff sleep
    pub retry_max_delay: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            locale: "zh-CN".to_string(),
            credentials: None,
            timeout: Duration::from_secs(15),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(2000),
            retry_max_delay: Duration::from_secs(30),
        }
    }
}

/// A single take-profit tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier {
    /// High-water profit (fraction of entry) at which the tier activates
    pub trigger_profit_pct: Decimal,
    /// Ratio of entry price used to place the tier's stop
    pub give_back_ratio: Decimal,
}

impl Tier {
    pub fn new(trigger_profit_pct: Decimal, give_back_ratio: Decimal) -> Self {
        Self {
            trigger_profit_pct,
            give_back_ratio,
        }
    }
}

/// Ordered tier ladder, strictly increasing in trigger profit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierLadder {
    tiers: Vec<Tier>,
}

impl TierLadder {
    pub fn new(tiers: Vec<Tier>) -> Result<Self> {
        for (i, tier) in tiers.iter().enumerate() {
            if tier.trigger_profit_pct <= Decimal::ZERO {
                anyhow::bail!("tier {} trigger must be positive, got {}", i, tier.trigger_profit_pct);
            }
            if tier.give_back_ratio < Decimal::ZERO || tier.give_back_ratio > Decimal::ONE {
                anyhow::bail!("tier {} give-back ratio must be within [0, 1], got {}", i, tier.give_back_ratio);
            }
        }
        for pair in tiers.windows(2) {
            if pair[1].trigger_profit_pct <= pair[0].trigger_profit_pct {
                anyhow::bail!(
                    "tier triggers must be strictly increasing ({} then {})",
                    pair[0].trigger_profit_pct,
                    pair[1].trigger_profit_pct
                );
            }
        }
        Ok(Self { tiers })
    }

    /// Parse `trigger:give_back` pairs separated by commas, e.g. `0.03:0.20,0.05:0.30`
    pub fn parse(raw: &str) -> Result<Self> {
        let mut tiers = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (trigger, give_back) = entry
                .split_once(':')
                .with_context(|| format!("tier '{}' is not in trigger:give_back form", entry))?;
            let trigger = Decimal::from_str(trigger.trim())
                .with_context(|| format!("invalid tier trigger '{}'", trigger))?;
            let give_back = Decimal::from_str(give_back.trim())
                .with_context(|| format!("invalid tier give-back '{}'", give_back))?;
            tiers.push(Tier::new(trigger, give_back));
        }
        Self::new(tiers)
    }

    pub fn get(&self, index: usize) -> Option<&Tier> {
        self.tiers.get(index)
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tier> {
        self.tiers.iter()
    }

    /// Highest tier whose trigger has been reached by `high_water`
    pub fn qualifying_tier(&self, high_water: Decimal) -> Option<usize> {
        self.tiers
            .iter()
            .rposition(|tier| tier.trigger_profit_pct <= high_water)
    }
}

impl Default for TierLadder {
    fn default() -> Self {
        Self {
            tiers: vec![
                Tier::new(Decimal::new(3, 2), Decimal::new(20, 2)),
                Tier::new(Decimal::new(5, 2), Decimal::new(30, 2)),
                Tier::new(Decimal::new(10, 2), Decimal::new(50, 2)),
            ],
        }
    }
}

/// Settings for the tiered position monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub symbol: String,
    pub interval: Duration,
    /// Loss (fraction of entry) that forces a close regardless of tier
    pub fixed_stop_loss_pct: Decimal,
    pub tiers: TierLadder,
    /// Log close decisions without submitting orders
    pub dry_run: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            symbol: "cmt_btcusdt".to_string(),
            interval: Duration::from_secs(4),
            fixed_stop_loss_pct: Decimal::new(5, 2),
            tiers: TierLadder::default(),
            dry_run: false,
        }
    }
}

/// Top-level configuration loaded from environment
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let api_key = non_empty_var("WEEX_API_KEY");
        let secret = non_empty_var("WEEX_API_SECRET").or_else(|| non_empty_var("WEEX_SECRET"));
        let passphrase = non_empty_var("WEEX_ACCESS_PASSPHRASE")
            .or_else(|| non_empty_var("WEEX_API_PASSPHRASE"));

        let credentials = match (api_key, secret, passphrase) {
            (Some(key), Some(secret), Some(passphrase)) => {
                Some(Credentials::new(key, secret, passphrase))
            }
            (None, None, None) => None,
            _ => anyhow::bail!(
                "WEEX_API_KEY, WEEX_API_SECRET and WEEX_ACCESS_PASSPHRASE must be set together"
            ),
        };

        let defaults = ExchangeConfig::default();
        let exchange = ExchangeConfig {
            base_url: non_empty_var("WEEX_BASE_URL").unwrap_or(defaults.base_url),
            locale: non_empty_var("WEEX_LOCALE").unwrap_or(defaults.locale),
            credentials,
            timeout: Duration::from_secs(parse_var("WEEX_TIMEOUT_SECONDS", 15u64)?),
            max_retries: parse_var("WEEX_MAX_RETRIES", defaults.max_retries)?,
            retry_base_delay: Duration::from_millis(parse_var("WEEX_RETRY_BASE_DELAY_MS", 2000u64)?),
            retry_max_delay: Duration::from_millis(parse_var("WEEX_RETRY_MAX_DELAY_MS", 30_000u64)?),
        };

        let defaults = MonitorConfig::default();
        let tiers = match non_empty_var("PROFIT_TIERS") {
            Some(raw) => TierLadder::parse(&raw).context("invalid PROFIT_TIERS")?,
            None => defaults.tiers,
        };

        let fixed_stop_loss_pct = parse_var("FIXED_STOP_LOSS", defaults.fixed_stop_loss_pct)?;
        if fixed_stop_loss_pct <= Decimal::ZERO {
            anyhow::bail!("FIXED_STOP_LOSS must be positive, got {}", fixed_stop_loss_pct);
        }

        let monitor = MonitorConfig {
            symbol: non_empty_var("MONITOR_SYMBOL").unwrap_or(defaults.symbol),
            interval: poll_interval(parse_var("MONITOR_INTERVAL_SECONDS", 4u64)?)?,
            fixed_stop_loss_pct,
            tiers,
            dry_run: env::var("DRY_RUN")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(false),
        };

        Ok(Self { exchange, monitor })
    }

    /// Check if signed endpoints can be used
    pub fn has_credentials(&self) -> bool {
        self.exchange.credentials.is_some()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn poll_interval(secs: u64) -> Result<Duration> {
    if secs == 0 {
        anyhow::bail!("MONITOR_INTERVAL_SECONDS must be at least 1");
    }
    Ok(Duration::from_secs(secs))
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {} '{}': {}", name, raw, e)),
        None => Ok(default),
    }
}
