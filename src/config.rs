//! Configuration loading and validation

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::execution::ExecutionConfig;
use crate::market::{AssetClass, PositionHolding};
use crate::pipeline::PipelineConfig;
use crate::risk::RiskConfig;
use crate::routing::{GuardrailFlags, RoutingConfig};
use crate::venue::{SimulationConfig, TradingMode};

lazy_static! {
    static ref SYMBOL_RE: Regex = Regex::new(r"^[A-Z0-9]{2,12}/[A-Z0-9]{2,12}$").unwrap();
    static ref TIMEFRAME_RE: Regex = Regex::new(r"^[1-9][0-9]*[mhd]$").unwrap();
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Mode escalation flags; all off means simulation everywhere
    #[serde(default)]
    pub guardrail: GuardrailFlags,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<String>,
    /// Per-tick step of the simulated feed
    #[serde(default = "default_feed_step")]
    pub feed_step: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_symbols() -> Vec<String> {
    vec!["BTC/USDT".to_string(), "ETH/USDT".to_string(), "SOL/USDT".to_string()]
}

fn default_timeframes() -> Vec<String> {
    vec!["5m".to_string(), "15m".to_string(), "1h".to_string()]
}

fn default_feed_step() -> f64 { 0.004 }

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            timeframes: default_timeframes(),
            feed_step: default_feed_step(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioConfig {
    #[serde(default = "default_positions")]
    pub positions: Vec<PositionHolding>,
    /// 0 (calm) to 1 (crisis)
    #[serde(default = "default_macro_stress")]
    pub macro_stress: f64,
}

fn default_positions() -> Vec<PositionHolding> {
    vec![
        PositionHolding::new("BTC/USDT", 40_000.0, "binance").with_class(AssetClass::Major),
        PositionHolding::new("ETH/USDT", 25_000.0, "binance").with_class(AssetClass::Major),
        PositionHolding::new("SOL/USDT", 15_000.0, "coinbase"),
        PositionHolding::new("USDC", 20_000.0, "coinbase")
            .with_class(AssetClass::Stablecoin)
            .with_liquidity(1.0),
    ]
}

fn default_macro_stress() -> f64 { 0.2 }

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            positions: default_positions(),
            macro_stress: default_macro_stress(),
        }
    }
}

/// Job intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_signal_refresh_secs")]
    pub signal_refresh_secs: i64,
    #[serde(default = "default_opportunity_scan_secs")]
    pub opportunity_scan_secs: i64,
    #[serde(default = "default_decision_secs")]
    pub decision_secs: i64,
    #[serde(default = "default_dispatch_secs")]
    pub dispatch_secs: i64,
    #[serde(default = "default_risk_assessment_secs")]
    pub risk_assessment_secs: i64,
    #[serde(default = "default_alert_sweep_secs")]
    pub alert_sweep_secs: i64,
    #[serde(default = "default_protection_secs")]
    pub protection_secs: i64,
    #[serde(default = "default_learning_secs")]
    pub learning_secs: i64,
}

fn default_tick_ms() -> u64 { 1_000 }
fn default_signal_refresh_secs() -> i64 { 60 }
fn default_opportunity_scan_secs() -> i64 { 60 }
fn default_decision_secs() -> i64 { 60 }
fn default_dispatch_secs() -> i64 { 30 }
fn default_risk_assessment_secs() -> i64 { 300 }
fn default_alert_sweep_secs() -> i64 { 60 }
fn default_protection_secs() -> i64 { 60 }
fn default_learning_secs() -> i64 { 3_600 }

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            signal_refresh_secs: default_signal_refresh_secs(),
            opportunity_scan_secs: default_opportunity_scan_secs(),
            decision_secs: default_decision_secs(),
            dispatch_secs: default_dispatch_secs(),
            risk_assessment_secs: default_risk_assessment_secs(),
            alert_sweep_secs: default_alert_sweep_secs(),
            protection_secs: default_protection_secs(),
            learning_secs: default_learning_secs(),
        }
    }
}

impl ScheduleConfig {
    fn intervals(&self) -> [(&'static str, i64); 8] {
        [
            ("signal_refresh_secs", self.signal_refresh_secs),
            ("opportunity_scan_secs", self.opportunity_scan_secs),
            ("decision_secs", self.decision_secs),
            ("dispatch_secs", self.dispatch_secs),
            ("risk_assessment_secs", self.risk_assessment_secs),
            ("alert_sweep_secs", self.alert_sweep_secs),
            ("protection_secs", self.protection_secs),
            ("learning_secs", self.learning_secs),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Events buffered per subscriber before the oldest are dropped
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

fn default_event_capacity() -> usize { 1_024 }

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: default_event_capacity() }
    }
}

/// Asset keys are matched upper-case; some sources lower-case map keys
fn upper_keys(map: &mut HashMap<String, f64>) {
    *map = map.drain().map(|(k, v)| (k.to_uppercase(), v)).collect();
}

impl Config {
    /// Load configuration from file and environment variables
    ///
    /// Defaults, then the file if it exists, then `SENTINEL__SECTION__KEY`
    /// environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("SENTINEL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        upper_keys(&mut config.simulation.base_prices);
        upper_keys(&mut config.simulation.starting_balances);

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.market.symbols.is_empty() {
            anyhow::bail!("market.symbols must not be empty");
        }
        for symbol in &self.market.symbols {
            if !SYMBOL_RE.is_match(symbol) {
                anyhow::bail!("Invalid symbol '{}', expected BASE/QUOTE in upper case", symbol);
            }
        }
        if self.market.timeframes.is_empty() {
            anyhow::bail!("market.timeframes must not be empty");
        }
        for timeframe in &self.market.timeframes {
            if !TIMEFRAME_RE.is_match(timeframe) {
                anyhow::bail!("Invalid timeframe '{}', expected e.g. 5m, 1h, 1d", timeframe);
            }
        }
        if self.market.feed_step < 0.0 || self.market.feed_step >= 0.5 {
            anyhow::bail!("market.feed_step must be in [0, 0.5)");
        }

        if self.simulation.latency_min_ms > self.simulation.latency_max_ms {
            anyhow::bail!("simulation.latency_min_ms cannot exceed latency_max_ms");
        }
        if !(0.0..1.0).contains(&self.simulation.connectivity_failure_rate) {
            anyhow::bail!("simulation.connectivity_failure_rate must be in [0, 1)");
        }

        if !(0.0..=1.0).contains(&self.portfolio.macro_stress) {
            anyhow::bail!("portfolio.macro_stress must be between 0 and 1");
        }
        for position in &self.portfolio.positions {
            if !position.value.is_finite() || position.value < 0.0 {
                anyhow::bail!("Position {} has invalid value {}", position.symbol, position.value);
            }
        }

        let metrics = &self.risk.metrics;
        if metrics.var_confidence <= 0.0 || metrics.var_confidence >= 1.0 {
            anyhow::bail!("risk.metrics.var_confidence must be between 0 and 1");
        }
        if metrics.var_trials == 0 {
            anyhow::bail!("risk.metrics.var_trials must be positive");
        }

        let decisions = &self.pipeline.decisions;
        if decisions.execute_threshold <= decisions.wait_threshold {
            anyhow::bail!(
                "execute_threshold ({}) must exceed wait_threshold ({})",
                decisions.execute_threshold,
                decisions.wait_threshold
            );
        }
        if decisions.risk_fraction <= 0.0 || decisions.risk_fraction > 1.0 {
            anyhow::bail!("pipeline.decisions.risk_fraction must be in (0, 1]");
        }
        if decisions.max_position_fraction <= 0.0 || decisions.max_position_fraction > 1.0 {
            anyhow::bail!("pipeline.decisions.max_position_fraction must be in (0, 1]");
        }
        if decisions.portfolio_value <= 0.0 {
            anyhow::bail!("pipeline.decisions.portfolio_value must be positive");
        }

        let signals = &self.pipeline.signals;
        if signals.fast_period == 0 || signals.fast_period >= signals.slow_period {
            anyhow::bail!("pipeline.signals.fast_period must be positive and below slow_period");
        }

        let opportunities = &self.pipeline.opportunities;
        if opportunities.buy_stop_pct <= 0.0 || opportunities.sell_stop_pct <= 0.0 {
            anyhow::bail!("Opportunity stop percentages must be positive");
        }

        let learning = &self.pipeline.learning;
        if learning.min_weight <= 0.0 || learning.min_weight > learning.max_weight {
            anyhow::bail!("pipeline.learning weight bounds are invalid");
        }

        if self.schedule.tick_ms == 0 {
            anyhow::bail!("schedule.tick_ms must be positive");
        }
        for (name, secs) in self.schedule.intervals() {
            if secs <= 0 {
                anyhow::bail!("schedule.{} must be positive", name);
            }
        }

        if self.execution.requested_mode == TradingMode::Live {
            tracing::warn!(
                allow_live_exchange = self.guardrail.allow_live_exchange,
                allow_defi_actions = self.guardrail.allow_defi_actions,
                kill_switch = self.guardrail.kill_switch,
                "Live mode requested; the guardrail flags decide what is actually allowed"
            );
        }

        Ok(())
    }

    /// Human-readable summary for the `config` command
    pub fn summary(&self) -> String {
        format!(
            r#"Configuration:
  Guardrail:
    kill_switch: {}
    allow_live_exchange: {}
    allow_defi_actions: {}
  Execution:
    requested_mode: {}
  Routing:
    venue_overrides: {:?}
    wallet_rails: {:?}
  Market:
    symbols: {:?}
    timeframes: {:?}
  Portfolio:
    positions: {}
    macro_stress: {}
  Risk:
    var_trials: {}
    var_confidence: {}
    limits: {}
    protections: {}
  Decisions:
    execute_threshold: {}
    wait_threshold: {}
    risk_fraction: {}
    portfolio_value: {}
  Schedule:
    tick: {}ms
    risk_assessment: {}s
    decisions: {}s
"#,
            self.guardrail.kill_switch,
            self.guardrail.allow_live_exchange,
            self.guardrail.allow_defi_actions,
            self.execution.requested_mode,
            self.routing.venue_overrides,
            self.routing.wallet_rails,
            self.market.symbols,
            self.market.timeframes,
            self.portfolio.positions.len(),
            self.portfolio.macro_stress,
            self.risk.metrics.var_trials,
            self.risk.metrics.var_confidence,
            self.risk.limits.len(),
            self.risk.protections.len(),
            self.pipeline.decisions.execute_threshold,
            self.pipeline.decisions.wait_threshold,
            self.pipeline.decisions.risk_fraction,
            self.pipeline.decisions.portfolio_value,
            self.schedule.tick_ms,
            self.schedule.risk_assessment_secs,
            self.schedule.decision_secs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        config.validate().unwrap();
        assert!(!config.guardrail.kill_switch);
        assert!(!config.guardrail.allow_live_exchange);
        assert_eq!(config.execution.requested_mode, TradingMode::Simulated);
        assert_eq!(config.pipeline.decisions.execute_threshold, 70.0);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.market.symbols, default_symbols());
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
[guardrail]
kill_switch = true

[market]
symbols = ["ETH/USDC"]
timeframes = ["1m"]

[routing.venue_overrides]
spot = "kraken"

[simulation.base_prices]
eth = 3000.0

[pipeline.decisions]
execute_threshold = 80.0
"#,
        );
        let config = Config::load(file.path()).unwrap();
        assert!(config.guardrail.kill_switch);
        assert_eq!(config.market.symbols, vec!["ETH/USDC".to_string()]);
        assert_eq!(config.routing.venue_overrides["spot"], "kraken");
        assert_eq!(config.simulation.base_prices.get("ETH"), Some(&3000.0));
        assert_eq!(config.pipeline.decisions.execute_threshold, 80.0);
        // Untouched fields keep their defaults
        assert_eq!(config.pipeline.decisions.wait_threshold, 50.0);
    }

    #[test]
    fn test_invalid_symbol_rejected() {
        let file = write_config("[market]\nsymbols = [\"btc-usdt\"]\n");
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid symbol"));
    }

    #[test]
    fn test_threshold_order_enforced() {
        let mut config = Config::default();
        config.pipeline.decisions.wait_threshold = 75.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_lists_flags() {
        let summary = Config::default().summary();
        assert!(summary.contains("kill_switch: false"));
        assert!(summary.contains("requested_mode: simulated"));
    }
}
