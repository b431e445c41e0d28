//! Configuration management for AdaptBot
//!
//! Built-in defaults, then optional `config/default` and `config/local` files,
//! then `ADAPTBOT__*` environment variables (`.env` is read first)

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub trading: TradingConfig,
    pub risk: RiskConfig,
    pub strategy: StrategyConfig,
    pub ml: MlConfig,
    pub execution: ExecutionConfig,
    pub data: DataConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Candidate symbols scanned for entries, in priority order
    pub symbols: Vec<String>,
    /// Symbol traded when no candidate is selected
    pub default_symbol: String,
    /// Market used for regime detection and the falling-market gate
    pub reference_symbol: String,
    /// Currency the account balance is held in
    pub quote_currency: String,
    /// Venue identifier passed through on every order
    pub venue: String,
    /// Submit real orders (false = dry run)
    pub live_trading: bool,
    pub poll_interval_secs: u64,
    /// Sleep after a failed cycle
    pub error_backoff_secs: u64,
    /// Grace period after the live-trading banner
    pub live_start_delay_secs: u64,
    pub block_entries_on_falling_reference: bool,
    /// Closes compared by the falling-market gate
    pub reference_trend_periods: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbols: vec![
                "ETH/INR".to_string(),
                "BTC/INR".to_string(),
                "ADA/INR".to_string(),
                "SOL/INR".to_string(),
            ],
            default_symbol: "ETH/INR".to_string(),
            reference_symbol: "BTC/INR".to_string(),
            quote_currency: "INR".to_string(),
            venue: "coinswitchx".to_string(),
            live_trading: false,
            poll_interval_secs: 60,
            error_backoff_secs: 60,
            live_start_delay_secs: 10,
            block_entries_on_falling_reference: true,
            reference_trend_periods: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Fraction of balance risked per entry (0.05 = 5%)
    pub risk_per_trade: f64,
    pub leverage: f64,
    /// Adverse move that closes a position (0.05 = 5%)
    pub stop_loss_pct: f64,
    /// Favorable move that closes a position (0.10 = 10%)
    pub take_profit_pct: f64,
    /// Live entries are refused below this balance
    pub min_live_balance: f64,
    /// Used when the venue cannot report limits
    pub default_min_quantity: f64,
    pub default_max_quantity: f64,
    pub order_type: String,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.05,
            leverage: 10.0,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.10,
            min_live_balance: 100.0,
            default_min_quantity: 0.00001,
            default_max_quantity: 1000.0,
            order_type: "limit".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Daily loss ratio that halts trading (0.05 = 5%)
    pub daily_loss_limit: f64,
    /// Drawdown from peak that halts trading (0.10 = 10%)
    pub max_drawdown: f64,
    pub max_consecutive_losses: u32,
    /// Absolute return over the lookback that counts as high volatility
    pub volatility_threshold: f64,
    pub volatility_lookback: usize,
    /// Seed balance until the venue reports one
    pub initial_balance: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_loss_limit: 0.05,
            max_drawdown: 0.10,
            max_consecutive_losses: 5,
            volatility_threshold: 0.05,
            volatility_lookback: 10,
            initial_balance: 1_000_000.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Registry name of the policy active at startup
    pub default_policy: String,
    pub auto_switch: bool,
    /// Periods fetched for signal evaluation
    pub window_periods: usize,
    /// Periods of the reference market fetched for regime detection
    pub regime_window_periods: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            default_policy: "ml_strategy".to_string(),
            auto_switch: true,
            window_periods: 120,
            regime_window_periods: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MlConfig {
    pub model_dir: String,
    /// Periods fetched for (re)training
    pub training_periods: usize,
    pub min_training_samples: usize,
    pub n_trees: u16,
    pub max_depth: u16,
    pub test_fraction: f64,
    /// Next-period move that labels a row up/down
    pub label_threshold: f64,
    /// Run the performance retrain check every N cycles
    pub retrain_check_every_cycles: u64,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            model_dir: "./data/models".to_string(),
            training_periods: 720,
            min_training_samples: 100,
            n_trees: 100,
            max_depth: 8,
            test_fraction: 0.2,
            label_threshold: 0.001,
            retrain_check_every_cycles: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Per-attempt timeout for data and venue calls
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5000,
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Directory of `<SYMBOL>.csv` candle files for the replay exchange
    pub candles_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            candles_dir: "./data/candles".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines
    pub json: bool,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();
        Self::load_from("config")
    }

    /// Load with `<dir>/default` and `<dir>/local` as the optional file layers
    pub fn load_from(dir: &str) -> Result<Self> {
        let config = Config::builder()
            // Bot defaults
            .set_default(
                "bot.symbols",
                vec!["ETH/INR", "BTC/INR", "ADA/INR", "SOL/INR"],
            )?
            .set_default("bot.default_symbol", "ETH/INR")?
            .set_default("bot.reference_symbol", "BTC/INR")?
            .set_default("bot.quote_currency", "INR")?
            .set_default("bot.venue", "coinswitchx")?
            .set_default("bot.live_trading", false)?
            .set_default("bot.poll_interval_secs", 60)?
            .set_default("bot.error_backoff_secs", 60)?
            .set_default("bot.live_start_delay_secs", 10)?
            .set_default("bot.block_entries_on_falling_reference", true)?
            .set_default("bot.reference_trend_periods", 4)?
            // Trading defaults
            .set_default("trading.risk_per_trade", 0.05)?
            .set_default("trading.leverage", 10.0)?
            .set_default("trading.stop_loss_pct", 0.05)?
            .set_default("trading.take_profit_pct", 0.10)?
            .set_default("trading.min_live_balance", 100.0)?
            .set_default("trading.default_min_quantity", 0.00001)?
            .set_default("trading.default_max_quantity", 1000.0)?
            .set_default("trading.order_type", "limit")?
            // Risk defaults
            .set_default("risk.daily_loss_limit", 0.05)?
            .set_default("risk.max_drawdown", 0.10)?
            .set_default("risk.max_consecutive_losses", 5)?
            .set_default("risk.volatility_threshold", 0.05)?
            .set_default("risk.volatility_lookback", 10)?
            .set_default("risk.initial_balance", 1_000_000.0)?
            // Strategy defaults
            .set_default("strategy.default_policy", "ml_strategy")?
            .set_default("strategy.auto_switch", true)?
            .set_default("strategy.window_periods", 120)?
            .set_default("strategy.regime_window_periods", 120)?
            // ML defaults
            .set_default("ml.model_dir", "./data/models")?
            .set_default("ml.training_periods", 720)?
            .set_default("ml.min_training_samples", 100)?
            .set_default("ml.n_trees", 100)?
            .set_default("ml.max_depth", 8)?
            .set_default("ml.test_fraction", 0.2)?
            .set_default("ml.label_threshold", 0.001)?
            .set_default("ml.retrain_check_every_cycles", 1)?
            // Execution defaults
            .set_default("execution.request_timeout_ms", 5000)?
            .set_default("execution.max_retries", 3)?
            .set_default("execution.retry_delay_ms", 500)?
            // Data / logging defaults
            .set_default("data.candles_dir", "./data/candles")?
            .set_default("logging.json", false)?
            // Load config files if they exist
            .add_source(File::with_name(&format!("{}/default", dir)).required(false))
            .add_source(File::with_name(&format!("{}/local", dir)).required(false))
            // Override with environment variables (ADAPTBOT__*)
            .add_source(Environment::with_prefix("ADAPTBOT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;

        Ok(app_config)
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "symbols={:?} reference={} live={} policy={} auto_switch={} risk={:.3} leverage={} sl={:.3} tp={:.3} poll={}s",
            self.bot.symbols,
            self.bot.reference_symbol,
            self.bot.live_trading,
            self.strategy.default_policy,
            self.strategy.auto_switch,
            self.trading.risk_per_trade,
            self.trading.leverage,
            self.trading.stop_loss_pct,
            self.trading.take_profit_pct,
            self.bot.poll_interval_secs
        )
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let fractions = [
            ("trading.risk_per_trade", self.trading.risk_per_trade),
            ("trading.stop_loss_pct", self.trading.stop_loss_pct),
            ("trading.take_profit_pct", self.trading.take_profit_pct),
            ("risk.daily_loss_limit", self.risk.daily_loss_limit),
            ("risk.max_drawdown", self.risk.max_drawdown),
            ("risk.volatility_threshold", self.risk.volatility_threshold),
        ];
        for (key, value) in fractions {
            if !(value > 0.0 && value <= 1.0) {
                bail!("{} must be in (0, 1], got {}", key, value);
            }
        }
        if !(self.ml.test_fraction >= 0.0 && self.ml.test_fraction < 1.0) {
            bail!("ml.test_fraction must be in [0, 1), got {}", self.ml.test_fraction);
        }
        if self.trading.leverage <= 0.0 {
            bail!("trading.leverage must be positive");
        }
        if self.trading.default_min_quantity > self.trading.default_max_quantity {
            bail!("trading.default_min_quantity exceeds trading.default_max_quantity");
        }
        if self.bot.poll_interval_secs == 0 {
            bail!("bot.poll_interval_secs must be positive");
        }
        if self.bot.symbols.is_empty() {
            bail!("bot.symbols must list at least one symbol");
        }
        if self.strategy.window_periods == 0 || self.ml.training_periods == 0 {
            bail!("window sizes must be positive");
        }
        if self.ml.min_training_samples == 0 {
            bail!("ml.min_training_samples must be at least 1");
        }
        if self.ml.retrain_check_every_cycles == 0 {
            bail!("ml.retrain_check_every_cycles must be positive");
        }
        Ok(())
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
