//! Trading engine - explicit per-cycle context
//!
//! Owns the strategy manager (and through it the risk governor), the decision
//! maker and the feedback component. One call to [`TradingEngine::run_cycle`]
//! runs a full decision cycle to completion:
//!
//! 1. Regime re-evaluation on the reference market (only while flat)
//! 2. Reference-market gate: a falling reference blocks new entries
//! 3. Flat: read-only scan of the candidate symbols, first non-neutral wins
//!    Open: signal for the position's symbol, stop/target checks (these still
//!    run on price alone when the window is unavailable)
//! 4. Execute, then feed any closed trade back
//! 5. Periodic retrain check

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::decision::{DecisionMaker, ExecutionOutcome, PositionState};
use crate::error::EngineError;
use crate::feedback::{PerformanceFeedback, PerformanceReport};
use crate::market::{with_retry, MarketDataSource, RetryPolicy, VenueClient};
use crate::ml_engine::{ModelStore, TrainingParams};
use crate::policy::PolicyName;
use crate::risk::{RiskGovernor, RiskStatus};
use crate::strategy::StrategyManager;
use crate::types::{Action, MarketWindow, Signal, TradeRecord};

/// Direction of the reference market over the last few closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Rising => write!(f, "rising"),
            Trend::Falling => write!(f, "falling"),
            Trend::Stable => write!(f, "stable"),
        }
    }
}

/// Compare the last close with the close `periods - 1` periods earlier.
/// `None` with fewer than two closes.
pub fn reference_trend(window: &MarketWindow, periods: usize) -> Option<Trend> {
    let closes = window.tail(periods).closes();
    if closes.len() < 2 {
        return None;
    }
    let (first, last) = (closes[0], closes[closes.len() - 1]);
    Some(if last > first {
        Trend::Rising
    } else if last < first {
        Trend::Falling
    } else {
        Trend::Stable
    })
}

/// What one cycle did
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub policy: PolicyName,
    pub reference_trend: Option<Trend>,
    /// Symbol the action applied to, if any was considered
    pub symbol: Option<String>,
    pub signal: Signal,
    pub action: Action,
    pub state: PositionState,
    pub closed: Option<TradeRecord>,
    pub retrained: bool,
}

pub struct TradingEngine {
    config: AppConfig,
    market: Arc<dyn MarketDataSource>,
    venue: Arc<dyn VenueClient>,
    store: Arc<dyn ModelStore>,
    strategy: StrategyManager,
    decision: DecisionMaker,
    feedback: PerformanceFeedback,
    retry: RetryPolicy,
    cycles: u64,
}

impl TradingEngine {
    pub fn new(
        config: AppConfig,
        market: Arc<dyn MarketDataSource>,
        venue: Arc<dyn VenueClient>,
        store: Arc<dyn ModelStore>,
    ) -> Self {
        let mut strategy = StrategyManager::new(RiskGovernor::new(config.risk.clone()));
        if let Err(e) = strategy.set_active_strategy(&config.strategy.default_policy) {
            warn!(error = %e, "Configured default policy ignored");
        }
        let decision = DecisionMaker::new(venue.clone(), &config);
        let feedback = PerformanceFeedback::new(&config);
        let retry = RetryPolicy::from(&config.execution);
        Self {
            config,
            market,
            venue,
            store,
            strategy,
            decision,
            feedback,
            retry,
            cycles: 0,
        }
    }

    /// Override the retry policy for every outbound call
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.decision = self.decision.with_retry_policy(retry.clone());
        self.feedback = self.feedback.with_retry_policy(retry.clone());
        self.retry = retry;
        self
    }

    pub fn strategy(&self) -> &StrategyManager {
        &self.strategy
    }

    pub fn strategy_mut(&mut self) -> &mut StrategyManager {
        &mut self.strategy
    }

    pub fn decision(&self) -> &DecisionMaker {
        &self.decision
    }

    pub fn feedback(&self) -> &PerformanceFeedback {
        &self.feedback
    }

    pub fn performance(&self) -> PerformanceReport {
        self.feedback.evaluate_performance()
    }

    pub fn risk_status(&self) -> RiskStatus {
        self.strategy.risk().status()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Seed risk balances from the venue and make the ML policy usable.
    /// Nothing here is fatal: failures are logged and the engine runs degraded.
    pub async fn bootstrap(&mut self) {
        let currency = self.config.bot.quote_currency.clone();
        let venue = self.venue.clone();
        let balance = with_retry(&self.retry, "get_balance", || {
            let venue = venue.clone();
            let currency = currency.clone();
            async move { venue.get_balance(&currency).await }
        })
        .await;
        match balance {
            Ok(balance) => self.strategy.risk_mut().seed_balance(balance),
            Err(e) => warn!(
                error = %e,
                fallback = self.config.risk.initial_balance,
                "Balance unavailable, risk state keeps the configured seed"
            ),
        }

        let symbol = self.config.bot.default_symbol.clone();
        match self.strategy.load_ml(&symbol, self.store.as_ref()) {
            Ok(true) => {
                info!(symbol = %symbol, "🧠 Loaded saved ML model");
                return;
            }
            Ok(false) => info!(symbol = %symbol, "No saved ML model, training"),
            Err(e) => warn!(symbol = %symbol, error = %e, "Saved ML model unusable, retraining"),
        }

        let periods = self.config.ml.training_periods;
        let params = TrainingParams::from(&self.config.ml);
        let trained = match self.fetch(&symbol, periods).await {
            Ok(window) => self
                .strategy
                .train_ml(&window, &params, self.store.as_ref()),
            Err(e) => Err(e),
        };
        if let Err(e) = trained {
            warn!(symbol = %symbol, error = %e, "Initial training failed, ML policy stays neutral");
        }
    }

    async fn fetch(&self, symbol: &str, periods: usize) -> Result<MarketWindow, EngineError> {
        let market = self.market.clone();
        with_retry(&self.retry, "fetch_window", || {
            let market = market.clone();
            let symbol = symbol.to_string();
            async move { market.fetch_window(&symbol, periods).await }
        })
        .await
    }

    /// Re-evaluate the regime on the reference market. Data problems skip the switch.
    async fn refresh_regime(&mut self) {
        let reference = self.config.bot.reference_symbol.clone();
        match self
            .fetch(&reference, self.config.strategy.regime_window_periods)
            .await
        {
            Ok(window) => {
                self.strategy.auto_switch_strategy(&window);
            }
            Err(e) => warn!(symbol = %reference, error = %e, "Regime check skipped"),
        }
    }

    async fn check_reference(&self) -> Option<Trend> {
        let reference = &self.config.bot.reference_symbol;
        let periods = self.config.bot.reference_trend_periods;
        match self.fetch(reference, periods).await {
            Ok(window) => reference_trend(&window, periods),
            Err(e) => {
                warn!(symbol = %reference, error = %e, "Reference trend unavailable");
                None
            }
        }
    }

    /// Read-only scan: first candidate with a non-neutral signal
    async fn scan_candidates(&self) -> Option<(String, Signal)> {
        let periods = self.config.strategy.window_periods;
        for symbol in &self.config.bot.symbols {
            let window = match self.fetch(symbol, periods).await {
                Ok(window) => window,
                Err(e) => {
                    debug!(symbol = %symbol, error = %e, "Candidate skipped");
                    continue;
                }
            };
            let signal = self.strategy.get_signal(&window);
            if !signal.is_neutral() {
                return Some((symbol.clone(), signal));
            }
        }
        None
    }

    /// One full decision cycle
    pub async fn run_cycle(&mut self) -> Result<CycleReport, EngineError> {
        self.cycles += 1;
        let cycle = self.cycles;

        if self.decision.state() == PositionState::Flat && self.config.strategy.auto_switch {
            self.refresh_regime().await;
        }
        let policy = self.strategy.active_strategy();

        let mut report = CycleReport {
            cycle,
            policy,
            reference_trend: None,
            symbol: None,
            signal: Signal::Neutral,
            action: Action::Hold,
            state: self.decision.state(),
            closed: None,
            retrained: false,
        };

        match self.decision.position().map(|p| p.symbol.clone()) {
            Some(symbol) => {
                // Exits only need the price, so a missing window degrades to neutral
                report.signal = match self.fetch(&symbol, self.config.strategy.window_periods).await {
                    Ok(window) => self.strategy.get_signal(&window),
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "Window unavailable, checking exits only");
                        Signal::Neutral
                    }
                };
                report.symbol = Some(symbol);
            }
            None => {
                if self.config.bot.block_entries_on_falling_reference {
                    report.reference_trend = self.check_reference().await;
                }
                if report.reference_trend == Some(Trend::Falling) {
                    info!(
                        symbol = %self.config.bot.reference_symbol,
                        "📉 Reference market falling, skipping entries"
                    );
                } else if let Some((symbol, signal)) = self.scan_candidates().await {
                    self.decision.set_symbol(&symbol)?;
                    report.symbol = Some(symbol);
                    report.signal = signal;
                }
            }
        }

        if report.symbol.is_some() {
            report.action = self.decision.decide(report.signal).await;
            match self.decision.execute_decision(report.action, policy).await {
                ExecutionOutcome::Closed(trade) => {
                    self.feedback.record_trade(trade.clone(), &mut self.strategy);
                    report.closed = Some(trade);
                }
                ExecutionOutcome::Failed(e) => {
                    debug!(cycle = cycle, error = %e, "Action not applied this cycle");
                }
                ExecutionOutcome::Opened(_) | ExecutionOutcome::Held => {}
            }
        }

        let every = self.config.ml.retrain_check_every_cycles.max(1);
        if cycle % every == 0 {
            report.retrained = self
                .feedback
                .update_if_needed(&mut self.strategy, self.market.as_ref(), self.store.as_ref())
                .await;
        }

        report.state = self.decision.state();
        debug!(
            cycle = cycle,
            policy = %report.policy,
            action = %report.action,
            state = %report.state,
            "Cycle complete"
        );
        Ok(report)
    }
}
