//! Performance feedback
//!
//! Aggregates closed trades, forwards each to the risk governor, nudges the
//! adaptive basket weights for the policy that opened it, and retrains the ML
//! policy while performance is degraded.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::EngineError;
use crate::market::{with_retry, MarketDataSource, RetryPolicy};
use crate::ml_engine::{ModelStore, TrainingParams};
use crate::strategy::StrategyManager;
use crate::types::TradeRecord;

/// Win rate below this triggers a retrain
const MIN_WIN_RATE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PerformanceReport {
    pub total_profit: f64,
    /// Fraction of trades with positive profit
    pub win_rate: f64,
    pub trades: usize,
}

impl PerformanceReport {
    pub fn is_degraded(&self) -> bool {
        self.win_rate < MIN_WIN_RATE || self.total_profit < 0.0
    }
}

pub struct PerformanceFeedback {
    trades: Vec<TradeRecord>,
    training_symbol: String,
    training_periods: usize,
    params: TrainingParams,
    retry: RetryPolicy,
}

impl PerformanceFeedback {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            trades: Vec::new(),
            training_symbol: config.bot.default_symbol.clone(),
            training_periods: config.ml.training_periods,
            params: TrainingParams::from(&config.ml),
            retry: RetryPolicy::from(&config.execution),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    /// Append a closed trade and feed it to the risk state and adaptive weights
    pub fn record_trade(&mut self, trade: TradeRecord, strategy: &mut StrategyManager) {
        strategy.risk_mut().update_trade_history(&trade);
        if let Some(weights) = strategy.adaptive_weights_mut() {
            if let Some(weight) = weights.update(trade.policy, trade.profit) {
                info!(policy = %trade.policy, weight = weight, "⚖️ Adaptive weight updated");
            }
        }
        info!(
            symbol = %trade.symbol,
            side = %trade.side,
            profit = trade.profit,
            policy = %trade.policy,
            "📒 Trade recorded"
        );
        self.trades.push(trade);
    }

    /// `(0, 0)` when nothing was recorded
    pub fn evaluate_performance(&self) -> PerformanceReport {
        if self.trades.is_empty() {
            return PerformanceReport::default();
        }
        let total_profit = self.trades.iter().map(|t| t.profit).sum();
        let wins = self.trades.iter().filter(|t| t.is_win()).count();
        PerformanceReport {
            total_profit,
            win_rate: wins as f64 / self.trades.len() as f64,
            trades: self.trades.len(),
        }
    }

    /// Retrain the ML policy on a fresh window when performance is degraded.
    ///
    /// An empty history counts as degraded. Returns `true` when a new model was
    /// installed; failures are logged and the previous model is kept.
    pub async fn update_if_needed(
        &mut self,
        strategy: &mut StrategyManager,
        market: &dyn MarketDataSource,
        store: &dyn ModelStore,
    ) -> bool {
        let report = self.evaluate_performance();
        if !report.is_degraded() {
            return false;
        }
        info!(
            win_rate = report.win_rate,
            total_profit = report.total_profit,
            trades = report.trades,
            "🔁 Performance degraded, retraining ML policy"
        );

        match self.retrain(strategy, market, store).await {
            Ok(accuracy) => {
                info!(accuracy = accuracy, "✅ Retrain complete");
                true
            }
            Err(e) => {
                warn!(symbol = %self.training_symbol, error = %e, "Retrain failed, keeping previous model");
                false
            }
        }
    }

    async fn retrain(
        &self,
        strategy: &mut StrategyManager,
        market: &dyn MarketDataSource,
        store: &dyn ModelStore,
    ) -> Result<f64, EngineError> {
        let symbol = self.training_symbol.as_str();
        let periods = self.training_periods;
        let window = with_retry(&self.retry, "fetch_window", || async move {
            market.fetch_window(symbol, periods).await
        })
        .await?;
        strategy.train_ml(&window, &self.params, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MockMarketDataSource;
    use crate::ml_engine::InMemoryModelStore;
    use crate::policy::fixtures::window_from_closes;
    use crate::policy::PolicyName;
    use crate::risk::RiskGovernor;
    use crate::types::Side;
    use std::time::Duration;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.ml.n_trees = 10;
        config
    }

    fn feedback() -> PerformanceFeedback {
        PerformanceFeedback::new(&config()).with_retry_policy(RetryPolicy {
            timeout: Duration::from_secs(5),
            attempts: 1,
            delay: Duration::from_millis(1),
        })
    }

    fn manager() -> StrategyManager {
        StrategyManager::new(RiskGovernor::new(config().risk))
    }

    fn trade(profit: f64, policy: PolicyName) -> TradeRecord {
        TradeRecord {
            symbol: "ETH/INR".to_string(),
            side: Side::Long,
            entry_price: 100.0,
            exit_price: 100.0 + profit,
            quantity: 1.0,
            profit,
            policy,
            timestamp: 0,
        }
    }

    fn oscillating_market() -> MockMarketDataSource {
        let mut market = MockMarketDataSource::new();
        market.expect_fetch_window().returning(|_, _| {
            let closes: Vec<f64> = (0..300)
                .map(|i| 100.0 + 5.0 * ((i as f64) * 0.7).sin())
                .collect();
            Ok(window_from_closes(&closes))
        });
        market
    }

    #[test]
    fn test_empty_history_reports_zero() {
        let report = feedback().evaluate_performance();
        assert_eq!(report.total_profit, 0.0);
        assert_eq!(report.win_rate, 0.0);
        assert_eq!(report.trades, 0);
        assert!(report.is_degraded());
    }

    #[test]
    fn test_record_trade_updates_risk_and_weights() {
        let mut fb = feedback();
        let mut m = manager();
        fb.record_trade(trade(-3.0, PolicyName::Momentum), &mut m);
        fb.record_trade(trade(5.0, PolicyName::SmaCrossover), &mut m);
        fb.record_trade(trade(2.0, PolicyName::Momentum), &mut m);

        let report = fb.evaluate_performance();
        assert!((report.total_profit - 4.0).abs() < 1e-12);
        assert!((report.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.risk().trade_history().len(), 3);
        assert_eq!(m.risk().state().consecutive_losses, 0);

        // 1.0 - 0.3 + 0.2
        let w = m.adaptive_weights().unwrap().get(PolicyName::Momentum).unwrap();
        assert!((w - 0.9).abs() < 1e-12);
        // Outside the basket: untouched
        assert_eq!(m.adaptive_weights().unwrap().get(PolicyName::SmaCrossover), None);
    }

    #[test]
    fn test_degraded_when_losing_or_mostly_losing() {
        let mut fb = feedback();
        let mut m = manager();
        fb.record_trade(trade(10.0, PolicyName::Ml), &mut m);
        assert!(!fb.evaluate_performance().is_degraded());
        fb.record_trade(trade(-1.0, PolicyName::Ml), &mut m);
        fb.record_trade(trade(-1.0, PolicyName::Ml), &mut m);
        // Profitable overall but win rate 1/3
        assert!(fb.evaluate_performance().is_degraded());
    }

    #[tokio::test]
    async fn test_retrain_with_empty_history() {
        let mut fb = feedback();
        let mut m = manager();
        let market = oscillating_market();
        let store = InMemoryModelStore::new();
        assert!(fb.update_if_needed(&mut m, &market, &store).await);
        assert!(m.ml_is_trained());
    }

    #[tokio::test]
    async fn test_no_retrain_while_healthy() {
        let mut fb = feedback();
        let mut m = manager();
        fb.record_trade(trade(10.0, PolicyName::Ml), &mut m);
        let mut market = MockMarketDataSource::new();
        market.expect_fetch_window().never();
        let store = InMemoryModelStore::new();
        assert!(!fb.update_if_needed(&mut m, &market, &store).await);
        assert!(!m.ml_is_trained());
    }

    #[tokio::test]
    async fn test_retrain_repeats_while_degraded() {
        let mut fb = feedback();
        let mut m = manager();
        fb.record_trade(trade(-1.0, PolicyName::Ml), &mut m);
        let market = oscillating_market();
        let store = InMemoryModelStore::new();

        assert!(fb.update_if_needed(&mut m, &market, &store).await);
        assert!(m.ml_is_trained());
        assert_eq!(store.len(), 1);
        // Same trade count, still degraded
        assert!(fb.update_if_needed(&mut m, &market, &store).await);
    }

    #[tokio::test]
    async fn test_retrain_failure_is_soft() {
        let mut fb = feedback();
        let mut m = manager();
        fb.record_trade(trade(-1.0, PolicyName::Ml), &mut m);
        let mut market = MockMarketDataSource::new();
        market
            .expect_fetch_window()
            .times(2)
            .returning(|_, _| Err(EngineError::Data("exchange down".to_string())));
        let store = InMemoryModelStore::new();

        assert!(!fb.update_if_needed(&mut m, &market, &store).await);
        assert!(!m.ml_is_trained());
        // Tried again on the next call
        assert!(!fb.update_if_needed(&mut m, &market, &store).await);
    }
}
