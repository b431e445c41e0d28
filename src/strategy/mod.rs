//! Strategy Manager
//!
//! Single point of signal issuance:
//! - owns the policy registry (one instance per [`PolicyName`]) and the active pointer
//! - gates every signal through the [`RiskGovernor`]: a tripped guard returns
//!   neutral without consulting any policy, high volatility forces neutral
//! - re-evaluates the market regime and switches the active policy
//! - installs trained classifier models into the ML policy

pub mod regime;

pub use regime::{select_policy, RegimeMetrics, BREAKOUT_MIN_PERIODS, MIN_REGIME_PERIODS};

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::ml_engine::{self, model_key, ModelStore, SignalModel, TrainingParams};
use crate::policy::{AdaptiveWeights, Policy, PolicyName};
use crate::risk::RiskGovernor;
use crate::types::{MarketWindow, Signal};

pub struct StrategyManager {
    registry: BTreeMap<PolicyName, Policy>,
    active: PolicyName,
    risk: RiskGovernor,
}

impl StrategyManager {
    /// Registry with every policy at default parameters; `ml_strategy` active
    pub fn new(risk: RiskGovernor) -> Self {
        let registry = PolicyName::ALL
            .iter()
            .map(|name| (*name, Policy::with_defaults(*name)))
            .collect();
        Self {
            registry,
            active: PolicyName::Ml,
            risk,
        }
    }

    pub fn active_strategy(&self) -> PolicyName {
        self.active
    }

    pub fn registered(&self) -> impl Iterator<Item = PolicyName> + '_ {
        self.registry.keys().copied()
    }

    pub fn policy(&self, name: PolicyName) -> Option<&Policy> {
        self.registry.get(&name)
    }

    pub fn risk(&self) -> &RiskGovernor {
        &self.risk
    }

    pub fn risk_mut(&mut self) -> &mut RiskGovernor {
        &mut self.risk
    }

    /// Signal from the active policy, gated by the risk governor
    pub fn get_signal(&self, window: &MarketWindow) -> Signal {
        if self.risk.should_stop_trading() {
            debug!("{}: risk guard active, signal forced neutral", window.symbol());
            return Signal::Neutral;
        }

        let signal = self
            .registry
            .get(&self.active)
            .map(|policy| policy.get_signal(window))
            .unwrap_or_default();

        if self.risk.is_high_volatility(window) {
            debug!(
                "{}: {} said {}, suppressed by volatility breaker",
                window.symbol(),
                self.active,
                signal
            );
            return Signal::Neutral;
        }

        debug!("{}: {} -> {}", window.symbol(), self.active, signal);
        signal
    }

    /// Swap the active pointer. Unknown names are reported and leave it unchanged.
    pub fn set_active_strategy(&mut self, name: &str) -> Result<(), EngineError> {
        let next: PolicyName = name.parse()?;
        if !self.registry.contains_key(&next) {
            return Err(EngineError::UnknownPolicy(name.to_string()));
        }
        if next != self.active {
            info!("🔀 Switched strategy from {} to {}", self.active, next);
            self.active = next;
        }
        Ok(())
    }

    pub fn regime_metrics(window: &MarketWindow) -> Option<RegimeMetrics> {
        RegimeMetrics::compute(window)
    }

    /// Re-evaluate the regime and switch accordingly.
    /// Returns the selected policy, or `None` when the window is too short.
    pub fn auto_switch_strategy(&mut self, window: &MarketWindow) -> Option<PolicyName> {
        let metrics = Self::regime_metrics(window)?;
        let selected = select_policy(&metrics, window.len());
        debug!(
            "Regime on {}: vol={:.4} trend={:.5} volume_ratio={:.2} rsi={:.1} -> {}",
            window.symbol(),
            metrics.volatility,
            metrics.trend_strength,
            metrics.volume_ratio,
            metrics.rsi,
            selected
        );
        if let Err(e) = self.set_active_strategy(selected.as_str()) {
            warn!("Auto-switch to {} failed: {}", selected, e);
            return None;
        }
        Some(selected)
    }

    pub fn adaptive_weights(&self) -> Option<&AdaptiveWeights> {
        match self.registry.get(&PolicyName::Adaptive) {
            Some(Policy::Adaptive(policy)) => Some(policy.weights()),
            _ => None,
        }
    }

    /// Write access for the feedback component
    pub fn adaptive_weights_mut(&mut self) -> Option<&mut AdaptiveWeights> {
        match self.registry.get_mut(&PolicyName::Adaptive) {
            Some(Policy::Adaptive(policy)) => Some(policy.weights_mut()),
            _ => None,
        }
    }

    pub fn ml_is_trained(&self) -> bool {
        matches!(self.registry.get(&PolicyName::Ml), Some(Policy::Ml(p)) if p.is_trained())
    }

    fn install_model(&mut self, model: SignalModel) {
        if let Some(Policy::Ml(policy)) = self.registry.get_mut(&PolicyName::Ml) {
            policy.set_model(model);
        }
    }

    /// Train on `window`, persist under the window's symbol and install the model.
    /// Returns the hold-out accuracy. On failure the previous model stays in place.
    pub fn train_ml(
        &mut self,
        window: &MarketWindow,
        params: &TrainingParams,
        store: &dyn ModelStore,
    ) -> Result<f64, EngineError> {
        let model = ml_engine::train(window, params)?;
        let accuracy = model.accuracy();
        store.save(&model_key(window.symbol(), PolicyName::Ml), model.snapshot())?;
        self.install_model(model);
        info!("🧠 ML strategy updated for {} (accuracy {:.2})", window.symbol(), accuracy);
        Ok(accuracy)
    }

    /// Load the persisted model for `symbol`. `Ok(false)` when none was saved.
    pub fn load_ml(&mut self, symbol: &str, store: &dyn ModelStore) -> Result<bool, EngineError> {
        let Some(snapshot) = store.load(&model_key(symbol, PolicyName::Ml))? else {
            return Ok(false);
        };
        let model = SignalModel::from_snapshot(snapshot)?;
        self.install_model(model);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::ml_engine::InMemoryModelStore;
    use crate::policy::fixtures::*;

    fn manager() -> StrategyManager {
        StrategyManager::new(RiskGovernor::new(RiskConfig::default()))
    }

    /// Flat market with a 1% jump on the last period: SMA(10) crosses SMA(20)
    fn calm_crossover() -> MarketWindow {
        let mut closes = flat(30, 100.0);
        closes.push(101.0);
        window_from_closes(&closes)
    }

    #[test]
    fn test_registry_has_every_policy_and_ml_is_default() {
        let m = manager();
        assert_eq!(m.registered().count(), 15);
        assert_eq!(m.active_strategy(), PolicyName::Ml);
        assert!(!m.ml_is_trained());
    }

    #[test]
    fn test_signal_comes_from_active_policy() {
        let mut m = manager();
        m.set_active_strategy("sma_crossover").unwrap();
        assert_eq!(m.get_signal(&calm_crossover()), Signal::Long);
    }

    #[test]
    fn test_risk_stop_forces_neutral() {
        let mut m = manager();
        m.set_active_strategy("sma_crossover").unwrap();
        m.risk_mut().emergency_stop_trading();
        assert_eq!(m.get_signal(&calm_crossover()), Signal::Neutral);
    }

    #[test]
    fn test_high_volatility_forces_neutral() {
        let mut m = manager();
        m.set_active_strategy("sma_crossover").unwrap();
        let mut closes = flat(30, 100.0);
        closes.push(110.0);
        assert_eq!(m.get_signal(&window_from_closes(&closes)), Signal::Neutral);
    }

    #[test]
    fn test_unknown_strategy_is_rejected_and_active_kept() {
        let mut m = manager();
        m.set_active_strategy("momentum").unwrap();
        let err = m.set_active_strategy("martingale").unwrap_err();
        assert!(matches!(err, EngineError::UnknownPolicy(_)));
        assert_eq!(m.active_strategy(), PolicyName::Momentum);
    }

    #[test]
    fn test_auto_switch_noop_on_short_window() {
        let mut m = manager();
        assert_eq!(m.auto_switch_strategy(&window_from_closes(&flat(49, 100.0))), None);
        assert_eq!(m.active_strategy(), PolicyName::Ml);
    }

    #[test]
    fn test_auto_switch_calm_market_selects_crossover() {
        let mut m = manager();
        let selected = m.auto_switch_strategy(&window_from_closes(&flat(60, 100.0)));
        assert_eq!(selected, Some(PolicyName::SmaCrossover));
        assert_eq!(m.active_strategy(), PolicyName::SmaCrossover);
    }

    #[test]
    fn test_adaptive_weights_are_reachable() {
        let mut m = manager();
        m.adaptive_weights_mut()
            .unwrap()
            .update(PolicyName::Momentum, 10.0);
        assert_eq!(m.adaptive_weights().unwrap().get(PolicyName::Momentum), Some(2.0));
    }

    #[test]
    fn test_train_then_load_from_store() {
        let closes: Vec<f64> = (0..300)
            .map(|i| 100.0 + 5.0 * ((i as f64) * 0.7).sin())
            .collect();
        let window = window_from_closes(&closes);
        let store = InMemoryModelStore::new();
        let params = TrainingParams {
            n_trees: 10,
            ..TrainingParams::default()
        };

        let mut m = manager();
        assert!(!m.load_ml("ETH/INR", &store).unwrap());
        let accuracy = m.train_ml(&window, &params, &store).unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
        assert!(m.ml_is_trained());

        let mut fresh = manager();
        assert!(fresh.load_ml("ETH/INR", &store).unwrap());
        assert!(fresh.ml_is_trained());
    }

    #[test]
    fn test_failed_training_keeps_policy_untrained() {
        let store = InMemoryModelStore::new();
        let mut m = manager();
        let err = m
            .train_ml(&window_from_closes(&flat(60, 100.0)), &TrainingParams::default(), &store)
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientHistory { .. }));
        assert!(!m.ml_is_trained());
        assert!(store.is_empty());
    }
}
