//! Signal policies
//!
//! Every policy is a function of a market window to a ternary [`Signal`]. The
//! registry stores them as the [`Policy`] tagged variant so dispatch is an
//! exhaustive match rather than a dynamic lookup.
//!
//! Contract shared by all variants:
//! - a declared minimum history (`min_periods`); shorter windows yield
//!   `Signal::Neutral` and never fail
//! - no side effects; the ML variant additionally reads its loaded model
//! - indicator values that are unavailable or non-finite resolve to neutral

mod adaptive;
mod bands;
mod levels;
mod ml;
mod oscillators;
mod trend;
mod volume;

pub use adaptive::{AdaptivePolicy, AdaptiveWeights};
pub use bands::BollingerBands;
pub use levels::{Breakout, FibonacciRetracement, SupportResistance};
pub use ml::MlPolicy;
pub use oscillators::{RsiDivergence, StochasticOscillator};
pub use trend::{MeanReversion, Momentum, SmaCrossover, TrendFollowing};
pub use volume::{Scalping, VolumePriceAnalysis, VolumeSpike};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;
use crate::types::{MarketWindow, Signal};

/// Registry key for a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyName {
    #[serde(rename = "ml_strategy")]
    Ml,
    MeanReversion,
    TrendFollowing,
    RsiDivergence,
    BollingerBands,
    SmaCrossover,
    Scalping,
    Momentum,
    Breakout,
    VolumeSpike,
    SupportResistance,
    FibonacciRetracement,
    StochasticOscillator,
    VolumePriceAnalysis,
    #[serde(rename = "adaptive_strategy")]
    Adaptive,
}

impl PolicyName {
    pub const ALL: [PolicyName; 15] = [
        PolicyName::Ml,
        PolicyName::MeanReversion,
        PolicyName::TrendFollowing,
        PolicyName::RsiDivergence,
        PolicyName::BollingerBands,
        PolicyName::SmaCrossover,
        PolicyName::Scalping,
        PolicyName::Momentum,
        PolicyName::Breakout,
        PolicyName::VolumeSpike,
        PolicyName::SupportResistance,
        PolicyName::FibonacciRetracement,
        PolicyName::StochasticOscillator,
        PolicyName::VolumePriceAnalysis,
        PolicyName::Adaptive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyName::Ml => "ml_strategy",
            PolicyName::MeanReversion => "mean_reversion",
            PolicyName::TrendFollowing => "trend_following",
            PolicyName::RsiDivergence => "rsi_divergence",
            PolicyName::BollingerBands => "bollinger_bands",
            PolicyName::SmaCrossover => "sma_crossover",
            PolicyName::Scalping => "scalping",
            PolicyName::Momentum => "momentum",
            PolicyName::Breakout => "breakout",
            PolicyName::VolumeSpike => "volume_spike",
            PolicyName::SupportResistance => "support_resistance",
            PolicyName::FibonacciRetracement => "fibonacci_retracement",
            PolicyName::StochasticOscillator => "stochastic_oscillator",
            PolicyName::VolumePriceAnalysis => "volume_price_analysis",
            PolicyName::Adaptive => "adaptive_strategy",
        }
    }
}

impl fmt::Display for PolicyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyName {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        PolicyName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == key)
            .ok_or_else(|| EngineError::UnknownPolicy(s.to_string()))
    }
}

/// Signal-generation capability implemented by every policy variant
pub trait SignalPolicy {
    fn name(&self) -> PolicyName;

    /// Minimum number of periods required for a non-neutral signal
    fn min_periods(&self) -> usize;

    /// Evaluate a window that already satisfies `min_periods`
    fn evaluate(&self, window: &MarketWindow) -> Signal;

    fn get_signal(&self, window: &MarketWindow) -> Signal {
        if window.len() < self.min_periods() {
            return Signal::Neutral;
        }
        self.evaluate(window)
    }
}

/// Tagged variant over all registered policies
#[derive(Debug, Clone)]
pub enum Policy {
    Ml(MlPolicy),
    MeanReversion(MeanReversion),
    TrendFollowing(TrendFollowing),
    RsiDivergence(RsiDivergence),
    BollingerBands(BollingerBands),
    SmaCrossover(SmaCrossover),
    Scalping(Scalping),
    Momentum(Momentum),
    Breakout(Breakout),
    VolumeSpike(VolumeSpike),
    SupportResistance(SupportResistance),
    FibonacciRetracement(FibonacciRetracement),
    StochasticOscillator(StochasticOscillator),
    VolumePriceAnalysis(VolumePriceAnalysis),
    Adaptive(AdaptivePolicy),
}

impl Policy {
    /// Default-parameterised instance for a registry name
    pub fn with_defaults(name: PolicyName) -> Self {
        match name {
            PolicyName::Ml => Policy::Ml(MlPolicy::default()),
            PolicyName::MeanReversion => Policy::MeanReversion(MeanReversion::default()),
            PolicyName::TrendFollowing => Policy::TrendFollowing(TrendFollowing::default()),
            PolicyName::RsiDivergence => Policy::RsiDivergence(RsiDivergence::default()),
            PolicyName::BollingerBands => Policy::BollingerBands(BollingerBands::default()),
            PolicyName::SmaCrossover => Policy::SmaCrossover(SmaCrossover::default()),
            PolicyName::Scalping => Policy::Scalping(Scalping::default()),
            PolicyName::Momentum => Policy::Momentum(Momentum::default()),
            PolicyName::Breakout => Policy::Breakout(Breakout::default()),
            PolicyName::VolumeSpike => Policy::VolumeSpike(VolumeSpike::default()),
            PolicyName::SupportResistance => {
                Policy::SupportResistance(SupportResistance::default())
            }
            PolicyName::FibonacciRetracement => {
                Policy::FibonacciRetracement(FibonacciRetracement::default())
            }
            PolicyName::StochasticOscillator => {
                Policy::StochasticOscillator(StochasticOscillator::default())
            }
            PolicyName::VolumePriceAnalysis => {
                Policy::VolumePriceAnalysis(VolumePriceAnalysis::default())
            }
            PolicyName::Adaptive => Policy::Adaptive(AdaptivePolicy::default()),
        }
    }

    fn as_signal_policy(&self) -> &dyn SignalPolicy {
        match self {
            Policy::Ml(p) => p,
            Policy::MeanReversion(p) => p,
            Policy::TrendFollowing(p) => p,
            Policy::RsiDivergence(p) => p,
            Policy::BollingerBands(p) => p,
            Policy::SmaCrossover(p) => p,
            Policy::Scalping(p) => p,
            Policy::Momentum(p) => p,
            Policy::Breakout(p) => p,
            Policy::VolumeSpike(p) => p,
            Policy::SupportResistance(p) => p,
            Policy::FibonacciRetracement(p) => p,
            Policy::StochasticOscillator(p) => p,
            Policy::VolumePriceAnalysis(p) => p,
            Policy::Adaptive(p) => p,
        }
    }

    pub fn name(&self) -> PolicyName {
        self.as_signal_policy().name()
    }

    pub fn min_periods(&self) -> usize {
        self.as_signal_policy().min_periods()
    }

    pub fn get_signal(&self, window: &MarketWindow) -> Signal {
        self.as_signal_policy().get_signal(window)
    }
}

/// Shared fixtures for the per-policy tests
#[cfg(test)]
pub(crate) mod fixtures {
    use crate::types::{Candle, MarketWindow};

    pub const HOUR_MS: i64 = 3_600_000;

    pub fn candle(i: usize, close: f64, volume: f64) -> Candle {
        Candle {
            timestamp: 1_700_000_000_000 + i as i64 * HOUR_MS,
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }

    pub fn window_from_closes(closes: &[f64]) -> MarketWindow {
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, c)| candle(i, *c, 1_000.0))
            .collect();
        MarketWindow::new("ETH/INR", candles).unwrap()
    }

    pub fn window_from_bars(bars: &[(f64, f64)]) -> MarketWindow {
        let candles = bars
            .iter()
            .enumerate()
            .map(|(i, (c, v))| candle(i, *c, *v))
            .collect();
        MarketWindow::new("ETH/INR", candles).unwrap()
    }

    pub fn flat(n: usize, price: f64) -> Vec<f64> {
        vec![price; n]
    }
}
