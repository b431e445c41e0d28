//! Mean-reversion, trend-following, momentum and moving-average crossover policies

use super::{PolicyName, SignalPolicy};
use crate::indicators;
use crate::types::{MarketWindow, Signal};

/// Z-score of the last close against a rolling mean/std
#[derive(Debug, Clone)]
pub struct MeanReversion {
    pub lookback: usize,
    pub z_threshold: f64,
}

impl Default for MeanReversion {
    fn default() -> Self {
        Self {
            lookback: 20,
            z_threshold: 2.0,
        }
    }
}

impl SignalPolicy for MeanReversion {
    fn name(&self) -> PolicyName {
        PolicyName::MeanReversion
    }

    fn min_periods(&self) -> usize {
        self.lookback
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let recent = window.tail(self.lookback).closes();
        let (Some(mean), Some(std), Some(price)) = (
            indicators::mean(&recent),
            indicators::sample_std(&recent),
            window.last_close(),
        ) else {
            return Signal::Neutral;
        };
        if std <= 0.0 {
            return Signal::Neutral;
        }

        let z = (price - mean) / std;
        if z < -self.z_threshold {
            Signal::Long
        } else if z > self.z_threshold {
            Signal::Short
        } else {
            Signal::Neutral
        }
    }
}

/// Price strictly ordered against fast and slow EMAs
#[derive(Debug, Clone)]
pub struct TrendFollowing {
    pub fast_period: usize,
    pub slow_period: usize,
}

impl Default for TrendFollowing {
    fn default() -> Self {
        Self {
            fast_period: 20,
            slow_period: 50,
        }
    }
}

impl SignalPolicy for TrendFollowing {
    fn name(&self) -> PolicyName {
        PolicyName::TrendFollowing
    }

    fn min_periods(&self) -> usize {
        self.slow_period
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let closes = window.closes();
        let (Some(fast), Some(slow), Some(price)) = (
            indicators::last(&indicators::ema(&closes, self.fast_period)),
            indicators::last(&indicators::ema(&closes, self.slow_period)),
            window.last_close(),
        ) else {
            return Signal::Neutral;
        };

        if price > fast && fast > slow {
            Signal::Long
        } else if price < fast && fast < slow {
            Signal::Short
        } else {
            Signal::Neutral
        }
    }
}

/// Rate of change confirmed by MACD line vs signal line
#[derive(Debug, Clone)]
pub struct Momentum {
    pub roc_period: usize,
    /// ROC threshold in percent
    pub roc_threshold: f64,
    pub macd_periods: (usize, usize, usize),
}

impl Default for Momentum {
    fn default() -> Self {
        Self {
            roc_period: 10,
            roc_threshold: 2.0,
            macd_periods: (12, 26, 9),
        }
    }
}

impl SignalPolicy for Momentum {
    fn name(&self) -> PolicyName {
        PolicyName::Momentum
    }

    fn min_periods(&self) -> usize {
        20
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let closes = window.closes();
        let (fast, slow, signal) = self.macd_periods;
        let macd = indicators::macd(&closes, fast, slow, signal);
        // MACD signal needs more history than the declared minimum; stay neutral until then
        let (Some(roc), Some(line), Some(signal_line)) = (
            indicators::last(&indicators::roc(&closes, self.roc_period)),
            indicators::last(&macd.macd),
            indicators::last(&macd.signal),
        ) else {
            return Signal::Neutral;
        };

        if roc > self.roc_threshold && line > signal_line {
            Signal::Long
        } else if roc < -self.roc_threshold && line < signal_line {
            Signal::Short
        } else {
            Signal::Neutral
        }
    }
}

/// Fast/slow SMA crossing between the previous and the current period
#[derive(Debug, Clone)]
pub struct SmaCrossover {
    pub fast_period: usize,
    pub slow_period: usize,
}

impl Default for SmaCrossover {
    fn default() -> Self {
        Self {
            fast_period: 10,
            slow_period: 20,
        }
    }
}

impl SignalPolicy for SmaCrossover {
    fn name(&self) -> PolicyName {
        PolicyName::SmaCrossover
    }

    fn min_periods(&self) -> usize {
        self.slow_period + 5
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let closes = window.closes();
        let fast = indicators::sma(&closes, self.fast_period);
        let slow = indicators::sma(&closes, self.slow_period);
        let (Some(fast_now), Some(slow_now), Some(fast_prev), Some(slow_prev)) = (
            indicators::last(&fast),
            indicators::last(&slow),
            indicators::prev(&fast),
            indicators::prev(&slow),
        ) else {
            return Signal::Neutral;
        };

        if fast_prev <= slow_prev && fast_now > slow_now {
            Signal::Long
        } else if fast_prev >= slow_prev && fast_now < slow_now {
            Signal::Short
        } else {
            Signal::Neutral
        }
    }
}
