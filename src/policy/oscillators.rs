//! Oscillator policies: RSI turning from extremes and slow stochastic

use super::{PolicyName, SignalPolicy};
use crate::indicators;
use crate::types::{MarketWindow, Signal};

/// RSI beyond 30/70 and turning back toward the midline
#[derive(Debug, Clone)]
pub struct RsiDivergence {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiDivergence {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl SignalPolicy for RsiDivergence {
    fn name(&self) -> PolicyName {
        PolicyName::RsiDivergence
    }

    fn min_periods(&self) -> usize {
        30
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let rsi = indicators::rsi(&window.closes(), self.period);
        let (Some(current), Some(previous)) = (indicators::last(&rsi), indicators::prev(&rsi))
        else {
            return Signal::Neutral;
        };

        if current < self.oversold && current > previous {
            Signal::Long
        } else if current > self.overbought && current < previous {
            Signal::Short
        } else {
            Signal::Neutral
        }
    }
}

/// Slow stochastic %K/%D in the 20/80 extremes with %K turning
#[derive(Debug, Clone)]
pub struct StochasticOscillator {
    pub k_period: usize,
    pub slow_k_period: usize,
    pub d_period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for StochasticOscillator {
    fn default() -> Self {
        Self {
            k_period: 14,
            slow_k_period: 3,
            d_period: 3,
            oversold: 20.0,
            overbought: 80.0,
        }
    }
}

impl SignalPolicy for StochasticOscillator {
    fn name(&self) -> PolicyName {
        PolicyName::StochasticOscillator
    }

    /// Enough periods for the current and previous slow %D values
    fn min_periods(&self) -> usize {
        self.k_period + self.slow_k_period + self.d_period - 1
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let stoch = indicators::stochastic(
            &window.highs(),
            &window.lows(),
            &window.closes(),
            self.k_period,
            self.slow_k_period,
            self.d_period,
        );
        let (Some(k_now), Some(d_now), Some(k_prev), Some(_d_prev)) = (
            indicators::last(&stoch.slow_k),
            indicators::last(&stoch.slow_d),
            indicators::prev(&stoch.slow_k),
            indicators::prev(&stoch.slow_d),
        ) else {
            return Signal::Neutral;
        };

        if k_now < self.oversold && d_now < self.oversold && k_now > k_prev {
            Signal::Long
        } else if k_now > self.overbought && d_now > self.overbought && k_now < k_prev {
            Signal::Short
        } else {
            Signal::Neutral
        }
    }
}
