//! Level-based policies: breakout, support/resistance bounce, Fibonacci retracement
//!
//! Each derives a price level from the trailing window and compares the
//! current close against it with a fixed tolerance band:
//! - breakout: close above 99.5% of the 20-period high (or below 100.5% of the low)
//!   on above-average volume, previous close not yet through the level
//! - support/resistance: close within 1% of the 50-period pivot and moving away from it
//! - Fibonacci: close within 0.5% of a retracement level, confirmed by SMA(20)

use super::{PolicyName, SignalPolicy};
use crate::indicators;
use crate::types::{MarketWindow, Signal};

fn max_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn min_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

/// Last two closes as (current, previous)
fn last_two_closes(window: &MarketWindow) -> Option<(f64, f64)> {
    match window.candles() {
        [.., prev, current] => Some((current.close, prev.close)),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct Breakout {
    pub lookback: usize,
    pub tolerance: f64,
}

impl Default for Breakout {
    fn default() -> Self {
        Self {
            lookback: 20,
            tolerance: 0.005,
        }
    }
}

impl SignalPolicy for Breakout {
    fn name(&self) -> PolicyName {
        PolicyName::Breakout
    }

    fn min_periods(&self) -> usize {
        self.lookback + 5
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let recent = window.tail(self.lookback);
        let recent_high = max_of(&recent.highs());
        let recent_low = min_of(&recent.lows());
        let (Some((price, prev_price)), Some(avg_volume), Some(last)) = (
            last_two_closes(window),
            indicators::mean(&recent.volumes()),
            window.last(),
        ) else {
            return Signal::Neutral;
        };
        let volume_confirmed = last.volume > avg_volume;

        if price > recent_high * (1.0 - self.tolerance) && volume_confirmed && prev_price <= recent_high
        {
            Signal::Long
        } else if price < recent_low * (1.0 + self.tolerance)
            && volume_confirmed
            && prev_price >= recent_low
        {
            Signal::Short
        } else {
            Signal::Neutral
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupportResistance {
    pub lookback: usize,
    pub proximity: f64,
}

impl Default for SupportResistance {
    fn default() -> Self {
        Self {
            lookback: 50,
            proximity: 0.01,
        }
    }
}

impl SignalPolicy for SupportResistance {
    fn name(&self) -> PolicyName {
        PolicyName::SupportResistance
    }

    fn min_periods(&self) -> usize {
        self.lookback
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let recent = window.tail(self.lookback);
        let pivot_high = max_of(&recent.highs());
        let pivot_low = min_of(&recent.lows());
        let Some((price, prev_price)) = last_two_closes(window) else {
            return Signal::Neutral;
        };
        if pivot_high <= 0.0 || pivot_low <= 0.0 {
            return Signal::Neutral;
        }

        let resistance_distance = (price - pivot_high).abs() / pivot_high;
        let support_distance = (price - pivot_low).abs() / pivot_low;

        if resistance_distance < self.proximity && price < prev_price {
            Signal::Short
        } else if support_distance < self.proximity && price > prev_price {
            Signal::Long
        } else {
            Signal::Neutral
        }
    }
}

#[derive(Debug, Clone)]
pub struct FibonacciRetracement {
    pub lookback: usize,
    pub levels: Vec<f64>,
    pub proximity: f64,
    pub sma_period: usize,
}

impl Default for FibonacciRetracement {
    fn default() -> Self {
        Self {
            lookback: 50,
            levels: vec![0.236, 0.382, 0.5, 0.618, 0.786],
            proximity: 0.005,
            sma_period: 20,
        }
    }
}

impl SignalPolicy for FibonacciRetracement {
    fn name(&self) -> PolicyName {
        PolicyName::FibonacciRetracement
    }

    fn min_periods(&self) -> usize {
        self.lookback
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let recent = window.tail(self.lookback);
        let high = max_of(&recent.highs());
        let low = min_of(&recent.lows());
        let closes = window.closes();
        let (Some(price), Some(sma)) = (
            window.last_close(),
            indicators::last(&indicators::sma(&closes, self.sma_period)),
        ) else {
            return Signal::Neutral;
        };
        if price <= 0.0 {
            return Signal::Neutral;
        }

        let range = high - low;
        for ratio in &self.levels {
            let level = high - ratio * range;
            if (price - level).abs() / price >= self.proximity {
                continue;
            }
            if price > sma && level > sma {
                return Signal::Long;
            }
            if price < sma && level < sma {
                return Signal::Short;
            }
        }
        Signal::Neutral
    }
}
