//! Market regime metrics and the fixed-priority policy selection table

use serde::Serialize;

use crate::indicators;
use crate::policy::PolicyName;
use crate::types::MarketWindow;

/// Windows shorter than this never trigger a switch
pub const MIN_REGIME_PERIODS: usize = 50;
/// Breakout is only selected with at least this much history
pub const BREAKOUT_MIN_PERIODS: usize = 100;

/// Annualisation factor for hourly returns (√24)
const PERIODS_PER_DAY: f64 = 24.0;
const TREND_PERIOD: usize = 20;
const VOLUME_PERIOD: usize = 20;
const RSI_PERIOD: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegimeMetrics {
    /// Sample std of period returns scaled by √24
    pub volatility: f64,
    /// |slope| of a 20-period least-squares fit of close
    pub trend_strength: f64,
    /// Latest volume over the trailing 20-period mean (1.0 when the mean is zero)
    pub volume_ratio: f64,
    /// RSI(14); 50 when unavailable
    pub rsi: f64,
}

impl RegimeMetrics {
    /// `None` for windows shorter than [`MIN_REGIME_PERIODS`]
    pub fn compute(window: &MarketWindow) -> Option<Self> {
        if window.len() < MIN_REGIME_PERIODS {
            return None;
        }
        let closes = window.closes();
        let returns = indicators::pct_changes(&closes);
        let volatility = indicators::sample_std(&returns).unwrap_or(0.0) * PERIODS_PER_DAY.sqrt();
        let trend_strength = indicators::linreg_slope(&window.tail(TREND_PERIOD).closes())
            .unwrap_or(0.0)
            .abs();

        let recent_volumes = window.tail(VOLUME_PERIOD).volumes();
        let avg_volume = indicators::mean(&recent_volumes).unwrap_or(0.0);
        let current_volume = window.last().map(|c| c.volume).unwrap_or(0.0);
        let volume_ratio = if avg_volume > 0.0 {
            current_volume / avg_volume
        } else {
            1.0
        };

        let rsi = indicators::last(&indicators::rsi(&closes, RSI_PERIOD)).unwrap_or(50.0);

        Some(Self {
            volatility,
            trend_strength,
            volume_ratio,
            rsi,
        })
    }
}

/// First matching rule wins:
/// 1. volatility > 0.05 and trend < 0.001 → mean reversion
/// 2. volatility > 0.05 and trend > 0.002 → momentum
/// 3. volatility < 0.02 → SMA crossover
/// 4. volume ratio > 2.0 → volume spike
/// 5. RSI < 30 or RSI > 70 → RSI divergence
/// 6. trend > 0.001 with ≥ 100 periods → breakout
/// 7. volatility > 0.03 → scalping
/// 8. otherwise → support/resistance
pub fn select_policy(metrics: &RegimeMetrics, periods: usize) -> PolicyName {
    let RegimeMetrics {
        volatility,
        trend_strength,
        volume_ratio,
        rsi,
    } = *metrics;

    if volatility > 0.05 && trend_strength < 0.001 {
        PolicyName::MeanReversion
    } else if volatility > 0.05 && trend_strength > 0.002 {
        PolicyName::Momentum
    } else if volatility < 0.02 {
        PolicyName::SmaCrossover
    } else if volume_ratio > 2.0 {
        PolicyName::VolumeSpike
    } else if rsi < 30.0 || rsi > 70.0 {
        PolicyName::RsiDivergence
    } else if periods >= BREAKOUT_MIN_PERIODS && trend_strength > 0.001 {
        PolicyName::Breakout
    } else if volatility > 0.03 {
        PolicyName::Scalping
    } else {
        PolicyName::SupportResistance
    }
}
