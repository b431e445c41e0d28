//! Volume-confirmed policies: scalping, volume spike, volume/price analysis

use super::{PolicyName, SignalPolicy};
use crate::indicators;
use crate::types::{MarketWindow, Signal};

/// Small short-horizon move backed by above-average volume
#[derive(Debug, Clone)]
pub struct Scalping {
    pub lookback: usize,
    /// Fractional move over the lookback, 0.002 = 0.2%
    pub min_move: f64,
    pub volume_multiple: f64,
}

impl Default for Scalping {
    fn default() -> Self {
        Self {
            lookback: 5,
            min_move: 0.002,
            volume_multiple: 1.2,
        }
    }
}

impl SignalPolicy for Scalping {
    fn name(&self) -> PolicyName {
        PolicyName::Scalping
    }

    fn min_periods(&self) -> usize {
        self.lookback
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let recent = window.tail(self.lookback);
        let closes = recent.closes();
        let (Some(first), Some(last), Some(avg_volume), Some(bar)) = (
            closes.first().copied(),
            closes.last().copied(),
            indicators::mean(&recent.volumes()),
            recent.last(),
        ) else {
            return Signal::Neutral;
        };
        if first <= 0.0 {
            return Signal::Neutral;
        }

        let change = last / first - 1.0;
        let volume_confirmed = bar.volume > avg_volume * self.volume_multiple;

        if change > self.min_move && volume_confirmed {
            Signal::Long
        } else if change < -self.min_move && volume_confirmed {
            Signal::Short
        } else {
            Signal::Neutral
        }
    }
}

/// Volume more than `spike_ratio` times its 20-period mean, direction from the last bar
#[derive(Debug, Clone)]
pub struct VolumeSpike {
    pub lookback: usize,
    pub spike_ratio: f64,
}

impl Default for VolumeSpike {
    fn default() -> Self {
        Self {
            lookback: 20,
            spike_ratio: 2.0,
        }
    }
}

impl SignalPolicy for VolumeSpike {
    fn name(&self) -> PolicyName {
        PolicyName::VolumeSpike
    }

    fn min_periods(&self) -> usize {
        self.lookback
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let recent = window.tail(self.lookback);
        let Some(avg_volume) = indicators::mean(&recent.volumes()) else {
            return Signal::Neutral;
        };
        let [.., prev, current] = window.candles() else {
            return Signal::Neutral;
        };
        if avg_volume <= 0.0 || current.volume / avg_volume <= self.spike_ratio {
            return Signal::Neutral;
        }

        let change = current.close - prev.close;
        if change > 0.0 {
            Signal::Long
        } else if change < 0.0 {
            Signal::Short
        } else {
            Signal::Neutral
        }
    }
}

/// Volume above 1.5x its SMA together with a >2% ten-period rate of change
#[derive(Debug, Clone)]
pub struct VolumePriceAnalysis {
    pub volume_period: usize,
    pub price_period: usize,
    pub volume_multiple: f64,
    /// ROC threshold in percent
    pub roc_threshold: f64,
}

impl Default for VolumePriceAnalysis {
    fn default() -> Self {
        Self {
            volume_period: 20,
            price_period: 10,
            volume_multiple: 1.5,
            roc_threshold: 2.0,
        }
    }
}

impl SignalPolicy for VolumePriceAnalysis {
    fn name(&self) -> PolicyName {
        PolicyName::VolumePriceAnalysis
    }

    fn min_periods(&self) -> usize {
        self.volume_period.max(self.price_period + 1)
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let volumes = window.volumes();
        let (Some(volume_sma), Some(roc), Some(bar)) = (
            indicators::last(&indicators::sma(&volumes, self.volume_period)),
            indicators::last(&indicators::roc(&window.closes(), self.price_period)),
            window.last(),
        ) else {
            return Signal::Neutral;
        };
        if bar.volume <= volume_sma * self.volume_multiple {
            return Signal::Neutral;
        }

        if roc > self.roc_threshold {
            Signal::Long
        } else if roc < -self.roc_threshold {
            Signal::Short
        } else {
            Signal::Neutral
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::fixtures::*;

    fn quiet_then(n: usize, close: f64, volume: f64) -> MarketWindow {
        let mut bars = vec![(100.0, 1_000.0); n];
        bars.push((close, volume));
        window_from_bars(&bars)
    }

    #[test]
    fn test_scalping_follows_small_move_on_volume() {
        assert_eq!(
            Scalping::default().get_signal(&quiet_then(10, 100.5, 3_000.0)),
            Signal::Long
        );
        assert_eq!(
            Scalping::default().get_signal(&quiet_then(10, 99.5, 3_000.0)),
            Signal::Short
        );
    }

    #[test]
    fn test_scalping_ignores_move_without_volume() {
        assert_eq!(
            Scalping::default().get_signal(&quiet_then(10, 100.5, 1_100.0)),
            Signal::Neutral
        );
    }

    #[test]
    fn test_volume_spike_direction_from_last_bar() {
        assert_eq!(
            VolumeSpike::default().get_signal(&quiet_then(25, 101.0, 5_000.0)),
            Signal::Long
        );
        assert_eq!(
            VolumeSpike::default().get_signal(&quiet_then(25, 99.0, 5_000.0)),
            Signal::Short
        );
        // Spike with an unchanged close has no direction
        assert_eq!(
            VolumeSpike::default().get_signal(&quiet_then(25, 100.0, 5_000.0)),
            Signal::Neutral
        );
    }

    #[test]
    fn test_volume_spike_below_ratio_holds() {
        assert_eq!(
            VolumeSpike::default().get_signal(&quiet_then(25, 101.0, 1_500.0)),
            Signal::Neutral
        );
    }

    #[test]
    fn test_volume_price_analysis() {
        assert_eq!(
            VolumePriceAnalysis::default().get_signal(&quiet_then(25, 103.0, 3_000.0)),
            Signal::Long
        );
        assert_eq!(
            VolumePriceAnalysis::default().get_signal(&quiet_then(25, 97.0, 3_000.0)),
            Signal::Short
        );
        // Price move without the volume confirmation
        assert_eq!(
            VolumePriceAnalysis::default().get_signal(&quiet_then(25, 103.0, 1_200.0)),
            Signal::Neutral
        );
    }
}
