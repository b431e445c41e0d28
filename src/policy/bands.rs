//! Bollinger band touch policy

use super::{PolicyName, SignalPolicy};
use crate::indicators;
use crate::types::{MarketWindow, Signal};

/// Price within `touch_tolerance` of the lower/upper statistical band
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub period: usize,
    pub num_std: f64,
    /// 0.001 = within 0.1% of the band
    pub touch_tolerance: f64,
}

impl Default for BollingerBands {
    fn default() -> Self {
        Self {
            period: 20,
            num_std: 2.0,
            touch_tolerance: 0.001,
        }
    }
}

impl SignalPolicy for BollingerBands {
    fn name(&self) -> PolicyName {
        PolicyName::BollingerBands
    }

    fn min_periods(&self) -> usize {
        self.period + 5
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let bands = indicators::bollinger(&window.closes(), self.period, self.num_std);
        let (Some(upper), Some(lower), Some(price)) = (
            indicators::last(&bands.upper),
            indicators::last(&bands.lower),
            window.last_close(),
        ) else {
            return Signal::Neutral;
        };

        if price <= lower * (1.0 + self.touch_tolerance) {
            Signal::Long
        } else if price >= upper * (1.0 - self.touch_tolerance) {
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

    fn oscillating_then(last: f64) -> MarketWindow {
        let mut closes: Vec<f64> = (0..29)
            .map(|i| if i % 2 == 0 { 98.0 } else { 102.0 })
            .collect();
        closes.push(last);
        window_from_closes(&closes)
    }

    #[test]
    fn test_touch_lower_band_buys() {
        assert_eq!(
            BollingerBands::default().get_signal(&oscillating_then(94.0)),
            Signal::Long
        );
    }

    #[test]
    fn test_touch_upper_band_sells() {
        assert_eq!(
            BollingerBands::default().get_signal(&oscillating_then(106.0)),
            Signal::Short
        );
    }

    #[test]
    fn test_inside_bands_holds() {
        assert_eq!(
            BollingerBands::default().get_signal(&oscillating_then(100.0)),
            Signal::Neutral
        );
    }
}
