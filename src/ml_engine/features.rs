//! Feature engineering for the signal classifier
//!
//! One feature vector per period: raw OHLCV, the indicator set
//! (RSI, MACD, Bollinger, SMA/EMA), one-period price/volume changes and
//! five lags of close, RSI and MACD. A period only produces a vector when
//! every field is finite.

use serde::{Deserialize, Serialize};

use crate::indicators;
use crate::types::MarketWindow;

pub const LAGS: usize = 5;

/// Column names in `to_vec` order
pub const FEATURE_NAMES: [&str; 31] = [
    "open",
    "high",
    "low",
    "close",
    "volume",
    "rsi",
    "macd",
    "macd_signal",
    "macd_hist",
    "bb_upper",
    "bb_middle",
    "bb_lower",
    "sma_20",
    "ema_12",
    "price_change",
    "volume_change",
    "close_lag_1",
    "rsi_lag_1",
    "macd_lag_1",
    "close_lag_2",
    "rsi_lag_2",
    "macd_lag_2",
    "close_lag_3",
    "rsi_lag_3",
    "macd_lag_3",
    "close_lag_4",
    "rsi_lag_4",
    "macd_lag_4",
    "close_lag_5",
    "rsi_lag_5",
    "macd_lag_5",
];

pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MlFeatureVector {
    // ============ Raw bar ============
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,

    // ============ Indicators ============
    /// RSI(14)
    pub rsi: f64,
    /// MACD(12, 26, 9)
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    /// BB(20, 2)
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    pub sma_20: f64,
    pub ema_12: f64,

    // ============ Changes ============
    pub price_change: f64,
    pub volume_change: f64,

    // ============ Lags (1..=5 periods back) ============
    pub close_lags: [f64; LAGS],
    pub rsi_lags: [f64; LAGS],
    pub macd_lags: [f64; LAGS],
}

impl MlFeatureVector {
    pub fn to_vec(&self) -> Vec<f64> {
        let mut out = vec![
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
            self.rsi,
            self.macd,
            self.macd_signal,
            self.macd_hist,
            self.bb_upper,
            self.bb_middle,
            self.bb_lower,
            self.sma_20,
            self.ema_12,
            self.price_change,
            self.volume_change,
        ];
        for lag in 0..LAGS {
            out.push(self.close_lags[lag]);
            out.push(self.rsi_lags[lag]);
            out.push(self.macd_lags[lag]);
        }
        out
    }

    pub fn is_finite(&self) -> bool {
        self.to_vec().iter().all(|v| v.is_finite())
    }
}

/// Index-aligned indicator series for a window
struct IndicatorFrame {
    closes: Vec<f64>,
    volumes: Vec<f64>,
    rsi: Vec<Option<f64>>,
    macd: indicators::MacdSeries,
    bands: indicators::BandSeries,
    sma_20: Vec<Option<f64>>,
    ema_12: Vec<Option<f64>>,
}

impl IndicatorFrame {
    fn new(window: &MarketWindow) -> Self {
        let closes = window.closes();
        Self {
            volumes: window.volumes(),
            rsi: indicators::rsi(&closes, 14),
            macd: indicators::macd(&closes, 12, 26, 9),
            bands: indicators::bollinger(&closes, 20, 2.0),
            sma_20: indicators::sma(&closes, 20),
            ema_12: indicators::ema(&closes, 12),
            closes,
        }
    }

    /// Feature vector for period `i`, `None` while any input is warming up
    fn vector_at(&self, window: &MarketWindow, i: usize) -> Option<MlFeatureVector> {
        if i < LAGS {
            return None;
        }
        let bar = window.candles().get(i)?;
        let mut close_lags = [0.0; LAGS];
        let mut rsi_lags = [0.0; LAGS];
        let mut macd_lags = [0.0; LAGS];
        for lag in 1..=LAGS {
            close_lags[lag - 1] = self.closes[i - lag];
            rsi_lags[lag - 1] = self.rsi[i - lag]?;
            macd_lags[lag - 1] = self.macd.macd[i - lag]?;
        }

        let vector = MlFeatureVector {
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            rsi: self.rsi[i]?,
            macd: self.macd.macd[i]?,
            macd_signal: self.macd.signal[i]?,
            macd_hist: self.macd.hist[i]?,
            bb_upper: self.bands.upper[i]?,
            bb_middle: self.bands.middle[i]?,
            bb_lower: self.bands.lower[i]?,
            sma_20: self.sma_20[i]?,
            ema_12: self.ema_12[i]?,
            price_change: self.closes[i] / self.closes[i - 1] - 1.0,
            volume_change: self.volumes[i] / self.volumes[i - 1] - 1.0,
            close_lags,
            rsi_lags,
            macd_lags,
        };
        vector.is_finite().then_some(vector)
    }
}

/// Feature vector for the last period of the window
pub fn latest_features(window: &MarketWindow) -> Option<Vec<f64>> {
    let last = window.len().checked_sub(1)?;
    IndicatorFrame::new(window)
        .vector_at(window, last)
        .map(|v| v.to_vec())
}

/// Next-period direction label: 1 above `+threshold`, -1 below `-threshold`, else 0
pub fn label_for(close: f64, next_close: f64, threshold: f64) -> i64 {
    if next_close > close * (1.0 + threshold) {
        1
    } else if next_close < close * (1.0 - threshold) {
        -1
    } else {
        0
    }
}

/// Chronologically ordered feature rows with next-period labels
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingSet {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<i64>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Labelled rows for every period that has a complete feature vector and a
/// following period. The last period never appears.
pub fn training_set(window: &MarketWindow, label_threshold: f64) -> TrainingSet {
    let frame = IndicatorFrame::new(window);
    let mut set = TrainingSet::default();
    for i in 0..window.len().saturating_sub(1) {
        if let Some(vector) = frame.vector_at(window, i) {
            set.labels
                .push(label_for(frame.closes[i], frame.closes[i + 1], label_threshold));
            set.features.push(vector.to_vec());
        }
    }
    set
}
