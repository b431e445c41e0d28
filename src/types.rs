//! Core types used throughout AdaptBot
//!
//! Defines candles, market windows, signals, position actions and trade records.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;
use crate::policy::PolicyName;

/// One OHLCV period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Period open time (Unix milliseconds)
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Volume in base currency
    pub volume: f64,
}

/// Time-ordered OHLCV window for one symbol.
///
/// Timestamps are strictly increasing; the window is read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketWindow {
    symbol: String,
    candles: Vec<Candle>,
}

impl MarketWindow {
    /// Build a window, rejecting out-of-order or duplicated periods
    pub fn new(symbol: impl Into<String>, candles: Vec<Candle>) -> Result<Self, EngineError> {
        let symbol = symbol.into();
        if let Some(pos) = candles
            .windows(2)
            .position(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(EngineError::InvalidWindow {
                symbol,
                reason: format!(
                    "timestamps not strictly increasing at index {} ({} -> {})",
                    pos + 1,
                    candles[pos].timestamp,
                    candles[pos + 1].timestamp
                ),
            });
        }
        Ok(Self { symbol, candles })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.candles.last().map(|c| c.close)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    /// Period length inferred from the first two candles
    pub fn period_ms(&self) -> Option<i64> {
        match self.candles.as_slice() {
            [first, second, ..] => Some(second.timestamp - first.timestamp),
            _ => None,
        }
    }

    /// Trailing sub-window of at most `n` periods
    pub fn tail(&self, n: usize) -> MarketWindow {
        let start = self.candles.len().saturating_sub(n);
        Self {
            symbol: self.symbol.clone(),
            candles: self.candles[start..].to_vec(),
        }
    }
}

/// Ternary trading signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Signal {
    /// Short / sell (-1)
    Short,
    /// Hold (0)
    #[default]
    Neutral,
    /// Long / buy (+1)
    Long,
}

impl Signal {
    pub fn as_i8(&self) -> i8 {
        match self {
            Signal::Short => -1,
            Signal::Neutral => 0,
            Signal::Long => 1,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value.signum() {
            1 => Signal::Long,
            -1 => Signal::Short,
            _ => Signal::Neutral,
        }
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self, Signal::Neutral)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}

/// Position side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Venue order side that opens this position
    pub fn entry_order(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Venue order side that closes this position
    pub fn exit_order(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }

    /// Realized profit for a round trip on this side
    pub fn profit(&self, entry_price: f64, exit_price: f64, quantity: f64) -> f64 {
        match self {
            Side::Long => (exit_price - entry_price) * quantity,
            Side::Short => (entry_price - exit_price) * quantity,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Venue order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action produced by the decision maker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Hold,
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::Hold => "hold",
            Action::OpenLong => "open_long",
            Action::OpenShort => "open_short",
            Action::CloseLong => "close_long",
            Action::CloseShort => "close_short",
        };
        f.write_str(label)
    }
}

/// The single open position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub quantity: f64,
    pub order_id: String,
    /// Policy that was active when the position was opened
    pub policy: PolicyName,
    pub opened_at: i64,
}

/// Closed round trip. Never edited once appended to the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub profit: f64,
    pub policy: PolicyName,
    pub timestamp: i64,
}

impl TradeRecord {
    pub fn is_win(&self) -> bool {
        self.profit > 0.0
    }
}

/// Venue-reported quantity bounds for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeLimits {
    pub min_quantity: f64,
    pub max_quantity: f64,
}

impl TradeLimits {
    pub fn clamp(&self, quantity: f64) -> f64 {
        quantity.max(self.min_quantity).min(self.max_quantity)
    }
}

impl Default for TradeLimits {
    fn default() -> Self {
        Self {
            min_quantity: 0.00001,
            max_quantity: 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(ts: i64, close: f64) -> Candle {
        Candle {
            timestamp: ts,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn window_rejects_non_increasing_timestamps() {
        let result = MarketWindow::new("ETH/INR", vec![candle(2, 1.0), candle(2, 1.0)]);
        assert!(matches!(result, Err(EngineError::InvalidWindow { .. })));
    }

    #[test]
    fn window_tail_keeps_latest_periods() {
        let window =
            MarketWindow::new("ETH/INR", (0..10).map(|i| candle(i, i as f64)).collect()).unwrap();
        let tail = window.tail(3);
        assert_eq!(tail.closes(), vec![7.0, 8.0, 9.0]);
        assert_eq!(window.tail(50).len(), 10);
        assert_eq!(window.period_ms(), Some(1));
    }

    #[test]
    fn side_profit_is_signed_by_direction() {
        assert_eq!(Side::Long.profit(100.0, 110.0, 50.0), 500.0);
        assert_eq!(Side::Short.profit(100.0, 110.0, 50.0), -500.0);
        assert_eq!(Side::Short.exit_order(), OrderSide::Buy);
    }

    #[test]
    fn signal_from_classifier_label() {
        assert_eq!(Signal::from_i64(1), Signal::Long);
        assert_eq!(Signal::from_i64(-1), Signal::Short);
        assert_eq!(Signal::from_i64(0), Signal::Neutral);
        assert_eq!(Signal::Short.as_i8(), -1);
    }

    #[test]
    fn limits_clamp_quantity() {
        let limits = TradeLimits {
            min_quantity: 1.0,
            max_quantity: 10.0,
        };
        assert_eq!(limits.clamp(0.5), 1.0);
        assert_eq!(limits.clamp(50.0), 10.0);
        assert_eq!(limits.clamp(5.0), 5.0);
    }
}
