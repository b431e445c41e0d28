//! CSV replay exchange
//!
//! Replays historical OHLCV files one period per cycle and acts as both the
//! market data source and the order venue:
//! - files are `<dir>/<SYMBOL with '/' replaced by '_'>.csv` with header
//!   `timestamp,open,high,low,close,volume`
//! - all symbols share one clock: the union of their timestamps
//! - orders fill immediately at the current close
//! - the quote balance moves by realized profit when exposure is reduced

use async_trait::async_trait;
use csv::ReaderBuilder;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

use super::{MarketDataSource, VenueClient};
use crate::error::EngineError;
use crate::types::{Candle, MarketWindow, OrderSide, TradeLimits};

#[derive(Debug, Clone, PartialEq)]
pub struct FilledOrder {
    pub id: String,
    pub side: OrderSide,
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub timestamp: i64,
}

/// Signed net quantity (long > 0) and its average entry price
#[derive(Debug, Clone, Copy, Default)]
struct NetPosition {
    quantity: f64,
    avg_price: f64,
}

impl NetPosition {
    /// Apply a fill, returning the profit realized by any reduced exposure
    fn apply(&mut self, signed_qty: f64, price: f64) -> f64 {
        let mut realized = 0.0;
        let mut remaining = signed_qty;

        if self.quantity != 0.0 && self.quantity.signum() != remaining.signum() {
            let closing = remaining.abs().min(self.quantity.abs());
            realized = (price - self.avg_price) * closing * self.quantity.signum();
            self.quantity -= closing * self.quantity.signum();
            remaining -= closing * remaining.signum();
            if self.quantity.abs() < 1e-12 {
                self.quantity = 0.0;
                self.avg_price = 0.0;
            }
        }

        if remaining.abs() > 1e-12 {
            let total = self.quantity + remaining;
            self.avg_price = (self.quantity.abs() * self.avg_price + remaining.abs() * price)
                / total.abs();
            self.quantity = total;
        }
        realized
    }
}

struct ReplayState {
    step: usize,
    balance: f64,
    positions: HashMap<String, NetPosition>,
    orders: Vec<FilledOrder>,
}

pub struct ReplayExchange {
    series: HashMap<String, Vec<Candle>>,
    /// Union of all timestamps, ascending
    timeline: Vec<i64>,
    quote_currency: String,
    limits: TradeLimits,
    state: Mutex<ReplayState>,
}

/// `ETH/INR` -> `ETH_INR`
pub fn file_stem(symbol: &str) -> String {
    symbol.replace('/', "_")
}

impl ReplayExchange {
    /// Build from in-memory series. Each series must be strictly increasing in time.
    pub fn from_series(
        series: HashMap<String, Vec<Candle>>,
        quote_currency: &str,
        initial_balance: f64,
    ) -> Result<Self, EngineError> {
        if series.values().all(|candles| candles.is_empty()) {
            return Err(EngineError::Data("no candles to replay".to_string()));
        }
        for (symbol, candles) in &series {
            // Reuses the window ordering check
            MarketWindow::new(symbol.clone(), candles.clone())?;
        }
        let timeline: Vec<i64> = series
            .values()
            .flat_map(|candles| candles.iter().map(|c| c.timestamp))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Ok(Self {
            series,
            timeline,
            quote_currency: quote_currency.to_string(),
            limits: TradeLimits::default(),
            state: Mutex::new(ReplayState {
                step: 0,
                balance: initial_balance,
                positions: HashMap::new(),
                orders: Vec::new(),
            }),
        })
    }

    /// Load `<dir>/<SYMBOL>.csv` for each symbol; missing files are skipped with a warning
    pub fn from_dir(
        dir: impl AsRef<Path>,
        symbols: &[String],
        quote_currency: &str,
        initial_balance: f64,
    ) -> Result<Self, EngineError> {
        let dir = dir.as_ref();
        let mut series = HashMap::new();
        for symbol in symbols {
            let path = dir.join(format!("{}.csv", file_stem(symbol)));
            if !path.exists() {
                warn!("No candle file for {} at {}", symbol, path.display());
                continue;
            }
            let candles = read_candles(&path)?;
            info!(
                "📥 Loaded {} candles for {} from {}",
                candles.len(),
                symbol,
                path.display()
            );
            series.insert(symbol.clone(), candles);
        }
        Self::from_series(series, quote_currency, initial_balance)
    }

    pub fn with_limits(mut self, limits: TradeLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Start the clock at `step` (e.g. after a warm-up history)
    pub fn starting_at(self, step: usize) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.step = step.min(self.timeline.len().saturating_sub(1));
        }
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ReplayState>, EngineError> {
        self.state
            .lock()
            .map_err(|_| EngineError::Venue("replay state lock poisoned".to_string()))
    }

    /// Timestamp of the current period
    pub fn now(&self) -> Option<i64> {
        let step = self.lock().ok()?.step;
        self.timeline.get(step).copied()
    }

    /// Move the clock one period forward. `false` once the replay is exhausted.
    pub fn advance(&self) -> bool {
        let Ok(mut state) = self.lock() else {
            return false;
        };
        if state.step + 1 >= self.timeline.len() {
            return false;
        }
        state.step += 1;
        true
    }

    pub fn is_finished(&self) -> bool {
        self.lock()
            .map(|state| state.step + 1 >= self.timeline.len())
            .unwrap_or(true)
    }

    pub fn orders(&self) -> Vec<FilledOrder> {
        self.lock().map(|state| state.orders.clone()).unwrap_or_default()
    }

    /// Candles of `symbol` visible at the current clock
    fn visible(&self, symbol: &str) -> Result<&[Candle], EngineError> {
        let candles = self
            .series
            .get(symbol)
            .ok_or_else(|| EngineError::Data(format!("unknown symbol {}", symbol)))?;
        let Some(now) = self.now() else {
            return Ok(&[]);
        };
        let end = candles.partition_point(|c| c.timestamp <= now);
        Ok(&candles[..end])
    }
}

fn read_candles(path: &Path) -> Result<Vec<Candle>, EngineError> {
    let file = std::fs::File::open(path)
        .map_err(|e| EngineError::Data(format!("opening {}: {}", path.display(), e)))?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
    let mut candles = Vec::new();
    for result in reader.deserialize() {
        let candle: Candle = result
            .map_err(|e| EngineError::Data(format!("parsing {}: {}", path.display(), e)))?;
        candles.push(candle);
    }
    Ok(candles)
}

#[async_trait]
impl MarketDataSource for ReplayExchange {
    async fn fetch_window(&self, symbol: &str, periods: usize) -> Result<MarketWindow, EngineError> {
        let visible = self.visible(symbol)?;
        if visible.is_empty() {
            return Err(EngineError::InsufficientHistory {
                needed: periods,
                got: 0,
            });
        }
        let start = visible.len().saturating_sub(periods);
        MarketWindow::new(symbol, visible[start..].to_vec())
    }
}

#[async_trait]
impl VenueClient for ReplayExchange {
    async fn place_order(
        &self,
        side: OrderSide,
        symbol: &str,
        _order_type: &str,
        _price: f64,
        quantity: f64,
        _venue: &str,
    ) -> Result<String, EngineError> {
        if !(quantity > 0.0) {
            return Err(EngineError::OrderRejected(format!(
                "invalid quantity {}",
                quantity
            )));
        }
        if quantity < self.limits.min_quantity || quantity > self.limits.max_quantity {
            return Err(EngineError::OrderRejected(format!(
                "quantity {} outside [{}, {}]",
                quantity, self.limits.min_quantity, self.limits.max_quantity
            )));
        }
        let fill = self
            .visible(symbol)?
            .last()
            .copied()
            .ok_or_else(|| EngineError::PriceUnavailable(symbol.to_string()))?;

        let mut state = self.lock()?;
        let signed = match side {
            OrderSide::Buy => quantity,
            OrderSide::Sell => -quantity,
        };
        let realized = state
            .positions
            .entry(symbol.to_string())
            .or_default()
            .apply(signed, fill.close);
        state.balance += realized;

        let id = format!("replay-{}", state.orders.len() + 1);
        state.orders.push(FilledOrder {
            id: id.clone(),
            side,
            symbol: symbol.to_string(),
            price: fill.close,
            quantity,
            timestamp: fill.timestamp,
        });
        Ok(id)
    }

    async fn get_balance(&self, currency: &str) -> Result<f64, EngineError> {
        if currency != self.quote_currency {
            return Ok(0.0);
        }
        Ok(self.lock()?.balance)
    }

    async fn get_current_price(&self, symbol: &str) -> Result<Option<f64>, EngineError> {
        Ok(self.visible(symbol)?.last().map(|c| c.close))
    }

    async fn get_trade_limits(&self, _symbol: &str) -> Result<TradeLimits, EngineError> {
        Ok(self.limits)
    }
}
