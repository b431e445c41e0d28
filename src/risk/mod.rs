//! Risk Governor - fail-safes and circuit breaker
//!
//! Implements:
//! - Sticky emergency stop (cleared only by an explicit reset)
//! - Daily loss limit against the day's starting balance
//! - Maximum drawdown from the peak balance
//! - Consecutive-loss limit
//! - High-volatility circuit breaker over the trailing window
//!
//! Balance state moves only through realized trade profit
//! ([`RiskGovernor::update_trade_history`]); there is no mark-to-market.

use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use crate::config::RiskConfig;
use crate::types::{MarketWindow, TradeRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskState {
    pub daily_start_balance: f64,
    /// Never decreases
    pub peak_balance: f64,
    pub current_balance: f64,
    pub consecutive_losses: u32,
    /// Sticky latch
    pub emergency_stop: bool,
}

impl RiskState {
    fn seeded(balance: f64) -> Self {
        Self {
            daily_start_balance: balance,
            peak_balance: balance,
            current_balance: balance,
            consecutive_losses: 0,
            emergency_stop: false,
        }
    }

    /// `(start - current) / start`, zero when the start balance is not positive
    pub fn daily_loss_ratio(&self) -> f64 {
        if self.daily_start_balance <= 0.0 {
            return 0.0;
        }
        (self.daily_start_balance - self.current_balance) / self.daily_start_balance
    }

    /// `(peak - current) / peak`, zero when the peak is not positive
    pub fn drawdown_ratio(&self) -> f64 {
        if self.peak_balance <= 0.0 {
            return 0.0;
        }
        (self.peak_balance - self.current_balance) / self.peak_balance
    }
}

/// A guard that currently blocks trading
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RiskBreach {
    EmergencyStop,
    DailyLoss(f64),
    Drawdown(f64),
    LossStreak(u32),
}

impl fmt::Display for RiskBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskBreach::EmergencyStop => write!(f, "emergency stop active"),
            RiskBreach::DailyLoss(ratio) => write!(f, "daily loss {:.2}%", ratio * 100.0),
            RiskBreach::Drawdown(ratio) => write!(f, "drawdown {:.2}%", ratio * 100.0),
            RiskBreach::LossStreak(n) => write!(f, "{} consecutive losses", n),
        }
    }
}

/// Point-in-time summary for logging
#[derive(Debug, Clone, Serialize)]
pub struct RiskStatus {
    pub emergency_stop: bool,
    pub current_balance: f64,
    pub daily_loss_ratio: f64,
    pub drawdown_ratio: f64,
    pub consecutive_losses: u32,
    pub trades: usize,
}

pub struct RiskGovernor {
    config: RiskConfig,
    state: RiskState,
    trade_history: Vec<TradeRecord>,
}

impl RiskGovernor {
    pub fn new(config: RiskConfig) -> Self {
        let state = RiskState::seeded(config.initial_balance);
        Self {
            config,
            state,
            trade_history: Vec::new(),
        }
    }

    /// Reseed all balance fields from the venue at startup
    pub fn seed_balance(&mut self, balance: f64) {
        let emergency_stop = self.state.emergency_stop;
        let consecutive_losses = self.state.consecutive_losses;
        self.state = RiskState {
            emergency_stop,
            consecutive_losses,
            ..RiskState::seeded(balance)
        };
        info!("🛡️ Risk balances seeded at {:.2}", balance);
    }

    /// Guards currently breached, in evaluation order
    pub fn breaches(&self) -> Vec<RiskBreach> {
        let mut out = Vec::new();
        if self.state.emergency_stop {
            out.push(RiskBreach::EmergencyStop);
        }
        let daily_loss = self.state.daily_loss_ratio();
        if daily_loss > self.config.daily_loss_limit {
            out.push(RiskBreach::DailyLoss(daily_loss));
        }
        let drawdown = self.state.drawdown_ratio();
        if drawdown > self.config.max_drawdown {
            out.push(RiskBreach::Drawdown(drawdown));
        }
        if self.state.consecutive_losses >= self.config.max_consecutive_losses {
            out.push(RiskBreach::LossStreak(self.state.consecutive_losses));
        }
        out
    }

    pub fn should_stop_trading(&self) -> bool {
        let breaches = self.breaches();
        for breach in &breaches {
            warn!("🛑 Risk guard breached: {}", breach);
        }
        !breaches.is_empty()
    }

    /// Absolute return over the trailing lookback exceeds the threshold
    pub fn is_high_volatility(&self, window: &MarketWindow) -> bool {
        let closes = window.tail(self.config.volatility_lookback).closes();
        let (Some(first), Some(last)) = (closes.first(), closes.last()) else {
            return false;
        };
        if closes.len() < 2 || *first <= 0.0 {
            return false;
        }
        let change = (last / first - 1.0).abs();
        if change > self.config.volatility_threshold {
            warn!(
                "⚡ High volatility on {}: {:.2}% over {} periods",
                window.symbol(),
                change * 100.0,
                closes.len()
            );
            return true;
        }
        false
    }

    /// The only path by which balance state changes
    pub fn update_trade_history(&mut self, trade: &TradeRecord) {
        self.state.current_balance += trade.profit;
        if trade.profit < 0.0 {
            self.state.consecutive_losses += 1;
        } else {
            self.state.consecutive_losses = 0;
        }
        self.state.peak_balance = self.state.peak_balance.max(self.state.current_balance);
        self.trade_history.push(trade.clone());
    }

    pub fn emergency_stop_trading(&mut self) {
        if !self.state.emergency_stop {
            warn!("🚨 EMERGENCY STOP engaged - trading halted until reset");
        }
        self.state.emergency_stop = true;
    }

    /// Explicit external reset for the sticky latch
    pub fn reset_emergency_stop(&mut self) {
        if self.state.emergency_stop {
            info!("🔓 Emergency stop cleared");
        }
        self.state.emergency_stop = false;
    }

    /// Start a new trading day from the current balance
    pub fn reset_daily_limits(&mut self) {
        self.state.daily_start_balance = self.state.current_balance;
        self.state.consecutive_losses = 0;
        info!(
            "📅 Daily limits reset (start balance {:.2})",
            self.state.daily_start_balance
        );
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn trade_history(&self) -> &[TradeRecord] {
        &self.trade_history
    }

    pub fn status(&self) -> RiskStatus {
        RiskStatus {
            emergency_stop: self.state.emergency_stop,
            current_balance: self.state.current_balance,
            daily_loss_ratio: self.state.daily_loss_ratio(),
            drawdown_ratio: self.state.drawdown_ratio(),
            consecutive_losses: self.state.consecutive_losses,
            trades: self.trade_history.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::fixtures::window_from_closes;
    use crate::policy::PolicyName;
    use crate::types::Side;

    fn trade(profit: f64) -> TradeRecord {
        TradeRecord {
            symbol: "ETH/INR".to_string(),
            side: Side::Long,
            entry_price: 100.0,
            exit_price: 100.0,
            quantity: 1.0,
            profit,
            policy: PolicyName::Momentum,
            timestamp: 0,
        }
    }

    fn governor() -> RiskGovernor {
        RiskGovernor::new(RiskConfig {
            initial_balance: 100_000.0,
            ..RiskConfig::default()
        })
    }

    #[test]
    fn test_fresh_governor_allows_trading() {
        let gov = governor();
        assert!(!gov.should_stop_trading());
        assert!(gov.breaches().is_empty());
    }

    #[test]
    fn test_loss_streak_trips_and_win_resets() {
        let mut gov = governor();
        for _ in 0..4 {
            gov.update_trade_history(&trade(-1.0));
        }
        assert!(!gov.should_stop_trading());
        gov.update_trade_history(&trade(-1.0));
        assert_eq!(gov.breaches(), vec![RiskBreach::LossStreak(5)]);

        gov.update_trade_history(&trade(1.0));
        assert_eq!(gov.state().consecutive_losses, 0);
        assert!(!gov.should_stop_trading());
    }

    #[test]
    fn test_daily_loss_limit_is_strict() {
        let mut gov = governor();
        gov.update_trade_history(&trade(-5_000.0));
        // Exactly 5% is not a breach
        assert!(!gov.breaches().iter().any(|b| matches!(b, RiskBreach::DailyLoss(_))));
        gov.update_trade_history(&trade(-1.0));
        assert!(gov.breaches().iter().any(|b| matches!(b, RiskBreach::DailyLoss(_))));
    }

    #[test]
    fn test_drawdown_measured_from_peak() {
        let mut gov = governor();
        gov.update_trade_history(&trade(100_000.0));
        assert_eq!(gov.state().peak_balance, 200_000.0);
        gov.reset_daily_limits();

        // 10.5% off the peak, 10.5% of the new day's start as well
        gov.update_trade_history(&trade(-21_000.0));
        assert!(gov.breaches().iter().any(|b| matches!(b, RiskBreach::Drawdown(_))));
        // Peak never decreases
        assert_eq!(gov.state().peak_balance, 200_000.0);
    }

    #[test]
    fn test_emergency_latch_is_sticky_and_idempotent() {
        let mut gov = governor();
        gov.emergency_stop_trading();
        let once = gov.state().clone();
        gov.emergency_stop_trading();
        assert_eq!(gov.state(), &once);

        for _ in 0..10 {
            gov.update_trade_history(&trade(1_000.0));
        }
        assert!(gov.should_stop_trading());
        gov.reset_daily_limits();
        assert!(gov.should_stop_trading());

        gov.reset_emergency_stop();
        assert!(!gov.should_stop_trading());
    }

    #[test]
    fn test_reset_daily_limits_reseeds_start_and_streak() {
        let mut gov = governor();
        gov.update_trade_history(&trade(-2_000.0));
        gov.update_trade_history(&trade(-2_000.0));
        gov.reset_daily_limits();
        assert_eq!(gov.state().daily_start_balance, 96_000.0);
        assert_eq!(gov.state().consecutive_losses, 0);
        assert_eq!(gov.state().daily_loss_ratio(), 0.0);
    }

    #[test]
    fn test_high_volatility_over_trailing_ten() {
        let gov = governor();
        let mut closes = vec![100.0; 20];
        closes.extend([101.0, 102.0, 103.0, 104.0, 105.0, 106.0, 107.0, 108.0, 109.0, 110.0]);
        // tail(10): 101 -> 110 is +8.9%
        assert!(gov.is_high_volatility(&window_from_closes(&closes)));

        let calm: Vec<f64> = (0..30).map(|i| 100.0 + 0.1 * i as f64).collect();
        assert!(!gov.is_high_volatility(&window_from_closes(&calm)));

        assert!(!gov.is_high_volatility(&window_from_closes(&[100.0])));
    }

    #[test]
    fn test_status_snapshot() {
        let mut gov = governor();
        gov.update_trade_history(&trade(-1_000.0));
        let status = gov.status();
        assert_eq!(status.trades, 1);
        assert_eq!(status.consecutive_losses, 1);
        assert!((status.daily_loss_ratio - 0.01).abs() < 1e-12);
        assert!(!status.emergency_stop);
    }

    #[test]
    fn test_seed_balance_keeps_latch() {
        let mut gov = governor();
        gov.emergency_stop_trading();
        gov.seed_balance(50_000.0);
        assert_eq!(gov.state().current_balance, 50_000.0);
        assert_eq!(gov.state().peak_balance, 50_000.0);
        assert!(gov.state().emergency_stop);
    }
}
