//! Decision Maker - single-position state machine
//!
//! States are FLAT, LONG and SHORT. A signal plus the current price becomes an
//! [`Action`]; executing the action sizes the order, submits it (or fabricates
//! an id in dry-run mode) and only then mutates the position.
//!
//! - Stop-loss and take-profit are measured as the move from the entry price
//! - Entries are only evaluated while FLAT (no pyramiding, no hedging)
//! - A failed close keeps the position; the next cycle tries again

use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, TradingConfig};
use crate::error::EngineError;
use crate::market::{with_retry, RetryPolicy, VenueClient};
use crate::policy::PolicyName;
use crate::types::{Action, OrderSide, Position, Side, Signal, TradeLimits, TradeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionMode {
    /// Orders are submitted to the venue
    Live,
    /// Same state machine, synthetic order ids
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionState {
    Flat,
    Long,
    Short,
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionState::Flat => write!(f, "FLAT"),
            PositionState::Long => write!(f, "LONG"),
            PositionState::Short => write!(f, "SHORT"),
        }
    }
}

/// Result of [`DecisionMaker::execute_decision`]
#[derive(Debug)]
pub enum ExecutionOutcome {
    Held,
    Opened(Position),
    Closed(TradeRecord),
    /// Nothing changed; the error says why
    Failed(EngineError),
}

pub struct DecisionMaker {
    venue: Arc<dyn VenueClient>,
    trading: TradingConfig,
    mode: ExecutionMode,
    symbol: String,
    quote_currency: String,
    venue_name: String,
    retry: RetryPolicy,
    position: Option<Position>,
}

impl DecisionMaker {
    /// Trades `bot.default_symbol`; live when `bot.live_trading` is set
    pub fn new(venue: Arc<dyn VenueClient>, config: &AppConfig) -> Self {
        let mode = if config.bot.live_trading {
            ExecutionMode::Live
        } else {
            ExecutionMode::DryRun
        };
        Self {
            venue,
            trading: config.trading.clone(),
            mode,
            symbol: config.bot.default_symbol.clone(),
            quote_currency: config.bot.quote_currency.clone(),
            venue_name: config.bot.venue.clone(),
            retry: RetryPolicy::from(&config.execution),
            position: None,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn state(&self) -> PositionState {
        match self.position.as_ref().map(|p| p.side) {
            None => PositionState::Flat,
            Some(Side::Long) => PositionState::Long,
            Some(Side::Short) => PositionState::Short,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Retarget the traded symbol. Refused while a position is open.
    pub fn set_symbol(&mut self, symbol: &str) -> Result<(), EngineError> {
        if let Some(position) = &self.position {
            return Err(EngineError::OrderRejected(format!(
                "cannot switch to {} while {} {} is open",
                symbol, position.side, position.symbol
            )));
        }
        if symbol != self.symbol {
            debug!("Trading symbol set to {}", symbol);
            self.symbol = symbol.to_string();
        }
        Ok(())
    }

    /// `balance * risk_per_trade * leverage / price`, clamped to the venue limits.
    /// Zero when nothing sensible can be bought.
    pub fn compute_quantity(&self, balance: f64, price: f64, limits: &TradeLimits) -> f64 {
        if price <= 0.0 || balance <= 0.0 {
            return 0.0;
        }
        let raw = balance * self.trading.risk_per_trade * self.trading.leverage / price;
        if !raw.is_finite() {
            return 0.0;
        }
        limits.clamp(raw)
    }

    /// Pure transition: what to do with `signal` at `price`
    pub fn decide_at(&self, signal: Signal, price: f64) -> Action {
        match &self.position {
            Some(position) => {
                if position.entry_price <= 0.0 {
                    return Action::Hold;
                }
                let entry = position.entry_price;
                let stop = self.trading.stop_loss_pct;
                let take = self.trading.take_profit_pct;
                match position.side {
                    Side::Long if price <= entry * (1.0 - stop) || price >= entry * (1.0 + take) => {
                        Action::CloseLong
                    }
                    Side::Short if price >= entry * (1.0 + stop) || price <= entry * (1.0 - take) => {
                        Action::CloseShort
                    }
                    _ => Action::Hold,
                }
            }
            None => match signal {
                Signal::Long => Action::OpenLong,
                Signal::Short => Action::OpenShort,
                Signal::Neutral => Action::Hold,
            },
        }
    }

    /// Resolve the current price and decide. Hold when no price is available.
    pub async fn decide(&self, signal: Signal) -> Action {
        let symbol = self.active_symbol().to_string();
        match self.current_price(&symbol).await {
            Ok(price) => self.decide_at(signal, price),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "No price, holding");
                Action::Hold
            }
        }
    }

    /// Carry out `action`. `policy` is recorded on a new position for attribution.
    pub async fn execute_decision(&mut self, action: Action, policy: PolicyName) -> ExecutionOutcome {
        let result = match action {
            Action::Hold => return ExecutionOutcome::Held,
            Action::OpenLong => self.open(Side::Long, policy).await,
            Action::OpenShort => self.open(Side::Short, policy).await,
            Action::CloseLong => self.close(Side::Long).await,
            Action::CloseShort => self.close(Side::Short).await,
        };
        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    symbol = %self.active_symbol(),
                    action = %action,
                    error = %e,
                    "❌ Execution failed, state unchanged"
                );
                ExecutionOutcome::Failed(e)
            }
        }
    }

    /// Symbol of the open position, else the configured one
    fn active_symbol(&self) -> &str {
        self.position
            .as_ref()
            .map(|p| p.symbol.as_str())
            .unwrap_or(&self.symbol)
    }

    async fn current_price(&self, symbol: &str) -> Result<f64, EngineError> {
        let venue = self.venue.clone();
        let price = with_retry(&self.retry, "get_current_price", || {
            let venue = venue.clone();
            let symbol = symbol.to_string();
            async move { venue.get_current_price(&symbol).await }
        })
        .await?;
        match price {
            Some(p) if p > 0.0 && p.is_finite() => Ok(p),
            _ => Err(EngineError::PriceUnavailable(symbol.to_string())),
        }
    }

    async fn balance(&self) -> Result<f64, EngineError> {
        let venue = self.venue.clone();
        let currency = self.quote_currency.clone();
        with_retry(&self.retry, "get_balance", || {
            let venue = venue.clone();
            let currency = currency.clone();
            async move { venue.get_balance(&currency).await }
        })
        .await
    }

    async fn limits(&self, symbol: &str) -> TradeLimits {
        let venue = self.venue.clone();
        let result = with_retry(&self.retry, "get_trade_limits", || {
            let venue = venue.clone();
            let symbol = symbol.to_string();
            async move { venue.get_trade_limits(&symbol).await }
        })
        .await;
        result.unwrap_or_else(|e| {
            warn!(symbol = %symbol, error = %e, "Trade limits unavailable, using defaults");
            TradeLimits {
                min_quantity: self.trading.default_min_quantity,
                max_quantity: self.trading.default_max_quantity,
            }
        })
    }

    /// Submit an order, or fabricate an id in dry-run mode. Never retried.
    async fn submit(
        &self,
        side: OrderSide,
        symbol: &str,
        price: f64,
        quantity: f64,
    ) -> Result<String, EngineError> {
        if self.mode == ExecutionMode::DryRun {
            let id = format!("dry-run-{}", Uuid::new_v4());
            info!(
                symbol = %symbol,
                side = %side,
                price = price,
                quantity = quantity,
                order_id = %id,
                "🧪 [DRY RUN] Order not sent"
            );
            return Ok(id);
        }
        let venue = self.venue.clone();
        let order_type = self.trading.order_type.clone();
        let venue_name = self.venue_name.clone();
        with_retry(&self.retry.single_attempt(), "place_order", || {
            let venue = venue.clone();
            let symbol = symbol.to_string();
            let order_type = order_type.clone();
            let venue_name = venue_name.clone();
            async move {
                venue
                    .place_order(side, &symbol, &order_type, price, quantity, &venue_name)
                    .await
            }
        })
        .await
    }

    async fn open(&mut self, side: Side, policy: PolicyName) -> Result<ExecutionOutcome, EngineError> {
        if let Some(existing) = &self.position {
            return Err(EngineError::OrderRejected(format!(
                "{} {} already open",
                existing.side, existing.symbol
            )));
        }
        let symbol = self.symbol.clone();
        let price = self.current_price(&symbol).await?;
        let balance = self.balance().await?;

        if self.mode == ExecutionMode::Live && balance < self.trading.min_live_balance {
            return Err(EngineError::OrderRejected(format!(
                "balance {:.2} {} below live minimum {:.2}",
                balance, self.quote_currency, self.trading.min_live_balance
            )));
        }

        let limits = self.limits(&symbol).await;
        let quantity = self.compute_quantity(balance, price, &limits);
        if quantity <= 0.0 {
            return Err(EngineError::OrderRejected(format!(
                "computed quantity {} from balance {:.2}",
                quantity, balance
            )));
        }

        let order_id = self.submit(side.entry_order(), &symbol, price, quantity).await?;
        let position = Position {
            symbol,
            side,
            entry_price: price,
            quantity,
            order_id,
            policy,
            opened_at: Utc::now().timestamp_millis(),
        };
        info!(
            symbol = %position.symbol,
            side = %position.side,
            entry = position.entry_price,
            quantity = position.quantity,
            order_id = %position.order_id,
            policy = %position.policy,
            "📈 Opened position"
        );
        self.position = Some(position.clone());
        Ok(ExecutionOutcome::Opened(position))
    }

    async fn close(&mut self, side: Side) -> Result<ExecutionOutcome, EngineError> {
        let position = match &self.position {
            Some(p) if p.side == side => p.clone(),
            Some(p) => {
                return Err(EngineError::OrderRejected(format!(
                    "cannot close {} while {} is open",
                    side, p.side
                )))
            }
            None => {
                return Err(EngineError::OrderRejected(format!(
                    "no {} position to close",
                    side
                )))
            }
        };

        let price = self.current_price(&position.symbol).await?;
        self.submit(side.exit_order(), &position.symbol, price, position.quantity)
            .await?;

        let profit = side.profit(position.entry_price, price, position.quantity);
        let trade = TradeRecord {
            symbol: position.symbol.clone(),
            side,
            entry_price: position.entry_price,
            exit_price: price,
            quantity: position.quantity,
            profit,
            policy: position.policy,
            timestamp: Utc::now().timestamp_millis(),
        };
        info!(
            symbol = %trade.symbol,
            side = %trade.side,
            entry = trade.entry_price,
            exit = trade.exit_price,
            quantity = trade.quantity,
            profit = trade.profit,
            "{} Closed position",
            if trade.is_win() { "💰" } else { "🔻" }
        );
        self.position = None;
        Ok(ExecutionOutcome::Closed(trade))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MockVenueClient;
    use std::sync::Mutex;
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(200),
            attempts: 2,
            delay: Duration::from_millis(1),
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.trading.leverage = 1.0;
        config
    }

    /// Venue whose price can be moved between calls
    fn venue(price: Arc<Mutex<Option<f64>>>, balance: f64) -> MockVenueClient {
        let mut mock = MockVenueClient::new();
        mock.expect_get_current_price()
            .returning(move |_| Ok(*price.lock().unwrap()));
        mock.expect_get_balance().returning(move |_| Ok(balance));
        mock.expect_get_trade_limits()
            .returning(|_| Ok(TradeLimits::default()));
        mock
    }

    fn maker(mock: MockVenueClient, mode: ExecutionMode) -> DecisionMaker {
        DecisionMaker::new(Arc::new(mock), &config())
            .with_mode(mode)
            .with_retry_policy(fast_retry())
    }

    fn open_position(maker: &mut DecisionMaker, side: Side, entry: f64) {
        maker.position = Some(Position {
            symbol: "ETH/INR".to_string(),
            side,
            entry_price: entry,
            quantity: 1.0,
            order_id: "o-1".to_string(),
            policy: PolicyName::Momentum,
            opened_at: 0,
        });
    }

    #[test]
    fn test_flat_maps_signal_to_entry() {
        let m = maker(MockVenueClient::new(), ExecutionMode::DryRun);
        assert_eq!(m.decide_at(Signal::Long, 100.0), Action::OpenLong);
        assert_eq!(m.decide_at(Signal::Short, 100.0), Action::OpenShort);
        assert_eq!(m.decide_at(Signal::Neutral, 100.0), Action::Hold);
    }

    #[test]
    fn test_long_exits_on_stop_and_target_only() {
        let mut m = maker(MockVenueClient::new(), ExecutionMode::DryRun);
        open_position(&mut m, Side::Long, 100.0);
        assert_eq!(m.decide_at(Signal::Short, 103.0), Action::Hold);
        assert_eq!(m.decide_at(Signal::Long, 111.0), Action::CloseLong);
        assert_eq!(m.decide_at(Signal::Neutral, 95.0), Action::CloseLong);
        assert_eq!(m.decide_at(Signal::Neutral, 96.0), Action::Hold);
    }

    #[test]
    fn test_exit_thresholds_are_prices() {
        let mut m = maker(MockVenueClient::new(), ExecutionMode::DryRun);
        open_position(&mut m, Side::Long, 100.0);
        // The target price is 100 * 1.1, which rounds just above 110
        assert_eq!(m.decide_at(Signal::Neutral, 100.0 * (1.0 + 0.10)), Action::CloseLong);
        assert_eq!(m.decide_at(Signal::Neutral, 110.0), Action::Hold);
        assert_eq!(m.decide_at(Signal::Neutral, 100.0 * (1.0 - 0.05)), Action::CloseLong);

        open_position(&mut m, Side::Short, 101.0);
        assert_eq!(m.decide_at(Signal::Neutral, 101.0 * (1.0 + 0.05)), Action::CloseShort);
        assert_eq!(m.decide_at(Signal::Neutral, 101.0 * (1.0 - 0.10)), Action::CloseShort);
        assert_eq!(m.decide_at(Signal::Neutral, 101.0), Action::Hold);
    }

    #[test]
    fn test_short_thresholds_are_inverted() {
        let mut m = maker(MockVenueClient::new(), ExecutionMode::DryRun);
        open_position(&mut m, Side::Short, 100.0);
        assert_eq!(m.decide_at(Signal::Long, 104.0), Action::Hold);
        assert_eq!(m.decide_at(Signal::Neutral, 105.0), Action::CloseShort);
        assert_eq!(m.decide_at(Signal::Neutral, 90.0), Action::CloseShort);
        assert_eq!(m.decide_at(Signal::Neutral, 91.0), Action::Hold);
    }

    #[test]
    fn test_quantity_formula_and_clamp() {
        let mut cfg = AppConfig::default();
        cfg.trading.leverage = 10.0;
        let m = DecisionMaker::new(Arc::new(MockVenueClient::new()), &cfg);
        let wide = TradeLimits {
            min_quantity: 0.001,
            max_quantity: 1_000.0,
        };
        // 100000 * 0.05 * 10 / 100
        assert_eq!(m.compute_quantity(100_000.0, 100.0, &wide), 500.0);
        let tight = TradeLimits {
            min_quantity: 0.001,
            max_quantity: 50.0,
        };
        assert_eq!(m.compute_quantity(100_000.0, 100.0, &tight), 50.0);
        assert_eq!(m.compute_quantity(100_000.0, 0.0, &wide), 0.0);
        assert_eq!(m.compute_quantity(0.0, 100.0, &wide), 0.0);
    }

    #[tokio::test]
    async fn test_missing_price_holds() {
        let price = Arc::new(Mutex::new(None));
        let m = maker(venue(price, 100_000.0), ExecutionMode::Live);
        assert_eq!(m.decide(Signal::Long).await, Action::Hold);
    }

    #[tokio::test]
    async fn test_live_round_trip() {
        let price = Arc::new(Mutex::new(Some(100.0)));
        let mut mock = venue(price.clone(), 100_000.0);
        mock.expect_place_order()
            .times(2)
            .returning(|side, _, _, _, _, _| Ok(format!("order-{}", side)));
        let mut m = maker(mock, ExecutionMode::Live);

        let action = m.decide(Signal::Long).await;
        assert_eq!(action, Action::OpenLong);
        let outcome = m.execute_decision(action, PolicyName::SmaCrossover).await;
        assert!(matches!(outcome, ExecutionOutcome::Opened(_)));
        assert_eq!(m.state(), PositionState::Long);
        let position = m.position().unwrap();
        assert_eq!(position.quantity, 50.0);
        assert_eq!(position.order_id, "order-buy");
        assert_eq!(position.policy, PolicyName::SmaCrossover);

        *price.lock().unwrap() = Some(111.0);
        let action = m.decide(Signal::Neutral).await;
        assert_eq!(action, Action::CloseLong);
        match m.execute_decision(action, PolicyName::Ml).await {
            ExecutionOutcome::Closed(trade) => {
                assert!((trade.profit - 550.0).abs() < 1e-9);
                assert_eq!(trade.policy, PolicyName::SmaCrossover);
            }
            other => panic!("expected a close, got {:?}", other),
        }
        assert_eq!(m.state(), PositionState::Flat);
    }

    #[tokio::test]
    async fn test_rejected_entry_stays_flat() {
        let price = Arc::new(Mutex::new(Some(100.0)));
        let mut mock = venue(price, 100_000.0);
        mock.expect_place_order()
            .times(1)
            .returning(|_, _, _, _, _, _| Err(EngineError::Venue("503".to_string())));
        let mut m = maker(mock, ExecutionMode::Live);

        let outcome = m.execute_decision(Action::OpenLong, PolicyName::Ml).await;
        assert!(matches!(outcome, ExecutionOutcome::Failed(EngineError::Venue(_))));
        assert_eq!(m.state(), PositionState::Flat);
    }

    #[tokio::test]
    async fn test_failed_close_keeps_position() {
        let price = Arc::new(Mutex::new(Some(120.0)));
        let mut mock = venue(price, 100_000.0);
        mock.expect_place_order()
            .returning(|_, _, _, _, _, _| Err(EngineError::OrderRejected("halted".to_string())));
        let mut m = maker(mock, ExecutionMode::Live);
        open_position(&mut m, Side::Long, 100.0);

        let outcome = m.execute_decision(Action::CloseLong, PolicyName::Ml).await;
        assert!(matches!(outcome, ExecutionOutcome::Failed(_)));
        assert_eq!(m.state(), PositionState::Long);
        assert_eq!(m.position().unwrap().entry_price, 100.0);
    }

    #[tokio::test]
    async fn test_dry_run_never_submits() {
        let price = Arc::new(Mutex::new(Some(100.0)));
        let mut mock = venue(price, 100_000.0);
        mock.expect_place_order().never();
        let mut m = maker(mock, ExecutionMode::DryRun);

        let outcome = m.execute_decision(Action::OpenShort, PolicyName::Ml).await;
        assert!(matches!(outcome, ExecutionOutcome::Opened(_)));
        assert_eq!(m.state(), PositionState::Short);
        assert!(m.position().unwrap().order_id.starts_with("dry-run-"));
    }

    #[tokio::test]
    async fn test_second_entry_and_mismatched_close_are_refused() {
        let price = Arc::new(Mutex::new(Some(100.0)));
        let mut mock = venue(price, 100_000.0);
        mock.expect_place_order().never();
        let mut m = maker(mock, ExecutionMode::Live);
        open_position(&mut m, Side::Long, 100.0);

        let outcome = m.execute_decision(Action::OpenShort, PolicyName::Ml).await;
        assert!(matches!(outcome, ExecutionOutcome::Failed(EngineError::OrderRejected(_))));
        let outcome = m.execute_decision(Action::CloseShort, PolicyName::Ml).await;
        assert!(matches!(outcome, ExecutionOutcome::Failed(EngineError::OrderRejected(_))));
        assert_eq!(m.state(), PositionState::Long);
    }

    #[tokio::test]
    async fn test_live_minimum_balance() {
        let price = Arc::new(Mutex::new(Some(100.0)));
        let mut mock = venue(price, 50.0);
        mock.expect_place_order().never();
        let mut m = maker(mock, ExecutionMode::Live);

        let outcome = m.execute_decision(Action::OpenLong, PolicyName::Ml).await;
        assert!(matches!(outcome, ExecutionOutcome::Failed(EngineError::OrderRejected(_))));
    }

    #[test]
    fn test_symbol_locked_while_open() {
        let mut m = maker(MockVenueClient::new(), ExecutionMode::DryRun);
        m.set_symbol("SOL/INR").unwrap();
        assert_eq!(m.symbol(), "SOL/INR");
        open_position(&mut m, Side::Long, 100.0);
        assert!(m.set_symbol("BTC/INR").is_err());
    }
}
