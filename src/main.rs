//! AdaptBot - adaptive, risk-governed trading decision engine
//!
//! Replays candles from `data.candles_dir` through the engine on a fixed
//! polling interval until the replay is exhausted or Ctrl-C is pressed.

use adaptbot::config::AppConfig;
use adaptbot::engine::TradingEngine;
use adaptbot::market::ReplayExchange;
use adaptbot::ml_engine::FileModelStore;
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("adaptbot=info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    init_logging(config.logging.json);

    info!("🚀 AdaptBot starting");
    info!("⚙️ {}", config.digest());

    let warmup = config
        .ml
        .training_periods
        .max(config.strategy.window_periods)
        .max(config.strategy.regime_window_periods);
    let exchange = Arc::new(
        ReplayExchange::from_dir(
            &config.data.candles_dir,
            &config.bot.symbols,
            &config.bot.quote_currency,
            config.risk.initial_balance,
        )
        .with_context(|| format!("loading candles from {}", config.data.candles_dir))?
        .starting_at(warmup),
    );
    let store = Arc::new(FileModelStore::new(&config.ml.model_dir));

    let mut engine = TradingEngine::new(config.clone(), exchange.clone(), exchange.clone(), store);
    engine.bootstrap().await;

    if config.bot.live_trading {
        warn!("════════════════════════════════════════════");
        warn!("⚠️  LIVE TRADING ENABLED - real orders will be sent");
        warn!(
            "⚠️  Starting in {}s, press Ctrl-C to abort",
            config.bot.live_start_delay_secs
        );
        warn!("════════════════════════════════════════════");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(config.bot.live_start_delay_secs)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Aborted before the first live cycle");
                return Ok(());
            }
        }
    } else {
        info!("🧪 Dry run: orders are simulated");
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(config.bot.poll_interval_secs));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                match engine.run_cycle().await {
                    Ok(report) => info!(
                        cycle = report.cycle,
                        policy = %report.policy,
                        symbol = report.symbol.as_deref().unwrap_or("-"),
                        action = %report.action,
                        state = %report.state,
                        "🔄 Cycle complete"
                    ),
                    Err(e) => {
                        let symbol = engine
                            .decision()
                            .position()
                            .map(|p| p.symbol.clone())
                            .unwrap_or_else(|| engine.decision().symbol().to_string());
                        error!(
                            symbol = %symbol,
                            cycle_ts = %Utc::now().to_rfc3339(),
                            error = %e,
                            "❌ Cycle failed, backing off"
                        );
                        tokio::time::sleep(Duration::from_secs(config.bot.error_backoff_secs)).await;
                    }
                }
                if !exchange.advance() {
                    info!("📼 Replay exhausted");
                    break;
                }
            }
        }
    }

    let performance = engine.performance();
    let risk = engine.risk_status();
    info!(
        trades = performance.trades,
        total_profit = performance.total_profit,
        win_rate = performance.win_rate,
        balance = risk.current_balance,
        drawdown = risk.drawdown_ratio,
        emergency_stop = risk.emergency_stop,
        "📊 Session summary"
    );
    Ok(())
}
