//! AdaptBot Library
//!
//! Adaptive, risk-governed trading decision engine: pluggable signal policies,
//! regime-based policy switching, a single-position state machine and a risk
//! governor that can override any signal.

pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod indicators;
pub mod market;
pub mod ml_engine;
pub mod policy;
pub mod risk;
pub mod strategy;
pub mod types;

pub use error::EngineError;
