//! Adaptive meta-policy
//!
//! Runs a fixed basket (momentum, mean reversion, trend following) and combines
//! the non-neutral votes with per-policy weights. The weights are an explicit
//! owned mapping; only the feedback component mutates them through
//! [`AdaptiveWeights::update`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{MeanReversion, Momentum, PolicyName, SignalPolicy, TrendFollowing};
use crate::types::{MarketWindow, Signal};

const INITIAL_WEIGHT: f64 = 1.0;
const LEARNING_RATE: f64 = 0.1;
const MIN_WEIGHT: f64 = 0.1;

/// Per-policy weights for the adaptive basket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveWeights {
    weights: BTreeMap<PolicyName, f64>,
}

impl AdaptiveWeights {
    pub const BASKET: [PolicyName; 3] = [
        PolicyName::Momentum,
        PolicyName::MeanReversion,
        PolicyName::TrendFollowing,
    ];

    pub fn get(&self, name: PolicyName) -> Option<f64> {
        self.weights.get(&name).copied()
    }

    /// Nudge a basket member's weight by realized profit.
    /// Returns the new weight, or `None` if the policy is not in the basket.
    pub fn update(&mut self, name: PolicyName, profit: f64) -> Option<f64> {
        let weight = self.weights.get_mut(&name)?;
        *weight = (*weight + profit * LEARNING_RATE).max(MIN_WEIGHT);
        Some(*weight)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PolicyName, f64)> + '_ {
        self.weights.iter().map(|(name, w)| (*name, *w))
    }
}

impl Default for AdaptiveWeights {
    fn default() -> Self {
        Self {
            weights: Self::BASKET
                .iter()
                .map(|name| (*name, INITIAL_WEIGHT))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdaptivePolicy {
    momentum: Momentum,
    mean_reversion: MeanReversion,
    trend_following: TrendFollowing,
    weights: AdaptiveWeights,
    /// Weighted vote must exceed this magnitude
    pub threshold: f64,
}

impl Default for AdaptivePolicy {
    fn default() -> Self {
        Self {
            momentum: Momentum::default(),
            mean_reversion: MeanReversion::default(),
            trend_following: TrendFollowing::default(),
            weights: AdaptiveWeights::default(),
            threshold: 0.5,
        }
    }
}

impl AdaptivePolicy {
    pub fn weights(&self) -> &AdaptiveWeights {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut AdaptiveWeights {
        &mut self.weights
    }

    /// Weighted average over the non-neutral votes
    pub(crate) fn combine(&self, votes: &[(PolicyName, Signal)]) -> Signal {
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for (name, signal) in votes.iter().filter(|(_, s)| !s.is_neutral()) {
            let weight = self.weights.get(*name).unwrap_or(INITIAL_WEIGHT);
            weighted += f64::from(signal.as_i8()) * weight;
            total_weight += weight;
        }
        if total_weight <= 0.0 {
            return Signal::Neutral;
        }

        let score = weighted / total_weight;
        if score > self.threshold {
            Signal::Long
        } else if score < -self.threshold {
            Signal::Short
        } else {
            Signal::Neutral
        }
    }
}

impl SignalPolicy for AdaptivePolicy {
    fn name(&self) -> PolicyName {
        PolicyName::Adaptive
    }

    fn min_periods(&self) -> usize {
        50
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let votes = [
            (PolicyName::Momentum, self.momentum.get_signal(window)),
            (PolicyName::MeanReversion, self.mean_reversion.get_signal(window)),
            (PolicyName::TrendFollowing, self.trend_following.get_signal(window)),
        ];
        self.combine(&votes)
    }
}
