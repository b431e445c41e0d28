//! Classifier-backed policy

use std::sync::Arc;
use tracing::warn;

use super::{PolicyName, SignalPolicy};
use crate::ml_engine::{features, SignalModel};
use crate::types::{MarketWindow, Signal};

/// Classifies the latest feature vector into a signal.
///
/// Without a trained model the policy reports neutral; it never falls back to an
/// untrained classifier.
#[derive(Debug, Clone, Default)]
pub struct MlPolicy {
    model: Option<Arc<SignalModel>>,
}

impl MlPolicy {
    pub fn with_model(model: SignalModel) -> Self {
        Self {
            model: Some(Arc::new(model)),
        }
    }

    pub fn set_model(&mut self, model: SignalModel) {
        self.model = Some(Arc::new(model));
    }

    pub fn clear_model(&mut self) {
        self.model = None;
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&SignalModel> {
        self.model.as_deref()
    }
}

impl SignalPolicy for MlPolicy {
    fn name(&self) -> PolicyName {
        PolicyName::Ml
    }

    fn min_periods(&self) -> usize {
        30
    }

    fn evaluate(&self, window: &MarketWindow) -> Signal {
        let Some(model) = self.model.as_deref() else {
            return Signal::Neutral;
        };
        let Some(row) = features::latest_features(window) else {
            return Signal::Neutral;
        };
        match model.predict(&row) {
            Ok(signal) => signal,
            Err(e) => {
                warn!("ML prediction failed for {}: {}", window.symbol(), e);
                Signal::Neutral
            }
        }
    }
}
