//! ML Engine - classifier behind the `ml_strategy` policy
//!
//! - Feature engineering (indicators + lagged values) per period
//! - Random forest classifier (SmartCore) mapping a feature vector to {-1, 0, 1}
//! - Model store keyed by symbol/policy; snapshots hold the training rows and
//!   hyperparameters, and the forest is refit on load

pub mod features;
pub mod model;
pub mod store;

pub use features::{latest_features, training_set, MlFeatureVector, TrainingSet, FEATURE_COUNT};
pub use model::{ModelSnapshot, SignalModel, TrainingParams};
pub use store::{model_key, FileModelStore, InMemoryModelStore, ModelStore};

use tracing::info;

use crate::error::EngineError;
use crate::types::MarketWindow;

/// Build labelled rows from a historical window and fit a model
pub fn train(window: &MarketWindow, params: &TrainingParams) -> Result<SignalModel, EngineError> {
    let set = training_set(window, params.label_threshold);
    info!(
        "🧠 Training on {} ({} periods, {} labelled rows)",
        window.symbol(),
        window.len(),
        set.len()
    );
    SignalModel::train(&set, params)
}
