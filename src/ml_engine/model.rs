//! Random forest signal classifier using SmartCore

use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fmt;
use tracing::info;

use super::features::{TrainingSet, FEATURE_COUNT};
use crate::config::MlConfig;
use crate::error::EngineError;
use crate::types::Signal;

type Classifier = RandomForestClassifier<f64, i64, DenseMatrix<f64>, Vec<i64>>;

/// Hyperparameters and data requirements for a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub n_trees: u16,
    pub max_depth: u16,
    /// Trailing fraction held out for the accuracy report
    pub test_fraction: f64,
    pub min_samples: usize,
    /// Next-period move that counts as up/down
    pub label_threshold: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 8,
            test_fraction: 0.2,
            min_samples: 100,
            label_threshold: 0.001,
        }
    }
}

impl From<&MlConfig> for TrainingParams {
    fn from(config: &MlConfig) -> Self {
        Self {
            n_trees: config.n_trees,
            max_depth: config.max_depth,
            test_fraction: config.test_fraction,
            min_samples: config.min_training_samples,
            label_threshold: config.label_threshold,
        }
    }
}

/// Everything needed to rebuild a trained model: the rows it was fit on and
/// its hyperparameters. Stores persist this rather than the forest itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub params: TrainingParams,
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<i64>,
    /// Hold-out accuracy measured at training time
    pub accuracy: f64,
    pub trained_at: i64,
}

pub struct SignalModel {
    classifier: Classifier,
    snapshot: ModelSnapshot,
}

impl fmt::Debug for SignalModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalModel")
            .field("samples", &self.snapshot.labels.len())
            .field("accuracy", &self.snapshot.accuracy)
            .field("trained_at", &self.snapshot.trained_at)
            .finish()
    }
}

fn to_matrix(rows: &[Vec<f64>]) -> Result<DenseMatrix<f64>, EngineError> {
    let refs: Vec<&[f64]> = rows.iter().map(|r| r.as_slice()).collect();
    DenseMatrix::from_2d_array(&refs)
        .map_err(|e| EngineError::Model(format!("feature matrix: {:?}", e)))
}

fn fit(rows: &[Vec<f64>], labels: &[i64], params: &TrainingParams) -> Result<Classifier, EngineError> {
    let x = to_matrix(rows)?;
    let y = labels.to_vec();
    let rf_params = RandomForestClassifierParameters::default()
        .with_n_trees(params.n_trees)
        .with_max_depth(params.max_depth)
        .with_min_samples_split(5);
    RandomForestClassifier::fit(&x, &y, rf_params)
        .map_err(|e| EngineError::Model(format!("random forest training failed: {:?}", e)))
}

impl SignalModel {
    /// Fit on the leading `1 - test_fraction` of the set (chronological split)
    /// and report accuracy on the trailing remainder.
    pub fn train(set: &TrainingSet, params: &TrainingParams) -> Result<Self, EngineError> {
        if set.is_empty() || set.len() < params.min_samples {
            return Err(EngineError::InsufficientHistory {
                needed: params.min_samples.max(1),
                got: set.len(),
            });
        }

        let split = ((set.len() as f64) * (1.0 - params.test_fraction)).round() as usize;
        let split = split.clamp(1, set.len());
        let (train_x, test_x) = set.features.split_at(split);
        let (train_y, test_y) = set.labels.split_at(split);

        let classifier = fit(train_x, train_y, params)?;
        let (eval_x, eval_y) = if test_y.is_empty() {
            (train_x, train_y)
        } else {
            (test_x, test_y)
        };
        let predictions = classifier
            .predict(&to_matrix(eval_x)?)
            .map_err(|e| EngineError::Model(format!("evaluation failed: {:?}", e)))?;
        let correct = predictions
            .iter()
            .zip(eval_y.iter())
            .filter(|(p, a)| p == a)
            .count();
        let accuracy = correct as f64 / eval_y.len() as f64;

        info!(
            "🧠 ML model trained: {} samples, hold-out accuracy {:.2}",
            train_y.len(),
            accuracy
        );

        Ok(Self {
            classifier,
            snapshot: ModelSnapshot {
                params: params.clone(),
                features: train_x.to_vec(),
                labels: train_y.to_vec(),
                accuracy,
                trained_at: chrono::Utc::now().timestamp_millis(),
            },
        })
    }

    /// Rebuild from a persisted snapshot
    pub fn from_snapshot(snapshot: ModelSnapshot) -> Result<Self, EngineError> {
        if snapshot.features.is_empty() || snapshot.features.len() != snapshot.labels.len() {
            return Err(EngineError::Model(format!(
                "corrupt snapshot: {} rows, {} labels",
                snapshot.features.len(),
                snapshot.labels.len()
            )));
        }
        if snapshot.features.iter().any(|row| row.len() != FEATURE_COUNT) {
            return Err(EngineError::Model(format!(
                "snapshot rows must have {} features",
                FEATURE_COUNT
            )));
        }
        let classifier = fit(&snapshot.features, &snapshot.labels, &snapshot.params)?;
        Ok(Self {
            classifier,
            snapshot,
        })
    }

    pub fn predict(&self, features: &[f64]) -> Result<Signal, EngineError> {
        if features.len() != FEATURE_COUNT {
            return Err(EngineError::Model(format!(
                "expected {} features, got {}",
                FEATURE_COUNT,
                features.len()
            )));
        }
        let x = DenseMatrix::from_2d_array(&[features])
            .map_err(|e| EngineError::Model(format!("feature matrix: {:?}", e)))?;
        let prediction = self
            .classifier
            .predict(&x)
            .map_err(|e| EngineError::Model(format!("prediction failed: {:?}", e)))?;
        prediction
            .first()
            .map(|label| Signal::from_i64(*label))
            .ok_or_else(|| EngineError::Model("empty prediction".to_string()))
    }

    pub fn accuracy(&self) -> f64 {
        self.snapshot.accuracy
    }

    pub fn snapshot(&self) -> &ModelSnapshot {
        &self.snapshot
    }
}
