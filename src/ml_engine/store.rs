//! Model store: load/save trained model snapshots by key

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

use super::model::ModelSnapshot;
use crate::error::EngineError;
use crate::policy::PolicyName;

/// Store key for a symbol/policy pair, e.g. `ETH_INR-ml_strategy`
pub fn model_key(symbol: &str, policy: PolicyName) -> String {
    format!("{}-{}", symbol.replace('/', "_"), policy)
}

pub trait ModelStore: Send + Sync {
    /// `Ok(None)` when nothing was saved under `key`
    fn load(&self, key: &str) -> Result<Option<ModelSnapshot>, EngineError>;

    fn save(&self, key: &str, snapshot: &ModelSnapshot) -> Result<(), EngineError>;
}

/// One pretty-printed JSON file per key under a directory
pub struct FileModelStore {
    dir: PathBuf,
}

impl FileModelStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl ModelStore for FileModelStore {
    fn load(&self, key: &str) -> Result<Option<ModelSnapshot>, EngineError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .map_err(|e| EngineError::Model(format!("reading {}: {}", path.display(), e)))?;
        let snapshot: ModelSnapshot = serde_json::from_str(&json)
            .map_err(|e| EngineError::Model(format!("parsing {}: {}", path.display(), e)))?;
        info!(
            "📂 Model loaded from {} ({} samples)",
            path.display(),
            snapshot.labels.len()
        );
        Ok(Some(snapshot))
    }

    fn save(&self, key: &str, snapshot: &ModelSnapshot) -> Result<(), EngineError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| EngineError::Model(format!("creating {}: {}", self.dir.display(), e)))?;
        let path = self.path_for(key);
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| EngineError::Model(format!("serializing model: {}", e)))?;
        fs::write(&path, json)
            .map_err(|e| EngineError::Model(format!("writing {}: {}", path.display(), e)))?;
        info!("💾 Model saved to {}", path.display());
        Ok(())
    }
}

/// Process-local store, used in tests and dry runs without a model directory
#[derive(Default)]
pub struct InMemoryModelStore {
    models: Mutex<HashMap<String, ModelSnapshot>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.models.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ModelStore for InMemoryModelStore {
    fn load(&self, key: &str) -> Result<Option<ModelSnapshot>, EngineError> {
        let models = self
            .models
            .lock()
            .map_err(|_| EngineError::Model("model store lock poisoned".to_string()))?;
        Ok(models.get(key).cloned())
    }

    fn save(&self, key: &str, snapshot: &ModelSnapshot) -> Result<(), EngineError> {
        let mut models = self
            .models
            .lock()
            .map_err(|_| EngineError::Model("model store lock poisoned".to_string()))?;
        models.insert(key.to_string(), snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml_engine::features::FEATURE_COUNT;
    use crate::ml_engine::TrainingParams;

    fn snapshot() -> ModelSnapshot {
        ModelSnapshot {
            params: TrainingParams::default(),
            features: vec![vec![1.0; FEATURE_COUNT], vec![2.0; FEATURE_COUNT]],
            labels: vec![1, -1],
            accuracy: 0.5,
            trained_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_model_key() {
        assert_eq!(model_key("ETH/INR", PolicyName::Ml), "ETH_INR-ml_strategy");
    }

    #[test]
    fn test_file_store_round_trip_and_absent_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::new(dir.path().join("models"));
        assert!(store.load("ETH_INR-ml_strategy").unwrap().is_none());

        store.save("ETH_INR-ml_strategy", &snapshot()).unwrap();
        let loaded = store.load("ETH_INR-ml_strategy").unwrap().unwrap();
        assert_eq!(loaded.labels, vec![1, -1]);
        assert_eq!(loaded.features.len(), 2);
    }

    #[test]
    fn test_file_store_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::new(dir.path());
        fs::write(store.path_for("broken"), "{ not json").unwrap();
        assert!(matches!(store.load("broken"), Err(EngineError::Model(_))));
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryModelStore::new();
        assert!(store.is_empty());
        store.save("k", &snapshot()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.load("k").unwrap().is_some());
        assert!(store.load("other").unwrap().is_none());
    }
}
