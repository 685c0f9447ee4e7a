// ============================================================
// Layer 6 - Checkpoint Manager
// ============================================================
// Owns the output directory of a training run:
//
//   files/
//     model.mpk           <- best weights so far (CompactRecorder)
//     log.csv             <- one row per epoch (MetricsLogger)
//     train_config.json   <- TrainConfig used for the run
//
// The weights file is only written when validation loss improves,
// so after an early stop it still holds the best epoch even though
// the model in memory has the last epoch's weights.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::CompactRecorder,
};

use crate::application::train_use_case::TrainConfig;

pub const WEIGHTS_STEM: &str = "model";
pub const WEIGHTS_EXTENSION: &str = "mpk";
pub const LOG_FILE: &str = "log.csv";
pub const CONFIG_FILE: &str = "train_config.json";

/// Reads and writes the artifacts of one output directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Use `dir` for artifacts, creating it (and parents) if absent.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Use an existing directory without touching the filesystem.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path handed to the recorder; it appends `.mpk` itself.
    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(WEIGHTS_STEM)
    }

    /// Path of the file actually written by `save_weights`.
    pub fn weights_file(&self) -> PathBuf {
        self.weights_path().with_extension(WEIGHTS_EXTENSION)
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Serialise `model`'s parameters to `path` (extension added by the recorder).
    pub fn save_weights<B: Backend, M: Module<B>>(&self, model: &M, path: &Path) -> Result<()> {
        model
            .clone()
            .save_file(path, &CompactRecorder::new())
            .map_err(|e| anyhow::anyhow!("Failed to save weights to '{}': {:?}", path.display(), e))?;

        tracing::debug!("Saved weights to '{}'", path.display());
        Ok(())
    }

    /// Load the best weights into a freshly built `model`.
    ///
    /// `model` must have the same architecture as the one that was saved.
    pub fn load_weights<B: Backend, M: Module<B>>(&self, model: M, device: &B::Device) -> Result<M> {
        let path = self.weights_path();
        model
            .load_file(path, &CompactRecorder::new(), device)
            .map_err(|e| {
                anyhow::anyhow!(
                    "Cannot load weights '{}'. Have you trained the model first? ({:?})",
                    self.weights_file().display(),
                    e
                )
            })
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.config_path();
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.config_path();
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' first.",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid training config in '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::{SegmentationModel, UNet, UNetConfig};
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_create_makes_nested_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a/b/files");
        let manager = CheckpointManager::create(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(manager.weights_file(), dir.join("model.mpk"));
        assert_eq!(manager.log_path(), dir.join("log.csv"));
    }

    #[test]
    fn test_config_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::create(tmp.path()).unwrap();
        let cfg = TrainConfig { epochs: 3, dataset_root: "data".into(), ..TrainConfig::default() };
        manager.save_config(&cfg).unwrap();
        let loaded = manager.load_config().unwrap();
        assert_eq!(loaded.epochs, 3);
        assert_eq!(loaded.dataset_root, cfg.dataset_root);
    }

    #[test]
    fn test_weights_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::create(tmp.path()).unwrap();
        let device = Default::default();
        let cfg = UNetConfig::new(3).with_base_filters(2).with_depth(1);

        let model: UNet<TestBackend> = cfg.init(&device);
        manager.save_weights::<TestBackend, _>(&model, &manager.weights_path()).unwrap();
        assert!(manager.weights_file().is_file());

        let restored = manager
            .load_weights::<TestBackend, _>(cfg.init(&device), &device)
            .unwrap();
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 4, 4], &device);
        let a: Vec<f32> = model.forward(input.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = restored.forward(input).into_data().to_vec().unwrap();
        for (x, y) in a.iter().zip(&b) {
            // CompactRecorder stores half precision.
            assert!((x - y).abs() < 1e-2);
        }
    }

    #[test]
    fn test_missing_weights_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::open(tmp.path());
        let device = Default::default();
        let model: UNet<TestBackend> = UNetConfig::new(3).with_base_filters(2).with_depth(1).init(&device);
        assert!(manager.load_weights::<TestBackend, _>(model, &device).is_err());
    }
}
