// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Seed randomness              (split seed + Backend::seed)
//   Step 2: Create the output directory  (Layer 6 - infra)
//   Step 3: Enumerate and pair files     (Layer 4 - data)
//   Step 4: Partition train/valid/test   (Layer 4 - data)
//   Step 5: Build the batch pipelines    (Layer 4 - data)
//   Step 6: Save config                  (Layer 6 - infra)
//   Step 7: Build model and fit          (Layer 5 - ml)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::{
    enumerator::{pair_samples, ImageMaskEnumerator},
    pipeline::{SegmentationPipeline, DEFAULT_PREFETCH},
    preprocessor::SampleLoader,
    splitter::partition_samples,
};
use crate::domain::{sample::DatasetSplits, traits::SampleSource};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::trainer::{run_training, BackendKind, FitHistory};

// ─── Training Configuration ──────────────────────────────────────────────────
// Every knob of a run. Serialised next to the weights so `evaluate`
// can rebuild the same model and the same partitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Directory holding `images/` and `masks/`
    pub dataset_root: String,
    pub output_dir:   String,
    /// Image file extension, without the dot
    pub extension:    String,

    pub height:        u32,
    pub width:         u32,
    pub batch_size:    usize,
    pub learning_rate: f64,
    pub epochs:        usize,

    /// Fraction of the dataset held out for each of validation and test
    pub split:    f64,
    pub seed:     u64,
    /// Batches decoded ahead of the training loop
    pub prefetch: usize,

    pub base_filters: usize,
    pub depth:        usize,

    pub lr_patience:             usize,
    pub lr_factor:               f64,
    pub min_lr:                  f64,
    pub early_stopping_patience: usize,

    /// Require image and mask file stems to match at every index
    pub strict_pairing: bool,
    pub backend:        BackendKind,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset_root:  String::new(),
            output_dir:    "files".to_string(),
            extension:     "png".to_string(),
            height:        256,
            width:         256,
            batch_size:    16,
            learning_rate: 1e-4,
            epochs:        60,
            split:         0.2,
            seed:          42,
            prefetch:      DEFAULT_PREFETCH,
            base_filters:  64,
            depth:         4,
            lr_patience:             5,
            lr_factor:               0.1,
            min_lr:                  1e-7,
            early_stopping_patience: 20,
            strict_pairing: true,
            backend:        BackendKind::default(),
        }
    }
}

impl TrainConfig {
    /// Reject configurations that would fail later, mid-run.
    pub fn validate(&self) -> Result<()> {
        if self.dataset_root.trim().is_empty() {
            bail!("A dataset root is required (--dataset-root)");
        }
        if !(self.split > 0.0 && self.split < 1.0) {
            bail!("Split fraction must be in (0, 1), got {}", self.split);
        }
        if self.batch_size == 0 {
            bail!("Batch size must be at least 1");
        }
        if self.prefetch == 0 {
            bail!("Prefetch depth must be at least 1");
        }
        if self.epochs == 0 {
            bail!("Epoch count must be at least 1");
        }
        if !(self.learning_rate > 0.0) {
            bail!("Learning rate must be positive, got {}", self.learning_rate);
        }
        if !(self.lr_factor > 0.0 && self.lr_factor < 1.0) {
            bail!("Learning-rate factor must be in (0, 1), got {}", self.lr_factor);
        }
        if self.base_filters == 0 {
            bail!("U-Net base filters must be at least 1");
        }
        if self.depth > 8 {
            bail!("U-Net depth must be at most 8, got {}", self.depth);
        }
        let multiple = 1u32 << self.depth;
        if self.height == 0 || self.width == 0 || self.height % multiple != 0 || self.width % multiple != 0 {
            bail!(
                "Image size {}x{} must be a non-zero multiple of {} for a depth-{} U-Net",
                self.height,
                self.width,
                multiple,
                self.depth
            );
        }
        Ok(())
    }

    pub fn loader(&self) -> SampleLoader {
        SampleLoader::new(self.height, self.width)
    }
}

/// Enumerate, pair and partition the dataset described by `cfg`.
///
/// Same config, same partitions: training and evaluation both call this.
pub fn prepare_splits(cfg: &TrainConfig) -> Result<DatasetSplits> {
    let source = ImageMaskEnumerator::new(&cfg.dataset_root, &cfg.extension);
    let (images, masks) = source
        .enumerate()
        .with_context(|| format!("Cannot list dataset '{}'", cfg.dataset_root))?;
    tracing::info!("Found {} images and {} masks", images.len(), masks.len());

    let samples = pair_samples(images, masks, cfg.strict_pairing)?;
    if samples.is_empty() {
        bail!(
            "No '.{}' files found under '{}'",
            cfg.extension,
            cfg.dataset_root
        );
    }

    let splits = partition_samples(samples, cfg.split, cfg.seed)?;
    if splits.train.is_empty() {
        bail!("Training partition is empty; use a smaller split or more data");
    }
    Ok(splits)
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<FitHistory> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Steps 1-2: seed is threaded through; output directory ────────────
        let ckpt_manager = CheckpointManager::create(&cfg.output_dir)?;
        tracing::info!("Seed {}; writing artifacts to '{}'", cfg.seed, ckpt_manager.dir().display());

        // ── Steps 3-4: enumerate, pair, partition ─────────────────────────────
        let splits = prepare_splits(cfg)?;
        tracing::info!(
            "{} pairs. Train: {} - Valid: {} - Test: {}",
            splits.total(),
            splits.train.len(),
            splits.valid.len(),
            splits.test.len()
        );

        // ── Step 5: pipelines (test partition is reserved) ────────────────────
        let (train, valid) = build_pipelines(cfg, &splits)?;
        tracing::info!(
            "{} train batches and {} validation batches of up to {}",
            train.num_batches(),
            valid.num_batches(),
            cfg.batch_size
        );

        // ── Step 6: save config for evaluation ────────────────────────────────
        ckpt_manager.save_config(cfg)?;

        // ── Step 7: fit (Layer 5) ─────────────────────────────────────────────
        let history = run_training(cfg, &train, &valid, &ckpt_manager)?;

        match history.best_val_loss {
            Some(best) => tracing::info!(
                "Finished after {} epochs (early stop: {}, final lr {:e}); best val_loss {:.5}, weights in '{}'",
                history.epochs_run(),
                history.stopped_early,
                history.final_learning_rate().unwrap_or(cfg.learning_rate),
                best,
                ckpt_manager.weights_file().display()
            ),
            None => tracing::warn!(
                "Finished after {} epochs without validation data; no weights were saved",
                history.epochs_run()
            ),
        }
        Ok(history)
    }
}

fn build_pipelines(
    cfg:    &TrainConfig,
    splits: &DatasetSplits,
) -> Result<(SegmentationPipeline, SegmentationPipeline)> {
    let loader = cfg.loader();
    let train  = SegmentationPipeline::new(splits.train.clone(), cfg.batch_size, cfg.prefetch, loader)?;
    let valid  = SegmentationPipeline::new(splits.valid.clone(), cfg.batch_size, cfg.prefetch, loader)?;
    Ok((train, valid))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    /// `n` synthetic 16x16 scans with a bright square and the matching mask.
    fn write_dataset(root: &Path, n: usize) {
        std::fs::create_dir_all(root.join("images")).unwrap();
        std::fs::create_dir_all(root.join("masks")).unwrap();
        for i in 0..n {
            let inside = |x: u32, y: u32| (4..12).contains(&x) && (4..12).contains(&y);
            image::RgbImage::from_fn(16, 16, |x, y| {
                let v = if inside(x, y) { 200 } else { 20 + i as u8 };
                image::Rgb([v, v, v])
            })
            .save(root.join(format!("images/{i:03}.png")))
            .unwrap();
            image::GrayImage::from_fn(16, 16, |x, y| image::Luma([if inside(x, y) { 255 } else { 0 }]))
                .save(root.join(format!("masks/{i:03}.png")))
                .unwrap();
        }
    }

    fn small_config(root: &Path, out: &Path) -> TrainConfig {
        TrainConfig {
            dataset_root: root.display().to_string(),
            output_dir:   out.display().to_string(),
            height:       16,
            width:        16,
            batch_size:   2,
            epochs:       2,
            prefetch:     2,
            base_filters: 2,
            depth:        1,
            backend:      BackendKind::NdArray,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let cfg = TrainConfig::default();
        assert_eq!((cfg.height, cfg.width, cfg.batch_size, cfg.epochs), (256, 256, 16, 60));
        assert_eq!(cfg.learning_rate, 1e-4);
        assert_eq!((cfg.split, cfg.seed, cfg.prefetch), (0.2, 42, 10));
        assert_eq!((cfg.lr_patience, cfg.lr_factor, cfg.min_lr), (5, 0.1, 1e-7));
        assert_eq!(cfg.early_stopping_patience, 20);
        assert_eq!(cfg.output_dir, "files");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let ok = TrainConfig { dataset_root: "data".into(), ..TrainConfig::default() };
        assert!(ok.validate().is_ok());

        let bad = [
            TrainConfig { dataset_root: String::new(), ..ok.clone() },
            TrainConfig { split: 0.0, ..ok.clone() },
            TrainConfig { split: 1.0, ..ok.clone() },
            TrainConfig { batch_size: 0, ..ok.clone() },
            TrainConfig { prefetch: 0, ..ok.clone() },
            TrainConfig { epochs: 0, ..ok.clone() },
            TrainConfig { learning_rate: 0.0, ..ok.clone() },
            TrainConfig { height: 250, ..ok.clone() },
            TrainConfig { width: 0, ..ok.clone() },
        ];
        for cfg in bad {
            assert!(cfg.validate().is_err(), "{cfg:?}");
        }
    }

    #[test]
    fn test_ten_pairs_split_six_two_two() {
        let tmp = tempfile::tempdir().unwrap();
        write_dataset(tmp.path(), 10);
        let cfg = small_config(tmp.path(), &tmp.path().join("files"));

        let splits = prepare_splits(&cfg).unwrap();
        assert_eq!((splits.train.len(), splits.valid.len(), splits.test.len()), (6, 2, 2));

        let (train, valid) = build_pipelines(&cfg, &splits).unwrap();
        assert_eq!(train.num_batches(), 3);
        assert_eq!(valid.num_batches(), 1);
        assert_eq!(train.iter().map(|b| b.unwrap().len()).collect::<Vec<_>>(), [2, 2, 2]);
    }

    #[test]
    fn test_missing_masks_directory_fails_fast() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("images")).unwrap();
        let cfg = small_config(tmp.path(), &tmp.path().join("files"));
        assert!(prepare_splits(&cfg).is_err());
    }

    #[test]
    fn test_execute_writes_all_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("data");
        let out  = tmp.path().join("run/files");
        write_dataset(&data, 10);

        let cfg = small_config(&data, &out);
        let history = TrainUseCase::new(cfg.clone()).execute().unwrap();

        assert_eq!(history.epochs_run(), 2);
        assert!(out.join("model.mpk").is_file());
        assert!(out.join("train_config.json").is_file());

        let csv = std::fs::read_to_string(out.join("log.csv")).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("epoch,dice_coefficient,learning_rate,loss,val_dice_coefficient,val_loss")
        );
        assert_eq!(lines.count(), 2);

        let saved = CheckpointManager::open(&out).load_config().unwrap();
        assert_eq!(saved, cfg);
    }
}
