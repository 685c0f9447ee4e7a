// ============================================================
// Layer 2 - EvaluateUseCase
// ============================================================
// Scores the best checkpoint of a finished run on its test
// partition:
//
//   1. Load <output_dir>/train_config.json
//   2. Re-enumerate and re-partition with the saved seed
//   3. Rebuild the U-Net, load <output_dir>/model.mpk
//   4. Mean Dice loss and coefficient over the test batches

use anyhow::Result;

use crate::application::train_use_case::prepare_splits;
use crate::data::pipeline::SegmentationPipeline;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::trainer::{run_evaluation, BackendKind, Evaluation};

pub struct EvaluateUseCase {
    ckpt_manager: CheckpointManager,
    dataset_root: Option<String>,
    backend:      Option<BackendKind>,
}

impl EvaluateUseCase {
    /// `dataset_root` and `backend` override the values saved with the run.
    pub fn new(
        output_dir:   impl Into<std::path::PathBuf>,
        dataset_root: Option<String>,
        backend:      Option<BackendKind>,
    ) -> Self {
        Self {
            ckpt_manager: CheckpointManager::open(output_dir),
            dataset_root,
            backend,
        }
    }

    /// `None` when the test partition is empty.
    pub fn execute(&self) -> Result<Option<Evaluation>> {
        let mut cfg = self.ckpt_manager.load_config()?;
        if let Some(root) = &self.dataset_root {
            cfg.dataset_root = root.clone();
        }
        let backend = self.backend.unwrap_or(cfg.backend);

        let splits = prepare_splits(&cfg)?;
        let test = SegmentationPipeline::new(splits.test, cfg.batch_size, cfg.prefetch, cfg.loader())?;
        if test.is_empty() {
            tracing::warn!("Test partition is empty; nothing to evaluate");
            return Ok(None);
        }
        tracing::info!("Evaluating on {} test samples ({} batches)", test.len(), test.num_batches());

        run_evaluation(&cfg, backend, &test, &self.ckpt_manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::{TrainConfig, TrainUseCase};

    fn write_dataset(root: &std::path::Path, n: usize) {
        std::fs::create_dir_all(root.join("images")).unwrap();
        std::fs::create_dir_all(root.join("masks")).unwrap();
        for i in 0..n {
            image::RgbImage::from_pixel(8, 8, image::Rgb([i as u8 * 10, 40, 90]))
                .save(root.join(format!("images/{i}.png")))
                .unwrap();
            image::GrayImage::from_fn(8, 8, |x, _| image::Luma([if x < 3 { 255 } else { 0 }]))
                .save(root.join(format!("masks/{i}.png")))
                .unwrap();
        }
    }

    #[test]
    fn test_evaluate_after_training() {
        let tmp  = tempfile::tempdir().unwrap();
        let data = tmp.path().join("data");
        let out  = tmp.path().join("files");
        write_dataset(&data, 10);

        let cfg = TrainConfig {
            dataset_root: data.display().to_string(),
            output_dir:   out.display().to_string(),
            height:       8,
            width:        8,
            batch_size:   2,
            epochs:       1,
            base_filters: 2,
            depth:        1,
            backend:      BackendKind::NdArray,
            ..TrainConfig::default()
        };
        TrainUseCase::new(cfg).execute().unwrap();

        let eval = EvaluateUseCase::new(&out, None, None).execute().unwrap().unwrap();
        assert_eq!(eval.samples, 2);
        assert!((0.0..=1.0).contains(&eval.metric));
        assert!((eval.loss + eval.metric - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_missing_run_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(EvaluateUseCase::new(tmp.path(), None, Some(BackendKind::NdArray)).execute().is_err());
    }
}
