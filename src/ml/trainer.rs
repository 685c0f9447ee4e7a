// ============================================================
// Layer 5 - Training Loop
// ============================================================
// Keras-style fit loop over the streaming pipelines.
//
//   for epoch in 0..epochs:
//     train pass   Autodiff<B>: forward, Dice loss, backward, Adam step
//     valid pass   model.valid() on B::InnerBackend, no gradients
//     EpochMetrics -> ModelCheckpoint, CsvLogger, ReduceLrOnPlateau, EarlyStopping
//     apply actions: save weights / change lr / stop
//
// Epoch losses and metrics are means over samples, so a short
// final batch counts in proportion to its size.
//
// The weights left in memory after fit() are the last epoch's.
// The best epoch only lives on disk, in the checkpoint file.

use anyhow::Result;
use burn::{
    backend::{Autodiff, NdArray, Wgpu},
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::SegmentationBatcher, pipeline::SegmentationPipeline};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::callbacks::{standard_callbacks, CallbackAction, CallbackList};
use crate::ml::dice::{DiceObjective, SegmentationObjective};
use crate::ml::model::{SegmentationModel, UNet, UNetConfig};

/// Compute backend for a run. Training wraps it in `Autodiff`.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[value(name = "ndarray")]
    NdArray,
    #[default]
    Wgpu,
}

// ─── Compiled training setup ──────────────────────────────────────────────────
/// Loss/metric pair, optimizer and starting learning rate.
#[derive(Clone)]
pub struct TrainingSetup<O> {
    pub objective:     O,
    pub optimizer:     AdamConfig,
    pub learning_rate: f64,
}

impl<O: SegmentationObjective> TrainingSetup<O> {
    pub fn new(objective: O, learning_rate: f64) -> Self {
        Self { objective, optimizer: AdamConfig::new(), learning_rate }
    }
}

/// What a call to `fit` produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitHistory {
    pub epochs:        Vec<EpochMetrics>,
    pub stopped_early: bool,
    pub best_val_loss: Option<f64>,
}

impl FitHistory {
    pub fn epochs_run(&self) -> usize {
        self.epochs.len()
    }

    pub fn final_learning_rate(&self) -> Option<f64> {
        self.epochs.last().map(|m| m.learning_rate)
    }
}

/// Sample-weighted mean loss and metric over one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss:    f64,
    pub metric:  f64,
    pub samples: usize,
}

#[derive(Default)]
struct RunningMean {
    loss:    f64,
    metric:  f64,
    samples: usize,
}

impl RunningMean {
    fn add(&mut self, loss: f64, metric: f64, n: usize) {
        self.loss    += loss * n as f64;
        self.metric  += metric * n as f64;
        self.samples += n;
    }

    fn finish(self) -> Option<Evaluation> {
        (self.samples > 0).then(|| Evaluation {
            loss:    self.loss / self.samples as f64,
            metric:  self.metric / self.samples as f64,
            samples: self.samples,
        })
    }
}

/// Run `model` over every batch of `pipeline` without updating it.
///
/// Returns `None` for an empty pipeline.
pub fn evaluate<B, M, O>(
    model:     &M,
    objective: &O,
    pipeline:  &SegmentationPipeline,
    device:    &B::Device,
) -> Result<Option<Evaluation>>
where
    B: Backend,
    M: SegmentationModel<B>,
    O: SegmentationObjective,
{
    let batcher = SegmentationBatcher::<B>::new(device.clone());
    let mut mean = RunningMean::default();

    for pairs in pipeline.iter() {
        let batch = batcher.batch(pairs?);
        let n     = batch.len();
        let pred  = model.forward(batch.images);

        let loss: f64   = objective.loss(batch.masks.clone(), pred.clone()).into_scalar().elem();
        let metric: f64 = objective.metric(batch.masks, pred).into_scalar().elem();
        mean.add(loss, metric, n);
    }

    Ok(mean.finish())
}

/// Train `model` for up to `epochs` epochs, driving `callbacks` after each.
#[allow(clippy::too_many_arguments)]
pub fn fit<B, M, O>(
    mut model:   M,
    setup:       &TrainingSetup<O>,
    train:       &SegmentationPipeline,
    valid:       &SegmentationPipeline,
    epochs:      usize,
    callbacks:   &mut CallbackList,
    checkpoints: &CheckpointManager,
    device:      &B::Device,
) -> Result<(M, FitHistory)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + SegmentationModel<B>,
    M::InnerModule: SegmentationModel<B::InnerBackend>,
    O: SegmentationObjective,
{
    let mut optim   = setup.optimizer.init::<B, M>();
    let batcher     = SegmentationBatcher::<B>::new(device.clone());
    let mut lr      = setup.learning_rate;
    let mut history = FitHistory::default();
    let metric_name = setup.objective.metric_name();

    callbacks.on_train_begin()?;
    tracing::info!(
        "Fitting for up to {} epochs: {} train batches, {} validation batches, callbacks [{}]",
        epochs,
        train.num_batches(),
        valid.num_batches(),
        callbacks.names().join(", ")
    );

    for epoch in 0..epochs {
        // ── Training phase ────────────────────────────────────────────────────
        let mut running = RunningMean::default();

        for pairs in train.iter() {
            let batch = batcher.batch(pairs?);
            let n     = batch.len();
            let pred  = model.forward(batch.images);

            let loss = setup.objective.loss(batch.masks.clone(), pred.clone());
            let metric: f64 = setup.objective.metric(batch.masks, pred.detach()).into_scalar().elem();
            let loss_val: f64 = loss.clone().into_scalar().elem();
            running.add(loss_val, metric, n);

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, grads);
        }

        let (loss, metric) = running
            .finish()
            .map(|e| (e.loss, e.metric))
            .unwrap_or((f64::NAN, f64::NAN));

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();
        let val = evaluate::<B::InnerBackend, _, _>(&model_valid, &setup.objective, valid, device)?;

        let metrics = EpochMetrics {
            epoch,
            loss,
            metric,
            val_loss:      val.map(|e| e.loss),
            val_metric:    val.map(|e| e.metric),
            learning_rate: lr,
        };

        if metrics.monitored().is_some_and(|v| !v.is_finite()) {
            tracing::warn!("Epoch {}: validation loss is {}, counted as no improvement", epoch + 1, fmt_opt(metrics.val_loss));
        }

        println!(
            "Epoch {:>3}/{} | loss={:.4} | {}={:.4} | val_loss={} | val_{}={} | lr={:e}",
            epoch + 1,
            epochs,
            metrics.loss,
            metric_name,
            metrics.metric,
            fmt_opt(metrics.val_loss),
            metric_name,
            fmt_opt(metrics.val_metric),
            lr,
        );

        // ── Callbacks ─────────────────────────────────────────────────────────
        let mut stop = false;
        for action in callbacks.on_epoch_end(&metrics)? {
            match action {
                CallbackAction::SaveWeights(path)      => checkpoints.save_weights::<B, M>(&model, &path)?,
                CallbackAction::SetLearningRate(new_lr) => lr = new_lr,
                CallbackAction::Stop                   => stop = true,
                CallbackAction::Continue               => {}
            }
        }

        if let Some(v) = metrics.monitored().filter(|v| v.is_finite()) {
            history.best_val_loss = Some(history.best_val_loss.map_or(v, |best| best.min(v)));
        }
        history.epochs.push(metrics);

        if stop {
            history.stopped_early = true;
            break;
        }
    }

    Ok((model, history))
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.4}")).unwrap_or_else(|| "-".to_string())
}

// ─── Backend dispatch ─────────────────────────────────────────────────────────
/// Build a fresh U-Net on the configured backend and fit it.
pub fn run_training(
    cfg:         &TrainConfig,
    train:       &SegmentationPipeline,
    valid:       &SegmentationPipeline,
    checkpoints: &CheckpointManager,
) -> Result<FitHistory> {
    match cfg.backend {
        BackendKind::Wgpu => {
            let device = burn::backend::wgpu::WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            train_on::<Autodiff<Wgpu>>(cfg, train, valid, checkpoints, device)
        }
        BackendKind::NdArray => {
            let device = burn::backend::ndarray::NdArrayDevice::default();
            tracing::info!("Using NdArray device: {:?}", device);
            train_on::<Autodiff<NdArray>>(cfg, train, valid, checkpoints, device)
        }
    }
}

/// Architecture factory: a U-Net sized for `[height, width, 3]` inputs.
pub fn build_model<B: Backend>(cfg: &TrainConfig, device: &B::Device) -> UNet<B> {
    UNetConfig::from_input_shape([cfg.height as usize, cfg.width as usize, 3])
        .with_base_filters(cfg.base_filters)
        .with_depth(cfg.depth)
        .init(device)
}

fn train_on<B: AutodiffBackend>(
    cfg:         &TrainConfig,
    train:       &SegmentationPipeline,
    valid:       &SegmentationPipeline,
    checkpoints: &CheckpointManager,
    device:      B::Device,
) -> Result<FitHistory> {
    B::seed(cfg.seed);
    let model: UNet<B> = build_model(cfg, &device);
    tracing::info!(
        "Model ready: U-Net depth={}, base_filters={}, input {}x{}x3",
        cfg.depth,
        cfg.base_filters,
        cfg.height,
        cfg.width
    );

    let setup  = TrainingSetup::new(DiceObjective::default(), cfg.learning_rate);
    let logger = MetricsLogger::new(checkpoints.log_path(), setup.objective.metric_name());
    let mut callbacks = standard_callbacks(
        checkpoints.weights_path(),
        logger,
        cfg.lr_factor,
        cfg.lr_patience,
        cfg.min_lr,
        cfg.early_stopping_patience,
    );

    let (_last, history) = fit(model, &setup, train, valid, cfg.epochs, &mut callbacks, checkpoints, &device)?;
    Ok(history)
}

/// Load the best checkpoint into a fresh U-Net and score it on `pipeline`.
pub fn run_evaluation(
    cfg:         &TrainConfig,
    backend:     BackendKind,
    pipeline:    &SegmentationPipeline,
    checkpoints: &CheckpointManager,
) -> Result<Option<Evaluation>> {
    match backend {
        BackendKind::Wgpu => {
            let device = burn::backend::wgpu::WgpuDevice::default();
            evaluate_on::<Wgpu>(cfg, pipeline, checkpoints, &device)
        }
        BackendKind::NdArray => {
            let device = burn::backend::ndarray::NdArrayDevice::default();
            evaluate_on::<NdArray>(cfg, pipeline, checkpoints, &device)
        }
    }
}

fn evaluate_on<B: Backend>(
    cfg:         &TrainConfig,
    pipeline:    &SegmentationPipeline,
    checkpoints: &CheckpointManager,
    device:      &B::Device,
) -> Result<Option<Evaluation>> {
    let model: UNet<B> = checkpoints.load_weights(build_model(cfg, device), device)?;
    tracing::info!("Loaded weights from '{}'", checkpoints.weights_file().display());
    evaluate::<B, _, _>(&model, &DiceObjective::default(), pipeline, device)
}
