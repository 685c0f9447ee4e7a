// ============================================================
// Layer 5 - Epoch Callbacks
// ============================================================
// Monitors attached to the fit loop. After every epoch the loop
// hands the EpochMetrics to each callback in order; a callback
// updates its own state and answers with a CallbackAction that
// the loop applies:
//
//   ModelCheckpoint    val_loss improved           -> SaveWeights(path)
//   CsvLogger          always                      -> appends a row
//   ReduceLrOnPlateau  5 epochs without improving  -> SetLearningRate(lr * 0.1)
//   EarlyStopping      20 epochs without improving -> Stop
//
// All monitors watch validation loss. When an epoch has none
// (empty validation partition) they do nothing. A NaN or infinite
// loss is an epoch without improvement, so a diverging run still
// decays its learning rate and stops.

use std::path::PathBuf;

use anyhow::Result;

use crate::infra::metrics::{EpochMetrics, MetricsLogger};

/// What the fit loop should do after a callback has seen an epoch.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackAction {
    Continue,
    /// Persist the current weights to this path.
    SaveWeights(PathBuf),
    /// Use this learning rate from the next epoch on.
    SetLearningRate(f64),
    /// Finish this epoch's callbacks, then end training.
    Stop,
}

pub trait TrainingCallback {
    fn name(&self) -> &'static str;

    fn on_train_begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_epoch_end(&mut self, metrics: &EpochMetrics) -> Result<CallbackAction>;
}

fn warn_missing(name: &str, warned: &mut bool) {
    if !*warned {
        tracing::warn!("{name}: no validation loss available, skipping");
        *warned = true;
    }
}

// ─── ModelCheckpoint ──────────────────────────────────────────────────────────
/// Saves weights only when validation loss beats the best seen so far.
#[derive(Debug)]
pub struct ModelCheckpoint {
    path:   PathBuf,
    best:   f64,
    warned: bool,
}

impl ModelCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), best: f64::INFINITY, warned: false }
    }
}

impl TrainingCallback for ModelCheckpoint {
    fn name(&self) -> &'static str {
        "ModelCheckpoint"
    }

    fn on_epoch_end(&mut self, m: &EpochMetrics) -> Result<CallbackAction> {
        let Some(current) = m.monitored() else {
            warn_missing(self.name(), &mut self.warned);
            return Ok(CallbackAction::Continue);
        };

        if m.is_improvement(self.best) {
            tracing::info!(
                "Epoch {}: val_loss improved from {:.5} to {:.5}, saving model to '{}'",
                m.epoch + 1,
                self.best,
                current,
                self.path.display()
            );
            self.best = current;
            Ok(CallbackAction::SaveWeights(self.path.clone()))
        } else {
            tracing::info!(
                "Epoch {}: val_loss did not improve from {:.5}",
                m.epoch + 1,
                self.best
            );
            Ok(CallbackAction::Continue)
        }
    }
}

// ─── CsvLogger ────────────────────────────────────────────────────────────────
/// Writes one CSV row per epoch; the file is truncated when training begins.
#[derive(Debug)]
pub struct CsvLogger {
    logger: MetricsLogger,
}

impl CsvLogger {
    pub fn new(logger: MetricsLogger) -> Self {
        Self { logger }
    }
}

impl TrainingCallback for CsvLogger {
    fn name(&self) -> &'static str {
        "CsvLogger"
    }

    fn on_train_begin(&mut self) -> Result<()> {
        self.logger.start()
    }

    fn on_epoch_end(&mut self, m: &EpochMetrics) -> Result<CallbackAction> {
        self.logger.log(m)?;
        Ok(CallbackAction::Continue)
    }
}

// ─── ReduceLrOnPlateau ────────────────────────────────────────────────────────
/// Multiplies the learning rate by `factor` after `patience` epochs
/// without an improvement of at least `min_delta`, never going below `min_lr`.
#[derive(Debug)]
pub struct ReduceLrOnPlateau {
    factor:           f64,
    patience:         usize,
    min_lr:           f64,
    min_delta:        f64,
    cooldown:         usize,
    cooldown_counter: usize,
    wait:             usize,
    best:             f64,
    warned:           bool,
}

impl ReduceLrOnPlateau {
    pub fn new(factor: f64, patience: usize, min_lr: f64) -> Self {
        Self {
            factor,
            patience,
            min_lr,
            min_delta: 1e-4,
            cooldown: 0,
            cooldown_counter: 0,
            wait: 0,
            best: f64::INFINITY,
            warned: false,
        }
    }

    /// Epochs to wait after a reduction before counting stagnation again.
    pub fn with_cooldown(mut self, cooldown: usize) -> Self {
        self.cooldown = cooldown;
        self
    }
}

impl TrainingCallback for ReduceLrOnPlateau {
    fn name(&self) -> &'static str {
        "ReduceLrOnPlateau"
    }

    fn on_epoch_end(&mut self, m: &EpochMetrics) -> Result<CallbackAction> {
        let Some(current) = m.monitored() else {
            warn_missing(self.name(), &mut self.warned);
            return Ok(CallbackAction::Continue);
        };

        if self.cooldown_counter > 0 {
            self.cooldown_counter -= 1;
            self.wait = 0;
        }

        if current.is_finite() && current < self.best - self.min_delta {
            self.best = current;
            self.wait = 0;
            return Ok(CallbackAction::Continue);
        }
        if self.cooldown_counter > 0 {
            return Ok(CallbackAction::Continue);
        }

        self.wait += 1;
        if self.wait >= self.patience && m.learning_rate > self.min_lr {
            let new_lr = (m.learning_rate * self.factor).max(self.min_lr);
            tracing::info!(
                "Epoch {}: ReduceLrOnPlateau reducing learning rate to {:e}",
                m.epoch + 1,
                new_lr
            );
            self.cooldown_counter = self.cooldown;
            self.wait = 0;
            return Ok(CallbackAction::SetLearningRate(new_lr));
        }
        Ok(CallbackAction::Continue)
    }
}

// ─── EarlyStopping ────────────────────────────────────────────────────────────
/// Stops training after `patience` epochs without improvement.
///
/// The best weights are not restored; the model keeps the last epoch's weights.
#[derive(Debug)]
pub struct EarlyStopping {
    patience:      usize,
    min_delta:     f64,
    wait:          usize,
    best:          f64,
    warned:        bool,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            min_delta: 0.0,
            wait: 0,
            best: f64::INFINITY,
            warned: false,
        }
    }
}

impl TrainingCallback for EarlyStopping {
    fn name(&self) -> &'static str {
        "EarlyStopping"
    }

    fn on_train_begin(&mut self) -> Result<()> {
        self.wait = 0;
        self.best = f64::INFINITY;
        Ok(())
    }

    fn on_epoch_end(&mut self, m: &EpochMetrics) -> Result<CallbackAction> {
        let Some(current) = m.monitored() else {
            warn_missing(self.name(), &mut self.warned);
            return Ok(CallbackAction::Continue);
        };

        self.wait += 1;
        if current.is_finite() && current - self.min_delta < self.best {
            self.best = current;
            self.wait = 0;
            return Ok(CallbackAction::Continue);
        }

        if self.wait >= self.patience && m.epoch > 0 {
            tracing::info!(
                "Epoch {}: early stopping, no val_loss improvement for {} epochs (best {:.5})",
                m.epoch + 1,
                self.wait,
                self.best
            );
            return Ok(CallbackAction::Stop);
        }
        Ok(CallbackAction::Continue)
    }
}

// ─── CallbackList ─────────────────────────────────────────────────────────────
/// Ordered set of callbacks driven by the fit loop.
#[derive(Default)]
pub struct CallbackList {
    callbacks: Vec<Box<dyn TrainingCallback>>,
}

impl CallbackList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, callback: impl TrainingCallback + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.callbacks.iter().map(|c| c.name()).collect()
    }

    pub fn on_train_begin(&mut self) -> Result<()> {
        for cb in &mut self.callbacks {
            cb.on_train_begin()?;
        }
        Ok(())
    }

    /// Run every callback in order and collect the non-trivial actions.
    pub fn on_epoch_end(&mut self, metrics: &EpochMetrics) -> Result<Vec<CallbackAction>> {
        let mut actions = Vec::new();
        for cb in &mut self.callbacks {
            match cb.on_epoch_end(metrics)? {
                CallbackAction::Continue => {}
                action => actions.push(action),
            }
        }
        Ok(actions)
    }
}

/// The standard monitor stack for a training run, in firing order.
pub fn standard_callbacks(
    weights_path:            PathBuf,
    logger:                  MetricsLogger,
    lr_factor:               f64,
    lr_patience:             usize,
    min_lr:                  f64,
    early_stopping_patience: usize,
) -> CallbackList {
    CallbackList::new()
        .push(ModelCheckpoint::new(weights_path))
        .push(CsvLogger::new(logger))
        .push(ReduceLrOnPlateau::new(lr_factor, lr_patience, min_lr))
        .push(EarlyStopping::new(early_stopping_patience))
}
