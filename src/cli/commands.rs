// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `evaluate`, and all
// their flags. Defaults mirror TrainConfig::default().

use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;
use crate::ml::trainer::BackendKind;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a U-Net on <dataset-root>/images and <dataset-root>/masks
    Train(TrainArgs),

    /// Score the best checkpoint on the held-out test partition
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory containing `images/` and `masks/`
    #[arg(long)]
    pub dataset_root: String,

    /// Where model.mpk, log.csv and train_config.json are written
    #[arg(long, default_value = "files")]
    pub output_dir: String,

    /// Image file extension (without the dot)
    #[arg(long, default_value = "png")]
    pub ext: String,

    #[arg(long, default_value_t = 256)]
    pub height: u32,

    #[arg(long, default_value_t = 256)]
    pub width: u32,

    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    /// Initial Adam learning rate
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// Upper bound on epochs; early stopping may end sooner
    #[arg(long, default_value_t = 60)]
    pub epochs: usize,

    /// Fraction held out for validation, and again for test
    #[arg(long, default_value_t = 0.2)]
    pub split: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Batches decoded ahead of the training loop
    #[arg(long, default_value_t = 10)]
    pub prefetch: usize,

    /// Filters in the first U-Net level; doubled at every level below
    #[arg(long, default_value_t = 64)]
    pub base_filters: usize,

    /// Number of down-sampling levels; height and width must divide by 2^depth
    #[arg(long, default_value_t = 4)]
    pub depth: usize,

    /// Epochs without val_loss improvement before the learning rate drops
    #[arg(long, default_value_t = 5)]
    pub lr_patience: usize,

    #[arg(long, default_value_t = 0.1)]
    pub lr_factor: f64,

    #[arg(long, default_value_t = 1e-7)]
    pub min_lr: f64,

    /// Epochs without val_loss improvement before training stops
    #[arg(long, default_value_t = 20)]
    pub early_stopping_patience: usize,

    /// Pair images and masks by sorted position only, ignoring file names
    #[arg(long)]
    pub no_strict_pairing: bool,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            dataset_root:  a.dataset_root,
            output_dir:    a.output_dir,
            extension:     a.ext,
            height:        a.height,
            width:         a.width,
            batch_size:    a.batch_size,
            learning_rate: a.lr,
            epochs:        a.epochs,
            split:         a.split,
            seed:          a.seed,
            prefetch:      a.prefetch,
            base_filters:  a.base_filters,
            depth:         a.depth,
            lr_patience:             a.lr_patience,
            lr_factor:               a.lr_factor,
            min_lr:                  a.min_lr,
            early_stopping_patience: a.early_stopping_patience,
            strict_pairing: !a.no_strict_pairing,
            backend:        a.backend,
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Output directory of a finished `train` run
    #[arg(long, default_value = "files")]
    pub output_dir: String,

    /// Override the dataset root saved with the run
    #[arg(long)]
    pub dataset_root: Option<String>,

    /// Override the backend saved with the run
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
}
