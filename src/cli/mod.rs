// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and hands off to Layer 2.
//
//   1. `train`    - fit a U-Net, writing weights, CSV log and config
//   2. `evaluate` - score the saved weights on the test partition

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "mri-seg",
    version,
    about = "Train a U-Net to segment tumors in MRI slices, then evaluate it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. Routes only, never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on dataset: {}", args.dataset_root);

    let use_case = TrainUseCase::new(args.into());
    let history  = use_case.execute()?;

    println!(
        "Training complete after {} epochs{}. Artifacts in '{}'.",
        history.epochs_run(),
        if history.stopped_early { " (early stop)" } else { "" },
        use_case.config().output_dir
    );
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let use_case = EvaluateUseCase::new(&args.output_dir, args.dataset_root, args.backend);
    match use_case.execute()? {
        Some(eval) => println!(
            "Test samples: {} | dice_loss={:.4} | dice_coefficient={:.4}",
            eval.samples, eval.loss, eval.metric
        ),
        None => println!("Test partition is empty; nothing evaluated."),
    }
    Ok(())
}
