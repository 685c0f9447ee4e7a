// ============================================================
// Layer 6 - Epoch Metrics and CSV Log
// ============================================================
// One EpochMetrics row is produced per epoch by the trainer and
// handed to every callback. MetricsLogger writes those rows to
// <output_dir>/log.csv:
//
//   epoch,dice_coefficient,learning_rate,loss,val_dice_coefficient,val_loss
//   0,0.213400,1.000000e-4,0.786600,0.241100,0.758900
//   1,0.301200,1.000000e-4,0.698800,0.310700,0.689300
//
// Epoch indices start at 0. Validation columns are left empty
// when the run has no validation partition.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};
use serde::{Deserialize, Serialize};

/// Everything measured during one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 0-based epoch index
    pub epoch: usize,

    /// Mean training loss, weighted by batch size
    pub loss: f64,

    /// Mean training metric (Dice coefficient)
    pub metric: f64,

    /// Mean validation loss; None when there is no validation data
    pub val_loss: Option<f64>,

    pub val_metric: Option<f64>,

    /// Learning rate used for every step of this epoch (scientific notation in the CSV)
    pub learning_rate: f64,
}

impl EpochMetrics {
    /// Validation loss; `None` only when the run has no validation data.
    ///
    /// A NaN or infinite loss is still reported, and never counts as an
    /// improvement.
    pub fn monitored(&self) -> Option<f64> {
        self.val_loss
    }

    /// Returns true if this epoch improved over the previous best val_loss
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        self.val_loss.is_some_and(|v| v.is_finite() && v < best_val_loss)
    }
}

/// Writes epoch metrics to a CSV file.
#[derive(Debug)]
pub struct MetricsLogger {
    csv_path:    PathBuf,
    metric_name: String,
}

impl MetricsLogger {
    pub fn new(csv_path: impl Into<PathBuf>, metric_name: impl Into<String>) -> Self {
        Self { csv_path: csv_path.into(), metric_name: metric_name.into() }
    }

    pub fn header(&self) -> String {
        let m = &self.metric_name;
        format!("epoch,{m},learning_rate,loss,val_{m},val_loss")
    }

    /// Create (or truncate) the file and write the header row.
    pub fn start(&self) -> Result<()> {
        if let Some(parent) = self.csv_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }
        let mut f = fs::File::create(&self.csv_path)
            .with_context(|| format!("Cannot create metrics CSV '{}'", self.csv_path.display()))?;
        writeln!(f, "{}", self.header())?;
        tracing::debug!("Created metrics CSV: '{}'", self.csv_path.display());
        Ok(())
    }

    /// Append one epoch's metrics as a new row.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;

        let opt = |v: Option<f64>| v.map(|v| format!("{v:.6}")).unwrap_or_default();
        writeln!(
            f,
            "{},{:.6},{:.6e},{:.6},{},{}",
            m.epoch,
            m.metric,
            m.learning_rate,
            m.loss,
            opt(m.val_metric),
            opt(m.val_loss),
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: loss={:.4}, val_loss={:?}",
            m.epoch,
            m.loss,
            m.val_loss,
        );
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(epoch: usize, val_loss: Option<f64>) -> EpochMetrics {
        EpochMetrics {
            epoch,
            loss: 0.5,
            metric: 0.5,
            val_loss,
            val_metric: val_loss.map(|v| 1.0 - v),
            learning_rate: 1e-4,
        }
    }

    #[test]
    fn test_is_improvement() {
        let m = metrics(2, Some(2.3));
        assert!(m.is_improvement(3.0));
        assert!(!m.is_improvement(2.0));
        assert!(!metrics(2, None).is_improvement(f64::INFINITY));
        assert!(!metrics(2, Some(f64::NAN)).is_improvement(f64::INFINITY));
        assert!(!metrics(2, Some(f64::INFINITY)).is_improvement(f64::INFINITY));
        assert_eq!(metrics(2, Some(f64::NAN)).monitored().map(f64::is_nan), Some(true));
        assert_eq!(metrics(2, None).monitored(), None);
    }

    #[test]
    fn test_csv_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let csv = tmp.path().join("nested/log.csv");
        let logger = MetricsLogger::new(&csv, "dice_coefficient");
        logger.start().unwrap();
        logger.log(&metrics(0, Some(0.25))).unwrap();
        logger.log(&metrics(1, None)).unwrap();

        let text = fs::read_to_string(&csv).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "epoch,dice_coefficient,learning_rate,loss,val_dice_coefficient,val_loss",
                "0,0.500000,1.000000e-4,0.500000,0.750000,0.250000",
                "1,0.500000,1.000000e-4,0.500000,,",
            ]
        );

        // Starting again truncates the previous run.
        logger.start().unwrap();
        assert_eq!(fs::read_to_string(&csv).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_reduced_learning_rate_is_written_in_scientific_notation() {
        let tmp = tempfile::tempdir().unwrap();
        let csv = tmp.path().join("log.csv");
        let logger = MetricsLogger::new(&csv, "dice_coefficient");
        logger.start().unwrap();
        let mut m = metrics(0, Some(0.25));
        m.learning_rate = 1e-4 * 0.1;
        logger.log(&m).unwrap();

        let text = fs::read_to_string(&csv).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert_eq!(row.split(',').nth(2), Some("1.000000e-5"));
    }
}
