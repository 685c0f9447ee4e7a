// ============================================================
// Layer 5 - Dice Loss and Metric
// ============================================================
// Overlap between a predicted probability mask P and the ground
// truth mask T, computed over the whole batch:
//
//   dice(T, P) = (2 * sum(T * P) + smooth) / (sum(T) + sum(P) + smooth)
//   loss       = 1 - dice
//
// The trainer reaches these through SegmentationObjective so a
// different loss/metric pair can be plugged in.

use burn::prelude::*;

pub const DEFAULT_SMOOTH: f64 = 1e-15;

/// Loss and accuracy-style metric used to compile a training run.
pub trait SegmentationObjective {
    /// Column name of the metric in the epoch log.
    fn metric_name(&self) -> &'static str;

    fn loss<B: Backend>(&self, y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 1>;

    fn metric<B: Backend>(&self, y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 1>;
}

#[derive(Debug, Clone, Copy)]
pub struct DiceObjective {
    pub smooth: f64,
}

impl Default for DiceObjective {
    fn default() -> Self {
        Self { smooth: DEFAULT_SMOOTH }
    }
}

impl SegmentationObjective for DiceObjective {
    fn metric_name(&self) -> &'static str {
        "dice_coefficient"
    }

    fn loss<B: Backend>(&self, y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 1> {
        dice_loss(y_true, y_pred, self.smooth)
    }

    fn metric<B: Backend>(&self, y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>) -> Tensor<B, 1> {
        dice_coefficient(y_true, y_pred, self.smooth)
    }
}

pub fn dice_coefficient<B: Backend>(
    y_true: Tensor<B, 4>,
    y_pred: Tensor<B, 4>,
    smooth: f64,
) -> Tensor<B, 1> {
    let y_true = y_true.flatten::<1>(0, 3);
    let y_pred = y_pred.flatten::<1>(0, 3);

    let intersection = (y_true.clone() * y_pred.clone()).sum();
    (intersection * 2.0 + smooth) / (y_true.sum() + y_pred.sum() + smooth)
}

pub fn dice_loss<B: Backend>(y_true: Tensor<B, 4>, y_pred: Tensor<B, 4>, smooth: f64) -> Tensor<B, 1> {
    dice_coefficient(y_true, y_pred, smooth).neg() + 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn mask(values: [f32; 4]) -> Tensor<TestBackend, 4> {
        Tensor::<TestBackend, 1>::from_floats(values, &Default::default()).reshape([1, 1, 2, 2])
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    #[test]
    fn test_perfect_overlap() {
        let t = mask([1.0, 0.0, 1.0, 0.0]);
        let dice = DiceObjective::default();
        assert!((scalar(dice.metric(t.clone(), t.clone())) - 1.0).abs() < 1e-6);
        assert!(scalar(dice.loss(t.clone(), t)).abs() < 1e-6);
    }

    #[test]
    fn test_disjoint_masks() {
        let t = mask([1.0, 1.0, 0.0, 0.0]);
        let p = mask([0.0, 0.0, 1.0, 1.0]);
        assert!(scalar(dice_coefficient(t.clone(), p.clone(), DEFAULT_SMOOTH)).abs() < 1e-6);
        assert!((scalar(dice_loss(t, p, DEFAULT_SMOOTH)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_half_overlap() {
        // 2 * 1 / (2 + 2) = 0.5
        let t = mask([1.0, 1.0, 0.0, 0.0]);
        let p = mask([1.0, 0.0, 1.0, 0.0]);
        assert!((scalar(dice_coefficient(t, p, DEFAULT_SMOOTH)) - 0.5).abs() < 1e-6);
    }
}
