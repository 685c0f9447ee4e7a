// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// Artifacts a run leaves on disk:
//
//   checkpoint.rs - the output directory: best weights through
//                   Burn's CompactRecorder, and the TrainConfig
//                   as JSON so `evaluate` can rebuild the model.
//
//   metrics.rs    - EpochMetrics and the per-epoch CSV log.

/// Model weights and run config persistence
pub mod checkpoint;

/// Epoch metrics and CSV logger
pub mod metrics;
