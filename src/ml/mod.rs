// ============================================================
// Layer 5 - ML / Model Layer (Burn)
// ============================================================
// All tensor code lives here: the segmentation network, the
// Dice objective, the epoch callbacks and the fit loop.
//
//   model.rs      U-Net behind the SegmentationModel trait
//
//   dice.rs       Dice coefficient and Dice loss behind the
//                 SegmentationObjective trait
//
//   callbacks.rs  ModelCheckpoint, CsvLogger, ReduceLrOnPlateau,
//                 EarlyStopping; each returns a CallbackAction
//
//   trainer.rs    fit() / evaluate() and backend dispatch
//                 (Autodiff<Wgpu> or Autodiff<NdArray>)

/// U-Net segmentation network
pub mod model;

/// Dice loss and coefficient
pub mod dice;

/// Per-epoch monitors driven by the fit loop
pub mod callbacks;

/// Training loop with validation, callbacks and evaluation
pub mod trainer;
