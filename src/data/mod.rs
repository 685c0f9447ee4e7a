// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// Everything from the dataset directory on disk to tensor
// batches:
//
//   <root>/images, <root>/masks
//       │
//       ▼
//   ImageMaskEnumerator   -> two sorted path listings
//       │
//       ▼
//   pair_samples          -> Vec<Sample>, length/name checked
//       │
//       ▼
//   partition_samples     -> train / validation / test
//       │
//       ▼
//   SegmentationPipeline  -> prefetched batches of decoded pairs
//       │
//       ▼
//   SegmentationBatcher   -> image [N,3,H,W] and mask [N,1,H,W] tensors

/// Lists image and mask files and pairs them by position
pub mod enumerator;

/// Seeded train/validation/test partitioning
pub mod splitter;

/// Decodes, resizes and normalises images and masks
pub mod preprocessor;

/// Implements Burn's Dataset trait for image/mask pairs
pub mod dataset;

/// Bounded, restartable, prefetching batch stream
pub mod pipeline;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
