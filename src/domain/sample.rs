// ============================================================
// Layer 3 - Sample and Split Types
// ============================================================
// A Sample is one MRI scan: the image file and its tumor mask.
// There is no explicit join key between the two files; they are
// paired by position after both directory listings are sorted.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One image/mask pair on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub image: PathBuf,
    pub mask:  PathBuf,
}

impl Sample {
    pub fn new(image: impl Into<PathBuf>, mask: impl Into<PathBuf>) -> Self {
        Self { image: image.into(), mask: mask.into() }
    }
}

/// The three disjoint partitions of an enumerated dataset.
///
/// `valid` and `test` always have the same length; `train` takes
/// whatever remains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetSplits {
    pub train: Vec<Sample>,
    pub valid: Vec<Sample>,
    pub test:  Vec<Sample>,
}

impl DatasetSplits {
    /// Total number of samples across all partitions.
    pub fn total(&self) -> usize {
        self.train.len() + self.valid.len() + self.test.len()
    }
}
