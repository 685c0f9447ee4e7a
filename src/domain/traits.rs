// ============================================================
// Layer 3 - Core Traits
// ============================================================
// The application layer talks to the dataset on disk through
// SampleSource, so a different layout (e.g. a manifest file)
// only needs a new implementation.

use std::path::PathBuf;

use crate::domain::error::DatasetResult;

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// Anything that can list the image files and mask files of a dataset.
///
/// Implementations:
///   - ImageMaskEnumerator -> `<root>/images` and `<root>/masks`
pub trait SampleSource {
    /// Return `(images, masks)`, each sorted lexicographically.
    /// No pairing check happens here.
    fn enumerate(&self) -> DatasetResult<(Vec<PathBuf>, Vec<PathBuf>)>;
}
