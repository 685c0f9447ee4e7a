// ============================================================
// Layer 3 - Dataset Errors
// ============================================================
// Every failure the data layer can produce. Decode errors are
// fatal for a training run: skipping a file would shift every
// later image/mask pair out of alignment.

use std::path::PathBuf;

use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("directory not found: {path}")]
    MissingDirectory { path: PathBuf },

    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("found {images} images but {masks} masks; every image needs exactly one mask")]
    MisalignedPairs { images: usize, masks: usize },

    #[error("pair {index} does not match: image {image} vs mask {mask}")]
    NameMismatch {
        index: usize,
        image: PathBuf,
        mask:  PathBuf,
    },

    #[error("split fraction must be in (0, 1), got {0}")]
    InvalidSplit(f64),

    #[error("cannot hold out {requested} samples from {available}")]
    SplitTooLarge { requested: usize, available: usize },

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("pipeline producer stopped before sending all batches")]
    PipelineDisconnected,
}

impl DatasetError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DatasetError::Io { path: path.into(), source }
    }
}
