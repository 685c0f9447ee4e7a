// ============================================================
// Layer 4 - Streaming Batch Pipeline
// ============================================================
// Turns a partition into a lazy, ordered stream of decoded
// mini-batches:
//
//   SegmentationPipeline (samples + batch size + prefetch depth)
//       │  iter()
//       ▼
//   producer thread ── chunks of batch_size, decoded with rayon
//       │  crossbeam bounded(prefetch)
//       ▼
//   BatchStream ── Iterator<Item = DatasetResult<Vec<DecodedPair>>>
//
// The pipeline itself is immutable. Every iter() call spawns a
// fresh producer over the same samples, so each traversal starts
// at the first sample and yields exactly the same batches.
// The bounded channel caps how far decoding runs ahead.

use std::sync::Arc;
use std::thread;

use burn::data::dataset::Dataset;
use crossbeam_channel::{bounded, Receiver};
use rayon::prelude::*;

use crate::data::dataset::SampleDataset;
use crate::data::preprocessor::{DecodedPair, SampleLoader};
use crate::domain::error::{DatasetError, DatasetResult};
use crate::domain::sample::Sample;

pub const DEFAULT_PREFETCH: usize = 10;

type BatchResult = DatasetResult<Vec<DecodedPair>>;

#[derive(Debug, Clone)]
pub struct SegmentationPipeline {
    dataset:    Arc<SampleDataset>,
    batch_size: usize,
    prefetch:   usize,
    loader:     SampleLoader,
}

impl SegmentationPipeline {
    pub fn new(
        samples:    Vec<Sample>,
        batch_size: usize,
        prefetch:   usize,
        loader:     SampleLoader,
    ) -> DatasetResult<Self> {
        if batch_size == 0 {
            return Err(DatasetError::InvalidBatchSize);
        }
        Ok(Self {
            dataset: Arc::new(SampleDataset::new(samples)),
            batch_size,
            prefetch: prefetch.max(1),
            loader,
        })
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// `ceil(len / batch_size)`; the last batch may be short.
    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size)
    }

    /// Start a new traversal from the first sample.
    pub fn iter(&self) -> BatchStream {
        let (tx, rx) = bounded::<BatchResult>(self.prefetch);
        let dataset    = Arc::clone(&self.dataset);
        let batch_size = self.batch_size;
        let loader     = self.loader;

        thread::spawn(move || {
            for chunk in dataset.samples().chunks(batch_size) {
                let decoded: BatchResult = chunk
                    .par_iter()
                    .map(|sample| loader.load(sample))
                    .collect();
                let failed = decoded.is_err();
                // Receiver gone: the consumer stopped early.
                if tx.send(decoded).is_err() || failed {
                    break;
                }
            }
        });

        BatchStream { rx, remaining: self.num_batches(), failed: false }
    }
}

/// One traversal of a `SegmentationPipeline`.
///
/// Yields `Err` at most once, after which the stream ends.
pub struct BatchStream {
    rx:        Receiver<BatchResult>,
    remaining: usize,
    failed:    bool,
}

impl Iterator for BatchStream {
    type Item = BatchResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.failed {
            return None;
        }
        let item = match self.rx.recv() {
            Ok(item) => item,
            Err(_)   => Err(DatasetError::PipelineDisconnected),
        };
        self.remaining -= 1;
        self.failed = item.is_err();
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
