// ============================================================
// Layer 4 - Sample Dataset
// ============================================================
// One partition's pairs behind burn's `Dataset` trait. The pipeline
// sizes itself through `Dataset::len` and chunks `samples()` in
// order on its own producer thread. burn's `DataLoaderBuilder` is
// not used: its worker channel is unbounded, and lookahead here
// must stop at `prefetch` batches.

use burn::data::dataset::Dataset;

use crate::domain::sample::Sample;

/// One partition's image/mask pairs, in the order they will be batched.
#[derive(Debug, Clone, Default)]
pub struct SampleDataset {
    samples: Vec<Sample>,
}

impl SampleDataset {
    pub fn new(samples: Vec<Sample>) -> Self { Self { samples } }

    pub fn samples(&self) -> &[Sample] { &self.samples }
}

impl Dataset<Sample> for SampleDataset {
    fn get(&self, index: usize) -> Option<Sample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_indexing() {
        let ds = SampleDataset::new(vec![Sample::new("i/a.png", "m/a.png")]);
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.get(0).unwrap().mask, std::path::PathBuf::from("m/a.png"));
        assert!(ds.get(1).is_none());
        assert!(SampleDataset::default().is_empty());
    }
}
