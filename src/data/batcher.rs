// ============================================================
// Layer 4 - Segmentation Batcher
// ============================================================
// Implements Burn's Batcher trait to stack decoded pairs into
// model-ready tensors.
//
//   Input:  Vec of N DecodedPairs, each image [H, W, 3], mask [H, W, 1]
//   Output: SegmentationBatch with images [N, 3, H, W], masks [N, 1, H, W]
//
// The host buffers are HWC, so the flattened data is first shaped
// as [N, H, W, C] and then permuted to channels-first for Conv2d.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::preprocessor::{DecodedImage, DecodedPair};

// ─── SegmentationBatch ────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct SegmentationBatch<B: Backend> {
    /// Scans - shape: [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,

    /// Ground-truth masks - shape: [batch_size, 1, height, width]
    pub masks: Tensor<B, 4>,
}

impl<B: Backend> SegmentationBatch<B> {
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }
}

// ─── SegmentationBatcher ──────────────────────────────────────────────────────
/// Holds the device the batch tensors are created on.
#[derive(Clone, Debug)]
pub struct SegmentationBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> SegmentationBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn stack<'a>(&self, items: impl Iterator<Item = &'a DecodedImage>, count: usize) -> Tensor<B, 4> {
        let mut shape = [count, 0, 0, 0];
        let mut flat  = Vec::new();
        for img in items {
            let [h, w, c] = img.shape();
            shape[1..].copy_from_slice(&[h, w, c]);
            flat.extend_from_slice(&img.pixels);
        }

        Tensor::<B, 4>::from_data(TensorData::new(flat, shape), &self.device)
            .permute([0, 3, 1, 2])
    }
}

impl<B: Backend> Batcher<DecodedPair, SegmentationBatch<B>> for SegmentationBatcher<B> {
    fn batch(&self, items: Vec<DecodedPair>) -> SegmentationBatch<B> {
        let count = items.len();
        let images = self.stack(items.iter().map(|p| &p.image), count);
        let masks  = self.stack(items.iter().map(|p| &p.mask), count);
        SegmentationBatch { images, masks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn pair(h: usize, w: usize, value: f32) -> DecodedPair {
        DecodedPair {
            image: DecodedImage { height: h, width: w, channels: 3, pixels: vec![value; h * w * 3] },
            mask:  DecodedImage { height: h, width: w, channels: 1, pixels: vec![value; h * w] },
        }
    }

    #[test]
    fn test_batch_shapes_are_channels_first() {
        let batcher = SegmentationBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(vec![pair(4, 6, 0.25), pair(4, 6, 0.75)]);

        assert_eq!(batch.images.dims(), [2, 3, 4, 6]);
        assert_eq!(batch.masks.dims(), [2, 1, 4, 6]);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_channel_values_land_in_the_right_plane() {
        // One 1x2 image: pixel (0,0) = (r0,g0,b0), pixel (0,1) = (r1,g1,b1).
        let image = DecodedImage {
            height: 1,
            width: 2,
            channels: 3,
            pixels: vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
        };
        let mask = DecodedImage { height: 1, width: 2, channels: 1, pixels: vec![0.0, 1.0] };
        let batcher = SegmentationBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(vec![DecodedPair { image, mask }]);

        let values: Vec<f32> = batch.images.into_data().to_vec().unwrap();
        // Red plane first, then green, then blue.
        let expected = [0.1, 0.4, 0.2, 0.5, 0.3, 0.6];
        for (v, e) in values.iter().zip(expected) {
            assert!((v - e).abs() < 1e-6);
        }
    }
}
