// ============================================================
// Layer 5 - Segmentation Model
// ============================================================
// The trainer only knows SegmentationModel: something that maps
// an image batch [N, 3, H, W] to per-pixel tumor probabilities
// [N, 1, H, W]. UNet is the architecture the CLI builds.
//
// UNet layout for depth = 4, base_filters = f:
//
//   encoder  f -> 2f -> 4f -> 8f      (conv block, then 2x2 max pool)
//   bridge   16f
//   decoder  8f -> 4f -> 2f -> f      (2x2 transposed conv, concat skip, conv block)
//   head     1x1 conv -> sigmoid
//
// Height and width must be divisible by 2^depth.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{relu, sigmoid},
};

/// Any module that predicts a probability mask for a batch of images.
pub trait SegmentationModel<B: Backend>: Module<B> {
    /// `images`: [batch, channels, height, width] -> [batch, 1, height, width] in (0, 1)
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4>;
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct UNetConfig {
    pub in_channels: usize,
    #[config(default = 64)]
    pub base_filters: usize,
    #[config(default = 4)]
    pub depth: usize,
}

impl UNetConfig {
    /// Architecture factory: build a config from an `[height, width, channels]` input shape.
    pub fn from_input_shape(shape: [usize; 3]) -> Self {
        Self::new(shape[2])
    }

    /// Filters at encoder level `level` (0 = full resolution).
    pub fn filters(&self, level: usize) -> usize {
        self.base_filters << level
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> UNet<B> {
        let encoders = (0..self.depth)
            .map(|level| {
                let in_ch = if level == 0 { self.in_channels } else { self.filters(level - 1) };
                ConvBlock::new(in_ch, self.filters(level), device)
            })
            .collect();

        let bridge_in = if self.depth == 0 { self.in_channels } else { self.filters(self.depth - 1) };
        let bridge = ConvBlock::new(bridge_in, self.filters(self.depth), device);

        // Deepest level first, matching the order the decoder runs in.
        let upsamplers = (0..self.depth)
            .rev()
            .map(|level| {
                ConvTranspose2dConfig::new([self.filters(level + 1), self.filters(level)], [2, 2])
                    .with_stride([2, 2])
                    .init(device)
            })
            .collect();
        let decoders = (0..self.depth)
            .rev()
            .map(|level| ConvBlock::new(self.filters(level) * 2, self.filters(level), device))
            .collect();

        let head = Conv2dConfig::new([self.filters(0), 1], [1, 1]).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        UNet { encoders, pool, bridge, upsamplers, decoders, head }
    }
}

/// Two 3x3 same-padded convolutions, each followed by batch norm and ReLU.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv1: Conv2d<B>,
    norm1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBlock<B> {
    fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = |i, o| {
            Conv2dConfig::new([i, o], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device)
        };
        Self {
            conv1: conv(in_channels, out_channels),
            norm1: BatchNormConfig::new(out_channels).init(device),
            conv2: conv(out_channels, out_channels),
            norm2: BatchNormConfig::new(out_channels).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.norm1.forward(self.conv1.forward(x)));
        relu(self.norm2.forward(self.conv2.forward(x)))
    }
}

#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    encoders:   Vec<ConvBlock<B>>,
    pool:       MaxPool2d,
    bridge:     ConvBlock<B>,
    upsamplers: Vec<ConvTranspose2d<B>>,
    decoders:   Vec<ConvBlock<B>>,
    head:       Conv2d<B>,
}

impl<B: Backend> SegmentationModel<B> for UNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut skips = Vec::with_capacity(self.encoders.len());
        let mut x = images;

        for block in &self.encoders {
            let features = block.forward(x);
            x = self.pool.forward(features.clone());
            skips.push(features);
        }

        x = self.bridge.forward(x);

        let stages = self.upsamplers.iter().zip(&self.decoders).zip(skips.into_iter().rev());
        for ((up, block), skip) in stages {
            let upsampled = up.forward(x);
            x = block.forward(Tensor::cat(vec![upsampled, skip], 1));
        }

        sigmoid(self.head.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_output_shape_matches_input_resolution() {
        let device = Default::default();
        let model: UNet<TestBackend> = UNetConfig::from_input_shape([16, 16, 3])
            .with_base_filters(2)
            .with_depth(2)
            .init(&device);

        let images = Tensor::<TestBackend, 4>::random(
            [2, 3, 16, 16],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let out = model.forward(images);
        assert_eq!(out.dims(), [2, 1, 16, 16]);

        let values: Vec<f32> = out.into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_factory_uses_input_channels() {
        let cfg = UNetConfig::from_input_shape([256, 256, 3]);
        assert_eq!(cfg.in_channels, 3);
        assert_eq!(cfg.base_filters, 64);
        assert_eq!(cfg.filters(3), 512);
    }
}
