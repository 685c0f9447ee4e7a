// ============================================================
// Layer 4 - Sample Loader
// ============================================================
// Decodes one image/mask pair into host-side float buffers:
//
//   read_image  ->  [H, W, 3]  RGB, bilinear resize, scaled to [0, 1]
//   read_mask   ->  [H, W, 1]  grayscale, bilinear resize, scaled to [0, 1]
//
// Buffers are row-major HWC. The batcher later stacks them into
// NCHW tensors for the model. Both functions are pure and are
// called concurrently from the pipeline's rayon workers.

use std::path::Path;

use image::{imageops::FilterType, DynamicImage};

use crate::domain::error::{DatasetError, DatasetResult};
use crate::domain::sample::Sample;

/// A decoded image as `f32` values in `[0, 1]`, laid out `[height, width, channels]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub height:   usize,
    pub width:    usize,
    pub channels: usize,
    pub pixels:   Vec<f32>,
}

impl DecodedImage {
    pub fn shape(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }
}

/// One decoded sample: the scan and its mask.
#[derive(Debug, Clone)]
pub struct DecodedPair {
    pub image: DecodedImage,
    pub mask:  DecodedImage,
}

fn open(path: &Path) -> DatasetResult<DynamicImage> {
    image::open(path).map_err(|source| match source {
        image::ImageError::IoError(e) => DatasetError::io(path, e),
        source => DatasetError::Image { path: path.to_path_buf(), source },
    })
}

/// Decode `path` as 3-channel color, resize to `height x width`, scale to `[0, 1]`.
pub fn read_image(path: &Path, height: u32, width: u32) -> DatasetResult<DecodedImage> {
    let rgb = open(path)?.to_rgb8();
    let resized = image::imageops::resize(&rgb, width, height, FilterType::Triangle);

    Ok(DecodedImage {
        height:   height as usize,
        width:    width as usize,
        channels: 3,
        pixels:   resized.into_raw().into_iter().map(|v| v as f32 / 255.0).collect(),
    })
}

/// Decode `path` as grayscale, resize to `height x width`, scale to `[0, 1]`,
/// with a trailing channel dimension of 1.
pub fn read_mask(path: &Path, height: u32, width: u32) -> DatasetResult<DecodedImage> {
    let gray = open(path)?.to_luma8();
    let resized = image::imageops::resize(&gray, width, height, FilterType::Triangle);

    Ok(DecodedImage {
        height:   height as usize,
        width:    width as usize,
        channels: 1,
        pixels:   resized.into_raw().into_iter().map(|v| v as f32 / 255.0).collect(),
    })
}

/// Loads both halves of a `Sample` at a fixed resolution.
#[derive(Debug, Clone, Copy)]
pub struct SampleLoader {
    pub height: u32,
    pub width:  u32,
}

impl SampleLoader {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    pub fn load(&self, sample: &Sample) -> DatasetResult<DecodedPair> {
        let image = read_image(&sample.image, self.height, self.width)?;
        let mask  = read_mask(&sample.mask, self.height, self.width)?;
        Ok(DecodedPair { image, mask })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_rgb(path: &Path, w: u32, h: u32) {
        let img = image::RgbImage::from_fn(w, h, |x, y| {
            image::Rgb([(x * 255 / w.max(1)) as u8, (y * 255 / h.max(1)) as u8, 255])
        });
        img.save(path).unwrap();
    }

    fn write_gray(path: &Path, w: u32, h: u32) {
        let img = image::GrayImage::from_fn(w, h, |x, _| image::Luma([if x < w / 2 { 0 } else { 255 }]));
        img.save(path).unwrap();
    }

    fn in_unit_range(img: &DecodedImage) -> bool {
        img.pixels.iter().all(|v| (0.0..=1.0).contains(v))
    }

    #[test]
    fn test_read_image_shape_and_range() {
        let tmp  = tempfile::tempdir().unwrap();
        let path = tmp.path().join("scan.png");
        write_rgb(&path, 37, 23);

        let img = read_image(&path, 16, 24).unwrap();
        assert_eq!(img.shape(), [16, 24, 3]);
        assert_eq!(img.pixels.len(), 16 * 24 * 3);
        assert!(in_unit_range(&img));
        // Blue channel is saturated everywhere.
        assert!((img.pixels[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_read_image_expands_grayscale_to_three_channels() {
        let tmp  = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gray.png");
        write_gray(&path, 8, 8);

        let img = read_image(&path, 8, 8).unwrap();
        assert_eq!(img.shape(), [8, 8, 3]);
        assert_eq!(img.pixels[0], img.pixels[1]);
        assert_eq!(img.pixels[1], img.pixels[2]);
    }

    #[test]
    fn test_read_mask_shape_and_range() {
        let tmp  = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mask.png");
        write_gray(&path, 64, 40);

        let mask = read_mask(&path, 32, 32).unwrap();
        assert_eq!(mask.shape(), [32, 32, 1]);
        assert!(in_unit_range(&mask));
        assert_eq!(mask.pixels[0], 0.0);
        assert_eq!(mask.pixels[31], 1.0);
    }

    #[test]
    fn test_read_mask_from_color_file() {
        let tmp  = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mask.png");
        write_rgb(&path, 10, 10);

        let mask = read_mask(&path, 5, 5).unwrap();
        assert_eq!(mask.shape(), [5, 5, 1]);
        assert!(in_unit_range(&mask));
    }

    #[test]
    fn test_corrupt_and_missing_files_fail() {
        let tmp     = tempfile::tempdir().unwrap();
        let corrupt = tmp.path().join("corrupt.png");
        fs::write(&corrupt, b"definitely not a png").unwrap();

        assert!(matches!(read_image(&corrupt, 8, 8), Err(DatasetError::Image { .. })));
        assert!(matches!(
            read_mask(&tmp.path().join("missing.png"), 8, 8),
            Err(DatasetError::Io { .. })
        ));
    }

    #[test]
    fn test_sample_loader_loads_both_halves() {
        let tmp   = tempfile::tempdir().unwrap();
        let image = tmp.path().join("a_image.png");
        let mask  = tmp.path().join("a_mask.png");
        write_rgb(&image, 12, 12);
        write_gray(&mask, 12, 12);

        let pair = SampleLoader::new(4, 6).load(&Sample::new(&image, &mask)).unwrap();
        assert_eq!(pair.image.shape(), [4, 6, 3]);
        assert_eq!(pair.mask.shape(), [4, 6, 1]);
    }
}
