// ============================================================
// Layer 4 - Filesystem Enumerator
// ============================================================
// Lists the image and mask files of a dataset laid out as:
//
//   <root>/
//     images/  scan_0001.png  scan_0002.png ...
//     masks/   scan_0001.png  scan_0002.png ...
//
// Both listings are sorted independently; the n-th image is
// paired with the n-th mask. pair_samples() checks that this
// positional pairing is plausible before anything is trained.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::error::{DatasetError, DatasetResult};
use crate::domain::sample::Sample;
use crate::domain::traits::SampleSource;

pub const IMAGES_SUBDIR: &str = "images";
pub const MASKS_SUBDIR: &str = "masks";

/// Enumerates `<root>/images/*.<ext>` and `<root>/masks/*.<ext>`.
#[derive(Debug, Clone)]
pub struct ImageMaskEnumerator {
    root:      PathBuf,
    extension: String,
}

impl ImageMaskEnumerator {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        let extension = extension.trim_start_matches('.').to_string();
        Self { root: root.into(), extension }
    }
}

impl SampleSource for ImageMaskEnumerator {
    fn enumerate(&self) -> DatasetResult<(Vec<PathBuf>, Vec<PathBuf>)> {
        if !self.root.is_dir() {
            return Err(DatasetError::MissingDirectory { path: self.root.clone() });
        }

        let images = list_sorted(&self.root.join(IMAGES_SUBDIR), &self.extension)?;
        let masks  = list_sorted(&self.root.join(MASKS_SUBDIR), &self.extension)?;

        tracing::debug!(
            "Enumerated {} images and {} masks under '{}'",
            images.len(),
            masks.len(),
            self.root.display()
        );
        Ok((images, masks))
    }
}

/// Every regular file in `dir` whose extension is exactly `ext`, sorted.
fn list_sorted(dir: &Path, ext: &str) -> DatasetResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DatasetError::MissingDirectory { path: dir.to_path_buf() });
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| DatasetError::io(dir, e))? {
        let entry = entry.map_err(|e| DatasetError::io(dir, e))?;
        let path  = entry.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ext) {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}

/// Zip the two sorted listings into samples.
///
/// Fails with `MisalignedPairs` when the counts differ. With `strict`,
/// the file stems at every index must also match (`NameMismatch`).
pub fn pair_samples(
    images: Vec<PathBuf>,
    masks:  Vec<PathBuf>,
    strict: bool,
) -> DatasetResult<Vec<Sample>> {
    if images.len() != masks.len() {
        return Err(DatasetError::MisalignedPairs {
            images: images.len(),
            masks:  masks.len(),
        });
    }

    images
        .into_iter()
        .zip(masks)
        .enumerate()
        .map(|(index, (image, mask))| {
            if strict && image.file_stem() != mask.file_stem() {
                return Err(DatasetError::NameMismatch { index, image, mask });
            }
            Ok(Sample::new(image, mask))
        })
        .collect()
}
