// ============================================================
// Layer 4 - Train/Validation/Test Partitioner
// ============================================================
// Splits the enumerated pairs into three disjoint partitions:
//
//   k = floor(n * split)
//   validation = k samples held out of the full set
//   test       = k samples held out of what remains
//   train      = the rest
//
// Each hold-out permutes the indices 0..n with a StdRng seeded
// from the caller's seed (Fisher-Yates via SliceRandom) and takes
// the first k. The permutation depends only on (n, seed), so the
// image list and the mask list can be split by separate calls
// and still line up index for index.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::error::{DatasetError, DatasetResult};
use crate::domain::sample::{DatasetSplits, Sample};

/// Number of samples held out for each of validation and test.
pub fn split_count(total: usize, split: f64) -> DatasetResult<usize> {
    if !(split > 0.0 && split < 1.0) {
        return Err(DatasetError::InvalidSplit(split));
    }
    Ok(((total as f64) * split).floor() as usize)
}

/// Remove `count` items chosen by `seed`.
///
/// Returns `(remaining, held_out)`. Both keep the permutation order,
/// so two lists of equal length split with the same seed stay aligned.
pub fn hold_out<T>(items: Vec<T>, count: usize, seed: u64) -> DatasetResult<(Vec<T>, Vec<T>)> {
    let total = items.len();
    if count > total {
        return Err(DatasetError::SplitTooLarge { requested: count, available: total });
    }

    let mut order: Vec<usize> = (0..total).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut take = |idx: usize| slots[idx].take();

    let held_out:  Vec<T> = order[..count].iter().filter_map(|&i| take(i)).collect();
    let remaining: Vec<T> = order[count..].iter().filter_map(|&i| take(i)).collect();

    Ok((remaining, held_out))
}

/// Partition parallel image and mask lists into train/validation/test.
///
/// The two lists are split independently with the same seed; the
/// returned samples pair `images[i]` with `masks[i]` of each partition.
pub fn partition<T>(
    images: Vec<T>,
    masks:  Vec<T>,
    split:  f64,
    seed:   u64,
) -> DatasetResult<(Vec<(T, T)>, Vec<(T, T)>, Vec<(T, T)>)> {
    if images.len() != masks.len() {
        return Err(DatasetError::MisalignedPairs { images: images.len(), masks: masks.len() });
    }
    let k = split_count(images.len(), split)?;

    let (train_x, valid_x) = hold_out(images, k, seed)?;
    let (train_y, valid_y) = hold_out(masks, k, seed)?;

    let (train_x, test_x) = hold_out(train_x, k, seed)?;
    let (train_y, test_y) = hold_out(train_y, k, seed)?;

    let zip = |x: Vec<T>, y: Vec<T>| x.into_iter().zip(y).collect::<Vec<_>>();
    Ok((zip(train_x, train_y), zip(valid_x, valid_y), zip(test_x, test_y)))
}

/// Partition already-paired samples.
pub fn partition_samples(
    samples: Vec<Sample>,
    split:   f64,
    seed:    u64,
) -> DatasetResult<DatasetSplits> {
    let (images, masks): (Vec<_>, Vec<_>) =
        samples.into_iter().map(|s| (s.image, s.mask)).unzip();

    let (train, valid, test) = partition(images, masks, split, seed)?;
    let to_samples = |pairs: Vec<_>| {
        pairs
            .into_iter()
            .map(|(image, mask)| Sample::new(image, mask))
            .collect::<Vec<_>>()
    };

    let splits = DatasetSplits {
        train: to_samples(train),
        valid: to_samples(valid),
        test:  to_samples(test),
    };

    tracing::debug!(
        "Dataset split: {} train, {} validation, {} test (split={}, seed={})",
        splits.train.len(),
        splits.valid.len(),
        splits.test.len(),
        split,
        seed,
    );
    if splits.valid.is_empty() {
        tracing::warn!(
            "Split fraction {} leaves no validation or test samples; \
             checkpointing, LR decay and early stopping will be inactive",
            split
        );
    }

    Ok(splits)
}
