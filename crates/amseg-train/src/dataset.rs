//! Sample provider for grouped image/mask datasets.
//!
//! [`SegmentationDataset`] holds the rows of a [`DatasetIndex`] and decodes
//! them lazily: every access reads the image and mask from disk, runs the
//! configured transform and encodes the pair as channel-first tensor data.
//! Nothing is cached. Following burn's convention the dataset returns raw
//! [`TensorData`] and [`SegmentationBatcher`] moves it onto a device.

use std::{
    fmt,
    marker::PhantomData,
    ops::Add,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use amseg_util::ImageUtils;
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{backend::Backend, Tensor, TensorData},
};
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    augmentation::{AugmentedSample, ImageAugmentor, Sample, SampleTransform, TransformPreset},
    error::{DatasetError, DatasetResult},
    index::{DatasetIndex, IndexEntry},
};

/// Seed used when none is given.
pub const DEFAULT_SEED: u64 = 0;

/// A materialized sample.
///
/// `image` has shape `[3, H, W]` and `mask` has shape `[1, H, W]`, both `f32`.
#[derive(Debug, Clone)]
pub struct SegmentationItem {
    pub image: TensorData,
    pub mask: TensorData,
}

impl From<AugmentedSample> for SegmentationItem {
    fn from(sample: AugmentedSample) -> Self {
        Self {
            image: ImageUtils::image_to_tensor_data(&sample.image),
            mask: ImageUtils::mask_to_tensor_data(&sample.mask),
        }
    }
}

/// A batch of samples on a device.
#[derive(Debug, Clone)]
pub struct SegmentationBatch<B: Backend> {
    /// `[B, 3, H, W]`
    pub images: Tensor<B, 4>,
    /// `[B, 1, H, W]`
    pub masks: Tensor<B, 4>,
}

/// Batcher stacking [`SegmentationItem`]s into a [`SegmentationBatch`].
///
/// All items of a batch must share the same spatial size.
#[derive(Clone, Default)]
pub struct SegmentationBatcher<B: Backend> {
    _phantom: PhantomData<B>,
}

impl<B: Backend> SegmentationBatcher<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, SegmentationItem, SegmentationBatch<B>> for SegmentationBatcher<B> {
    fn batch(&self, items: Vec<SegmentationItem>, device: &B::Device) -> SegmentationBatch<B> {
        let (images, masks): (Vec<_>, Vec<_>) = items
            .into_iter()
            .map(|item| {
                (
                    Tensor::<B, 3>::from_data(item.image, device),
                    Tensor::<B, 3>::from_data(item.mask, device),
                )
            })
            .unzip();

        SegmentationBatch {
            images: Tensor::stack(images, 0),
            masks: Tensor::stack(masks, 0),
        }
    }
}

/// One row of the provider: an image, its mask and their group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleEntry {
    pub group: String,
    pub image_path: PathBuf,
    pub mask_path: PathBuf,
}

/// Random-access provider of image/mask tensor pairs.
pub struct SegmentationDataset {
    entries: Vec<SampleEntry>,
    transform: Option<Arc<dyn SampleTransform>>,
    seed: u64,
    draws: AtomicU64,
}

impl SegmentationDataset {
    /// Build a provider from an image table and a mask table.
    ///
    /// Row `i` of `images` is paired with row `i` of `masks`; the group of a
    /// row is taken from the image table. Tables of different lengths are
    /// rejected.
    pub fn new(
        images: Vec<IndexEntry>,
        masks: Vec<IndexEntry>,
        transform: Option<Arc<dyn SampleTransform>>,
    ) -> DatasetResult<Self> {
        if images.len() != masks.len() {
            return Err(DatasetError::LengthMismatch {
                images: images.len(),
                masks: masks.len(),
            });
        }

        let entries = images
            .into_iter()
            .zip(masks)
            .map(|(image, mask)| SampleEntry {
                group: image.group,
                image_path: image.path,
                mask_path: mask.path,
            })
            .collect();

        Ok(Self::from_entries(entries, transform, DEFAULT_SEED))
    }

    pub fn from_index(
        index: DatasetIndex,
        transform: Option<Arc<dyn SampleTransform>>,
    ) -> DatasetResult<Self> {
        let (images, masks) = index.into_tables();
        Self::new(images, masks, transform)
    }

    fn from_entries(
        entries: Vec<SampleEntry>,
        transform: Option<Arc<dyn SampleTransform>>,
        seed: u64,
    ) -> Self {
        Self {
            entries,
            transform,
            seed,
            draws: AtomicU64::new(0),
        }
    }

    /// Seed for the generators [`Dataset::get`] and [`SegmentationDataset::try_get`] use.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.draws = AtomicU64::new(0);
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SampleEntry] {
        &self.entries
    }

    pub fn transform(&self) -> Option<&Arc<dyn SampleTransform>> {
        self.transform.as_ref()
    }

    /// Image rows as index entries.
    pub fn image_entries(&self) -> Vec<IndexEntry> {
        self.entries
            .iter()
            .map(|e| IndexEntry::new(e.group.clone(), e.image_path.clone()))
            .collect()
    }

    /// Mask rows as index entries.
    pub fn mask_entries(&self) -> Vec<IndexEntry> {
        self.entries
            .iter()
            .map(|e| IndexEntry::new(e.group.clone(), e.mask_path.clone()))
            .collect()
    }

    /// Decode row `index` without transforming it.
    ///
    /// A missing mask file yields an all-zero mask of the image's size. A mask
    /// that exists but does not match the image's size is an error.
    pub fn read_sample(&self, index: usize) -> DatasetResult<Sample> {
        let entry = self.entries.get(index).ok_or(DatasetError::IndexOutOfRange {
            index,
            len: self.len(),
        })?;

        let image = ImageUtils::open_rgb8(&entry.image_path)
            .map_err(|source| decode_failed(&entry.image_path, source))?;
        let (width, height) = image.dimensions();

        let mask = if entry.mask_path.exists() {
            let mask = ImageUtils::open_first_channel(&entry.mask_path)
                .map_err(|source| decode_failed(&entry.mask_path, source))?;
            if mask.dimensions() != (width, height) {
                return Err(DatasetError::DimensionMismatch {
                    path: entry.mask_path.clone(),
                    image_width: width,
                    image_height: height,
                    mask_width: mask.width(),
                    mask_height: mask.height(),
                });
            }
            mask
        } else {
            tracing::trace!(path = %entry.mask_path.display(), "mask missing, using zero mask");
            ImageUtils::zero_mask(width, height)
        };

        Ok(Sample { image, mask })
    }

    /// Retrieve row `index`, drawing the transform's randomness from `rng`.
    pub fn get_with_rng(&self, index: usize, rng: &mut StdRng) -> DatasetResult<SegmentationItem> {
        let sample = self.read_sample(index)?;

        let augmented = match &self.transform {
            Some(transform) => transform.apply(sample, rng),
            None => AugmentedSample::from_raw(sample),
        };

        Ok(augmented.into())
    }

    /// Retrieve row `index` with a generator derived from the dataset seed.
    pub fn try_get(&self, index: usize) -> DatasetResult<SegmentationItem> {
        let mut rng = self.next_rng(index);
        self.get_with_rng(index, &mut rng)
    }

    /// Generator for one access. Depends on the seed, the index and how many
    /// accesses came before, so a fixed call sequence is reproducible.
    fn next_rng(&self, index: usize) -> StdRng {
        let draw = self.draws.fetch_add(1, Ordering::Relaxed);
        let index = (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        StdRng::seed_from_u64(self.seed ^ index ^ draw.rotate_left(32))
    }

    /// Rows of `self` followed by the rows of `other`.
    ///
    /// The result keeps the transform and seed of `self`; those of `other`
    /// are dropped.
    pub fn combine(&self, other: &Self) -> Self {
        let entries = [self.entries.as_slice(), other.entries.as_slice()].concat();
        Self::from_entries(entries, self.transform.clone(), self.seed)
    }
}

fn decode_failed(path: &Path, source: amseg_util::ImageError) -> DatasetError {
    DatasetError::ImageOpenFailed {
        path: path.to_path_buf(),
        source,
    }
}

impl Clone for SegmentationDataset {
    fn clone(&self) -> Self {
        Self::from_entries(self.entries.clone(), self.transform.clone(), self.seed)
    }
}

impl fmt::Debug for SegmentationDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentationDataset")
            .field("len", &self.entries.len())
            .field("transform", &self.transform.is_some())
            .field("seed", &self.seed)
            .finish()
    }
}

impl Add for SegmentationDataset {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.combine(&other)
    }
}

impl Dataset<SegmentationItem> for SegmentationDataset {
    fn get(&self, index: usize) -> Option<SegmentationItem> {
        match self.try_get(index) {
            Ok(item) => Some(item),
            Err(DatasetError::IndexOutOfRange { .. }) => None,
            // `None` ends burn's iterators, so only out-of-range maps to it
            Err(err) => {
                tracing::error!(index, error = %err, "failed to load sample");
                panic!("failed to load sample {index}: {err}");
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Index `root`, keep the listed `groups` (all when empty), replicate or
/// truncate to `size` rows and wrap the result with the `preset` transform.
pub fn load_dataset<P, S>(
    root: P,
    preset: TransformPreset,
    groups: &[S],
    size: Option<usize>,
    seed: u64,
) -> DatasetResult<SegmentationDataset>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let transform: Arc<dyn SampleTransform> = Arc::new(ImageAugmentor::from_preset(preset, 1.0));
    load_dataset_with_transform(root, Some(transform), groups, size, seed)
}

/// [`load_dataset`] with an arbitrary transform.
pub fn load_dataset_with_transform<P, S>(
    root: P,
    transform: Option<Arc<dyn SampleTransform>>,
    groups: &[S],
    size: Option<usize>,
    seed: u64,
) -> DatasetResult<SegmentationDataset>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let index = DatasetIndex::build(root)?.filter_groups(groups);
    let index = match size {
        Some(size) => index.resize_to(size)?,
        None => index,
    };

    tracing::info!(rows = index.len(), seed, "assembled dataset");
    Ok(SegmentationDataset::from_index(index, transform)?.with_seed(seed))
}

#[cfg(test)]
mod tests {
    use burn::data::dataloader::batcher::Batcher;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    use super::*;
    use crate::tests::TestBackend;

    fn write_rgb(path: &Path, width: u32, height: u32) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 255]))
            .save(path)
            .unwrap();
    }

    fn write_mask(path: &Path, width: u32, height: u32) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        GrayImage::from_fn(width, height, |x, _| Luma([if x % 2 == 0 { 255 } else { 0 }]))
            .save(path)
            .unwrap();
    }

    fn entry(group: &str, path: PathBuf) -> IndexEntry {
        IndexEntry::new(group, path)
    }

    #[test]
    fn new_rejects_uneven_tables() {
        let images = vec![entry("g", "a.png".into()), entry("g", "b.png".into())];
        let masks = vec![entry("g", "a.png".into())];

        assert!(matches!(
            SegmentationDataset::new(images, masks, None).unwrap_err(),
            DatasetError::LengthMismatch { images: 2, masks: 1 }
        ));
    }

    #[test]
    fn out_of_range_index_returns_error() {
        let dataset = SegmentationDataset::new(Vec::new(), Vec::new(), None).unwrap();

        assert!(matches!(
            dataset.try_get(0).unwrap_err(),
            DatasetError::IndexOutOfRange { index: 0, len: 0 }
        ));
        assert!(dataset.get(0).is_none());
    }

    #[test]
    fn missing_mask_becomes_zero_mask() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("source/a.png");
        write_rgb(&image, 5, 3);

        let dataset = SegmentationDataset::new(
            vec![entry("g", image)],
            vec![entry("g", dir.path().join("mask/a.png"))],
            None,
        )
        .unwrap();
        let item = dataset.try_get(0).unwrap();

        assert_eq!(item.image.shape, vec![3, 3, 5]);
        assert_eq!(item.mask.shape, vec![1, 3, 5]);
        assert!(item.mask.to_vec::<f32>().unwrap().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn untransformed_image_is_unit_scaled() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("source/a.png");
        let mask = dir.path().join("mask/a.png");
        write_rgb(&image, 2, 2);
        write_mask(&mask, 2, 2);

        let dataset =
            SegmentationDataset::new(vec![entry("g", image)], vec![entry("g", mask)], None)
                .unwrap();
        let item = dataset.try_get(0).unwrap();

        let image = item.image.to_vec::<f32>().unwrap();
        // Blue plane is 255 everywhere
        assert!(image[8..].iter().all(|v| (*v - 1.0).abs() < 1e-6));
        assert_eq!(item.mask.to_vec::<f32>().unwrap(), vec![255.0, 0.0, 255.0, 0.0]);
    }

    #[test]
    fn mismatched_mask_size_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("source/a.png");
        let mask = dir.path().join("mask/a.png");
        write_rgb(&image, 4, 4);
        write_mask(&mask, 2, 4);

        let dataset =
            SegmentationDataset::new(vec![entry("g", image)], vec![entry("g", mask)], None)
                .unwrap();

        assert!(matches!(
            dataset.try_get(0).unwrap_err(),
            DatasetError::DimensionMismatch {
                mask_width: 2,
                image_width: 4,
                ..
            }
        ));
    }

    #[test]
    fn corrupt_image_returns_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.png");
        std::fs::write(&image, b"garbage").unwrap();

        let dataset = SegmentationDataset::new(
            vec![entry("g", image)],
            vec![entry("g", dir.path().join("m.png"))],
            None,
        )
        .unwrap();

        assert!(matches!(
            dataset.try_get(0).unwrap_err(),
            DatasetError::ImageOpenFailed { .. }
        ));
    }

    #[test]
    #[should_panic(expected = "failed to load sample 1")]
    fn iterating_past_corrupt_image_panics() {
        let dir = tempfile::tempdir().unwrap();
        let mut images = Vec::new();
        let mut masks = Vec::new();
        for name in ["a", "b", "c"] {
            let image = dir.path().join(format!("source/{name}.png"));
            let mask = dir.path().join(format!("mask/{name}.png"));
            write_rgb(&image, 2, 2);
            write_mask(&mask, 2, 2);
            images.push(entry("g", image));
            masks.push(entry("g", mask));
        }
        std::fs::write(&images[1].path, b"garbage").unwrap();

        let dataset = SegmentationDataset::new(images, masks, None).unwrap();

        assert_eq!(dataset.iter().count(), 3);
    }

    #[test]
    fn transform_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.png");
        write_rgb(&image, 3, 2);

        let transform: Arc<dyn SampleTransform> =
            Arc::new(|mut sample: Sample, _: &mut StdRng| {
                sample.mask.pixels_mut().for_each(|p| p.0[0] = 1.0);
                AugmentedSample::from_raw(sample)
            });
        let dataset = SegmentationDataset::new(
            vec![entry("g", image)],
            vec![entry("g", dir.path().join("missing.png"))],
            Some(transform),
        )
        .unwrap();

        let mask = dataset.try_get(0).unwrap().mask.to_vec::<f32>().unwrap();
        assert_eq!(mask, vec![1.0; 6]);
    }

    #[test]
    fn combine_keeps_left_transform_and_seed() {
        let transform: Arc<dyn SampleTransform> =
            Arc::new(ImageAugmentor::from_preset(TransformPreset::Eval, 1.0));
        let left = SegmentationDataset::new(
            vec![entry("a", "1.png".into())],
            vec![entry("a", "m1.png".into())],
            Some(transform),
        )
        .unwrap()
        .with_seed(9);
        let right = SegmentationDataset::new(
            vec![entry("b", "2.png".into()), entry("b", "3.png".into())],
            vec![entry("b", "m2.png".into()), entry("b", "m3.png".into())],
            None,
        )
        .unwrap();

        let combined = left.combine(&right);

        assert_eq!(combined.len(), 3);
        assert_eq!(&combined.entries()[..1], left.entries());
        assert_eq!(&combined.entries()[1..], right.entries());
        assert!(combined.transform().is_some());
        assert_eq!(combined.seed(), 9);

        let reversed = right.clone() + left;
        assert!(reversed.transform().is_none());
        assert_eq!(reversed.mask_entries()[0].path, PathBuf::from("m2.png"));
    }

    #[test]
    fn batcher_stacks_items() {
        let device = Default::default();
        let batcher = SegmentationBatcher::<TestBackend>::new();
        let item = |value: f32| SegmentationItem {
            image: TensorData::new(vec![value; 3 * 4 * 5], [3, 4, 5]),
            mask: TensorData::new(vec![value; 4 * 5], [1, 4, 5]),
        };

        let batch = batcher.batch(vec![item(0.0), item(1.0)], &device);

        assert_eq!(batch.images.shape().dims, [2, 3, 4, 5]);
        assert_eq!(batch.masks.shape().dims, [2, 1, 4, 5]);
    }
}
