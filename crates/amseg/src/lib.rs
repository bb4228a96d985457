//! `amseg`: dataset loading and augmentation for binary image segmentation.
//!
//! Grouped image/mask folders are indexed, optionally filtered and replicated
//! to a target size, and served as channel-first tensor pairs through burn's
//! dataset and batcher traits.

pub mod backend;

#[doc(inline)]
pub use amseg_train as train;
#[doc(inline)]
pub use amseg_util as util;
pub use amseg_train::{
    load_dataset, DatasetConfig, DatasetError, DatasetIndex, SegmentationBatcher,
    SegmentationDataset, TransformPreset,
};
