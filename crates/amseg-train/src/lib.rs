pub mod augmentation;
pub mod config;
pub mod dataset;
pub mod error;
pub mod index;

// Re-export commonly used types
pub use augmentation::{
    AugmentationConfig, AugmentationMethod, AugmentedSample, ImageAugmentor, NormalizeConfig,
    Sample, SampleTransform, TransformPreset,
};
pub use config::DatasetConfig;
pub use dataset::{
    load_dataset, load_dataset_with_transform, SampleEntry, SegmentationBatch,
    SegmentationBatcher, SegmentationDataset, SegmentationItem,
};
pub use error::{DatasetError, DatasetResult};
pub use index::{resize_cyclic, DatasetIndex, IndexEntry};
