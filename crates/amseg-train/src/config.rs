//! Dataset assembly configuration.

use std::{path::PathBuf, sync::Arc};

use burn::prelude::*;

use crate::{
    augmentation::{AugmentationConfig, ImageAugmentor, SampleTransform, TransformPreset},
    dataset::{load_dataset_with_transform, SegmentationDataset, DEFAULT_SEED},
    error::DatasetResult,
};

/// Everything needed to assemble a [`SegmentationDataset`], loadable from JSON
/// through [`Config::load`].
#[derive(Config, Debug)]
pub struct DatasetConfig {
    /// Dataset root holding one directory per group.
    pub root: PathBuf,
    /// Named transform pipeline.
    #[config(default = "TransformPreset::Eval")]
    pub preset: TransformPreset,
    /// Groups to keep. `None` or an empty list keeps all of them.
    #[config(default = "None")]
    pub groups: Option<Vec<String>>,
    /// Number of rows after cyclic replication or truncation.
    #[config(default = "None")]
    pub size: Option<usize>,
    /// Seed of the per-sample random generators.
    #[config(default = "DEFAULT_SEED")]
    pub seed: u64,
    /// Probability of running the transform pipeline on a sample.
    #[config(default = "1.0")]
    pub p: f64,
    /// Explicit pipeline replacing `preset` and `p`.
    #[config(default = "None")]
    pub augmentation: Option<AugmentationConfig>,
}

impl DatasetConfig {
    /// The augmentation pipeline this config selects.
    pub fn augmentation_config(&self) -> AugmentationConfig {
        self.augmentation
            .clone()
            .unwrap_or_else(|| AugmentationConfig::from_preset(self.preset, self.p))
    }

    /// Index, filter, resize and wrap the dataset.
    pub fn load_dataset(&self) -> DatasetResult<SegmentationDataset> {
        let transform: Arc<dyn SampleTransform> =
            Arc::new(ImageAugmentor::new(self.augmentation_config()));
        let groups = self.groups.as_deref().unwrap_or_default();

        load_dataset_with_transform(&self.root, Some(transform), groups, self.size, self.seed)
    }
}
