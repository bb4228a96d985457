//! Data augmentation for image/mask pairs.
//!
//! An [`AugmentationConfig`] is an ordered list of stochastic operations, each
//! applied with its own probability, followed by an optional normalization.
//! The whole pipeline runs with the config's probability `p`.
//!
//! Operations (defaults follow the usual segmentation training recipe):
//! 1. Vertical / horizontal flip, transpose, random 90 degree rotation
//! 2. Shift-scale-rotate: shift 6.25%, scale ±10%, rotation ±45 degrees, reflected border
//! 3. Additive gaussian noise with sigma drawn from (0, 0.02 * 255)
//! 4. One of CLAHE (clip 3), brightness/contrast (±0.2) or gamma (0.8..1.2)
//! 5. ImageNet normalization
//!
//! Geometric operations move image and mask together; photometric operations
//! and noise leave the mask untouched.
//!
//! Randomness always comes from the caller's [`StdRng`], so a seeded generator
//! reproduces the same augmentation.

pub mod geometric;
pub mod photometric;

use std::{fmt, str::FromStr};

use amseg_util::{ImageUtils, MaskImage};
use image::{imageops, imageops::FilterType, Rgb, Rgb32FImage, RgbImage};
use rand::{rngs::StdRng, Rng};
use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

/// A decoded image/mask pair, before augmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// 8-bit RGB image, `H x W x 3`
    pub image: RgbImage,
    /// Floating point mask, `H x W x 1`
    pub mask: MaskImage,
}

/// An image/mask pair ready for tensor encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedSample {
    /// Image in its final numeric scale
    pub image: Rgb32FImage,
    /// Floating point mask, `H x W x 1`
    pub mask: MaskImage,
}

impl AugmentedSample {
    /// Pass a sample through without normalization: the 8-bit image is scaled
    /// to `[0, 1]` and the mask is kept as is.
    pub fn from_raw(sample: Sample) -> Self {
        Self {
            image: ImageUtils::rgb8_to_unit_f32(&sample.image),
            mask: sample.mask,
        }
    }
}

/// A transform applied to every sample a dataset yields.
///
/// Implementations must move image and mask consistently: any geometric change
/// applied to one is applied to the other.
pub trait SampleTransform: Send + Sync {
    fn apply(&self, sample: Sample, rng: &mut StdRng) -> AugmentedSample;
}

impl<F> SampleTransform for F
where
    F: Fn(Sample, &mut StdRng) -> AugmentedSample + Send + Sync,
{
    fn apply(&self, sample: Sample, rng: &mut StdRng) -> AugmentedSample {
        self(sample, rng)
    }
}

/// Named augmentation pipelines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformPreset {
    /// Normalization only
    #[default]
    Eval,
    /// Full stochastic chain followed by normalization
    Train,
    /// Normalization only, same as `Eval`
    Validation,
}

impl fmt::Display for TransformPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Eval => "eval",
            Self::Train => "train",
            Self::Validation => "validation",
        };
        f.write_str(name)
    }
}

impl FromStr for TransformPreset {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eval" | "identity" | "default" => Ok(Self::Eval),
            "train" => Ok(Self::Train),
            "validation" | "valid" | "val" => Ok(Self::Validation),
            _ => Err(DatasetError::UnknownPreset {
                name: s.to_owned(),
            }),
        }
    }
}

/// Available augmentation operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AugmentationMethod {
    /// Flip rows
    VerticalFlip { p: f64 },
    /// Flip columns
    HorizontalFlip { p: f64 },
    /// Swap rows and columns
    Transpose { p: f64 },
    /// Rotate by a random multiple of 90 degrees
    RandomRotate90 { p: f64 },
    /// Random affine: shift as a fraction of the size, scale in
    /// `1 ± scale_limit`, rotation in `±rotate_limit` degrees
    ShiftScaleRotate {
        p: f64,
        shift_limit: f32,
        scale_limit: f32,
        rotate_limit: f32,
    },
    /// Gaussian noise with a standard deviation (in 8-bit pixel units) drawn from `scale`
    AdditiveGaussianNoise { p: f64, scale: (f32, f32) },
    /// Apply exactly one child, picked with weights given by the children's `p`
    OneOf {
        p: f64,
        methods: Vec<AugmentationMethod>,
    },
    /// Contrast limited adaptive histogram equalization
    Clahe {
        p: f64,
        clip_limit: f32,
        tile_grid_size: (u32, u32),
    },
    /// `x * (1 + c) + b * 255` with `c` and `b` drawn from the limits
    RandomBrightnessContrast {
        p: f64,
        brightness_limit: f32,
        contrast_limit: f32,
    },
    /// Gamma correction with `gamma = g / 100`, `g` drawn from `gamma_limit`
    RandomGamma { p: f64, gamma_limit: (f32, f32) },
    /// Resize to a fixed size; bilinear for the image, nearest for the mask
    Resize { height: u32, width: u32 },
}

impl AugmentationMethod {
    /// Probability of the operation, also its weight inside [`AugmentationMethod::OneOf`].
    pub fn probability(&self) -> f64 {
        match self {
            Self::VerticalFlip { p }
            | Self::HorizontalFlip { p }
            | Self::Transpose { p }
            | Self::RandomRotate90 { p }
            | Self::ShiftScaleRotate { p, .. }
            | Self::AdditiveGaussianNoise { p, .. }
            | Self::OneOf { p, .. }
            | Self::Clahe { p, .. }
            | Self::RandomBrightnessContrast { p, .. }
            | Self::RandomGamma { p, .. } => *p,
            Self::Resize { .. } => 1.0,
        }
    }
}

/// Per-channel `(x / max_pixel_value - mean) / std`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeConfig {
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub max_pixel_value: f32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        // ImageNet statistics
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            max_pixel_value: 255.0,
        }
    }
}

impl NormalizeConfig {
    pub fn apply(&self, image: &RgbImage) -> Rgb32FImage {
        let (width, height) = image.dimensions();
        Rgb32FImage::from_fn(width, height, |x, y| {
            let pixel = image.get_pixel(x, y).0;
            Rgb(std::array::from_fn(|c| {
                (f32::from(pixel[c]) / self.max_pixel_value - self.mean[c]) / self.std[c]
            }))
        })
    }
}

/// Data augmentation configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Operations, applied in order
    pub methods: Vec<AugmentationMethod>,
    /// Normalization applied after the operations
    pub normalize: Option<NormalizeConfig>,
    /// Probability of running the pipeline at all
    pub p: f64,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self::eval(1.0)
    }
}

impl AugmentationConfig {
    /// Normalization only.
    pub fn eval(p: f64) -> Self {
        Self {
            methods: Vec::new(),
            normalize: Some(NormalizeConfig::default()),
            p,
        }
    }

    /// Normalization only, kept separate from [`AugmentationConfig::eval`] so the
    /// two can diverge.
    pub fn validation(p: f64) -> Self {
        Self::eval(p)
    }

    /// The training chain.
    pub fn train(p: f64) -> Self {
        Self {
            methods: vec![
                AugmentationMethod::VerticalFlip { p: 0.5 },
                AugmentationMethod::HorizontalFlip { p: 0.5 },
                AugmentationMethod::Transpose { p: 0.5 },
                AugmentationMethod::RandomRotate90 { p: 0.5 },
                AugmentationMethod::ShiftScaleRotate {
                    p: 1.0,
                    shift_limit: 0.0625,
                    scale_limit: 0.1,
                    rotate_limit: 45.0,
                },
                AugmentationMethod::AdditiveGaussianNoise {
                    p: 0.5,
                    scale: (0.0, 0.02 * 255.0),
                },
                AugmentationMethod::OneOf {
                    p: 1.0,
                    methods: vec![
                        AugmentationMethod::Clahe {
                            p: 1.0,
                            clip_limit: 3.0,
                            tile_grid_size: (8, 8),
                        },
                        AugmentationMethod::RandomBrightnessContrast {
                            p: 1.0,
                            brightness_limit: 0.2,
                            contrast_limit: 0.2,
                        },
                        AugmentationMethod::RandomGamma {
                            p: 1.0,
                            gamma_limit: (80.0, 120.0),
                        },
                    ],
                },
            ],
            normalize: Some(NormalizeConfig::default()),
            p,
        }
    }

    pub fn from_preset(preset: TransformPreset, p: f64) -> Self {
        match preset {
            TransformPreset::Eval => Self::eval(p),
            TransformPreset::Train => Self::train(p),
            TransformPreset::Validation => Self::validation(p),
        }
    }
}

/// Runs an [`AugmentationConfig`] over samples.
#[derive(Debug, Clone)]
pub struct ImageAugmentor {
    config: AugmentationConfig,
}

impl ImageAugmentor {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn from_preset(preset: TransformPreset, p: f64) -> Self {
        Self::new(AugmentationConfig::from_preset(preset, p))
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Run the pipeline on a sample.
    pub fn augment(&self, sample: Sample, rng: &mut StdRng) -> AugmentedSample {
        if !chance(rng, self.config.p) {
            return AugmentedSample::from_raw(sample);
        }

        let sample = self
            .config
            .methods
            .iter()
            .fold(sample, |sample, method| apply_method(method, sample, rng, false));

        match &self.config.normalize {
            Some(normalize) => AugmentedSample {
                image: normalize.apply(&sample.image),
                mask: sample.mask,
            },
            None => AugmentedSample::from_raw(sample),
        }
    }
}

impl SampleTransform for ImageAugmentor {
    fn apply(&self, sample: Sample, rng: &mut StdRng) -> AugmentedSample {
        self.augment(sample, rng)
    }
}

/// Bernoulli draw that tolerates probabilities outside `[0, 1]`.
fn chance(rng: &mut StdRng, p: f64) -> bool {
    p >= 1.0 || (p > 0.0 && rng.random::<f64>() < p)
}

/// Apply one operation. `forced` skips the probability draw, as a child picked
/// by [`AugmentationMethod::OneOf`] always runs.
fn apply_method(
    method: &AugmentationMethod,
    sample: Sample,
    rng: &mut StdRng,
    forced: bool,
) -> Sample {
    if !forced && !chance(rng, method.probability()) {
        return sample;
    }

    let Sample {
        mut image,
        mut mask,
    } = sample;

    match method {
        AugmentationMethod::VerticalFlip { .. } => {
            imageops::flip_vertical_in_place(&mut image);
            imageops::flip_vertical_in_place(&mut mask);
        }
        AugmentationMethod::HorizontalFlip { .. } => {
            imageops::flip_horizontal_in_place(&mut image);
            imageops::flip_horizontal_in_place(&mut mask);
        }
        AugmentationMethod::Transpose { .. } => {
            image = geometric::transpose(&image);
            mask = geometric::transpose(&mask);
        }
        AugmentationMethod::RandomRotate90 { .. } => {
            let quarter_turns = rng.random_range(0..4u8);
            image = geometric::rotate_quarter_turns(&image, quarter_turns);
            mask = geometric::rotate_quarter_turns(&mask, quarter_turns);
        }
        AugmentationMethod::ShiftScaleRotate {
            shift_limit,
            scale_limit,
            rotate_limit,
            ..
        } => {
            let angle = uniform(rng, -rotate_limit, *rotate_limit);
            let scale = uniform(rng, 1.0 - scale_limit, 1.0 + scale_limit);
            let dx = uniform(rng, -shift_limit, *shift_limit);
            let dy = uniform(rng, -shift_limit, *shift_limit);

            let (width, height) = image.dimensions();
            let (width, height) = (width as f32, height as f32);
            let transform = geometric::shift_scale_rotate(
                (width / 2.0, height / 2.0),
                angle,
                scale,
                (dx * width, dy * height),
            );

            image = geometric::warp_bilinear(&image, &transform);
            mask = geometric::warp_nearest(&mask, &transform);
        }
        AugmentationMethod::AdditiveGaussianNoise { scale, .. } => {
            let sigma = uniform(rng, scale.0, scale.1);
            if sigma > 0.0 {
                let seed = rng.random();
                imageproc::noise::gaussian_noise_mut(&mut image, 0.0, f64::from(sigma), seed);
            }
        }
        AugmentationMethod::OneOf { methods, .. } => {
            if let Some(child) = pick_weighted(methods, rng) {
                return apply_method(child, Sample { image, mask }, rng, true);
            }
        }
        AugmentationMethod::Clahe {
            clip_limit,
            tile_grid_size,
            ..
        } => {
            photometric::clahe(&mut image, *clip_limit, *tile_grid_size);
        }
        AugmentationMethod::RandomBrightnessContrast {
            brightness_limit,
            contrast_limit,
            ..
        } => {
            let alpha = 1.0 + uniform(rng, -contrast_limit, *contrast_limit);
            let beta = uniform(rng, -brightness_limit, *brightness_limit);
            photometric::brightness_contrast(&mut image, alpha, beta);
        }
        AugmentationMethod::RandomGamma { gamma_limit, .. } => {
            let gamma = uniform(rng, gamma_limit.0, gamma_limit.1) / 100.0;
            photometric::gamma(&mut image, gamma);
        }
        AugmentationMethod::Resize { height, width } => {
            image = imageops::resize(&image, *width, *height, FilterType::Triangle);
            mask = geometric::resize_nearest(&mask, *width, *height);
        }
    }

    Sample { image, mask }
}

/// Uniform draw from `[low, high]`; a degenerate range returns `low`.
fn uniform(rng: &mut StdRng, low: f32, high: f32) -> f32 {
    if high > low {
        rng.random_range(low..=high)
    } else {
        low
    }
}

fn pick_weighted<'a>(
    methods: &'a [AugmentationMethod],
    rng: &mut StdRng,
) -> Option<&'a AugmentationMethod> {
    let total: f64 = methods.iter().map(|m| m.probability().max(0.0)).sum();
    if total <= 0.0 {
        return None;
    }

    let mut target = rng.random_range(0.0..total);
    for method in methods {
        let weight = method.probability().max(0.0);
        if target < weight {
            return Some(method);
        }
        target -= weight;
    }
    methods.last()
}
