//! Image decoding and tensor encoding helpers.
//!
//! Decoding always goes through `image::open` and lands in 8-bit RGB, whatever
//! the on-disk format. Encoding produces channel-first `f32` [`TensorData`] that
//! a batcher can move onto any burn backend.

use std::path::{Path, PathBuf};

use burn::tensor::TensorData;
use image::{ImageBuffer, Luma, Rgb, Rgb32FImage, RgbImage};
use thiserror::Error;

/// Single-channel floating point mask, laid out `H x W x 1`.
pub type MaskImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// ImageError covers the failures of image decoding.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to open image at '{}': {source}", path.display())]
    ImageLoadError {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Result type alias for ImageError
pub type ImageResult<T> = Result<T, ImageError>;

const INV_255: f32 = 1.0 / 255.0;

/// Image decoding and tensor encoding utilities
pub struct ImageUtils;

impl ImageUtils {
    /// Decode an image file into 8-bit RGB, `H x W x 3`.
    pub fn open_rgb8<P: AsRef<Path>>(path: P) -> ImageResult<RgbImage> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|source| ImageError::ImageLoadError {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(img.into_rgb8())
    }

    /// Decode an image file and keep only its first colour channel as `f32`.
    ///
    /// Intensities are cast, not rescaled, so an 8-bit mask keeps its 0..=255 range.
    /// Grayscale files decode with the luma value replicated, so the first
    /// channel is the luma itself.
    pub fn open_first_channel<P: AsRef<Path>>(path: P) -> ImageResult<MaskImage> {
        let rgb = Self::open_rgb8(path)?;
        let (width, height) = rgb.dimensions();

        Ok(ImageBuffer::from_fn(width, height, |x, y| {
            Luma([f32::from(rgb.get_pixel(x, y).0[0])])
        }))
    }

    /// All-zero mask with the given spatial size.
    pub fn zero_mask(width: u32, height: u32) -> MaskImage {
        ImageBuffer::new(width, height)
    }

    /// Cast an 8-bit image to `f32` in `[0, 1]`.
    pub fn rgb8_to_unit_f32(image: &RgbImage) -> Rgb32FImage {
        let (width, height) = image.dimensions();
        Rgb32FImage::from_fn(width, height, |x, y| {
            Rgb(image.get_pixel(x, y).0.map(|v| f32::from(v) * INV_255))
        })
    }

    /// Encode an RGB image as a `[3, H, W]` tensor.
    pub fn image_to_tensor_data(image: &Rgb32FImage) -> TensorData {
        let (width, height) = image.dimensions();
        let (width, height) = (width as usize, height as usize);
        let plane = width * height;

        // HWC to CHW
        let mut chw = vec![0.0_f32; 3 * plane];
        for (offset, pixel) in image.pixels().enumerate() {
            for (channel, value) in pixel.0.iter().enumerate() {
                chw[channel * plane + offset] = *value;
            }
        }

        TensorData::new(chw, [3, height, width])
    }

    /// Encode a mask as a `[1, H, W]` tensor.
    pub fn mask_to_tensor_data(mask: &MaskImage) -> TensorData {
        let (width, height) = mask.dimensions();
        TensorData::new(mask.as_raw().clone(), [1, height as usize, width as usize])
    }
}
