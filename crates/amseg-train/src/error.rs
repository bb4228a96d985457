//! Error types specific to the amseg-train crate.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for dataset operations in amseg-train.
///
/// This enum covers the failures of dataset indexing, assembly and sample
/// retrieval. Nothing is retried or skipped internally; every error reaches the
/// caller, which owns the retry/skip policy.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Error when the dataset root does not exist.
    #[error("Dataset root not found: {path}")]
    RootNotFound {
        /// The missing root path.
        path: PathBuf,
    },

    /// Error when the dataset root exists but is not a directory.
    #[error("Dataset root is not a directory: {path}")]
    RootNotDirectory {
        /// The offending root path.
        path: PathBuf,
    },

    /// Error when reading a directory fails.
    #[error("Failed to read directory: {path}")]
    DirectoryReadFailed {
        /// The directory path that failed to read.
        path: PathBuf,
        /// The underlying walk error.
        #[source]
        source: walkdir::Error,
    },

    /// Error when a group directory name is not valid UTF-8.
    #[error("Path contains invalid UTF-8: {path}")]
    InvalidUtf8Path {
        /// The path with invalid UTF-8.
        path: PathBuf,
    },

    /// Error when opening or decoding an image file fails.
    #[error("Failed to open image: {path}")]
    ImageOpenFailed {
        /// The image file path that failed to open.
        path: PathBuf,
        /// The underlying decoding error.
        #[source]
        source: amseg_util::ImageError,
    },

    /// Error when a sample is requested past the end of the dataset.
    #[error("Sample index {index} out of range for dataset of length {len}")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// The dataset length.
        len: usize,
    },

    /// Error when the image and mask tables do not have the same length.
    #[error("Image table has {images} rows but mask table has {masks}")]
    LengthMismatch {
        /// Number of image rows.
        images: usize,
        /// Number of mask rows.
        masks: usize,
    },

    /// Error when a decoded mask does not cover the same pixels as its image.
    #[error(
        "Mask {path} is {mask_width}x{mask_height}, image is {image_width}x{image_height}"
    )]
    DimensionMismatch {
        /// The mask file.
        path: PathBuf,
        /// Image width in pixels.
        image_width: u32,
        /// Image height in pixels.
        image_height: u32,
        /// Mask width in pixels.
        mask_width: u32,
        /// Mask height in pixels.
        mask_height: u32,
    },

    /// Error when an empty index is asked to grow to a positive size.
    #[error("Cannot replicate an empty index to {size} rows")]
    EmptyIndex {
        /// The requested size.
        size: usize,
    },

    /// Error when a transform preset name is not recognized.
    #[error("Unknown transform preset: {name} (expected eval, train or validation)")]
    UnknownPreset {
        /// The unrecognized name.
        name: String,
    },
}

/// A specialized `Result` type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;
