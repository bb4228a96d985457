pub mod image;

pub use self::image::{ImageError, ImageResult, ImageUtils, MaskImage};
