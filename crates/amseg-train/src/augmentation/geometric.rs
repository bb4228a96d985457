//! Geometric operations shared by images and masks.
//!
//! Every function here is applied to the image and the mask with the same
//! parameters, which keeps the two pixel-aligned. Warps go through
//! `imageproc`'s `warp_with` family; only the reflected border is folded
//! here, since imageproc fills out-of-range samples with a constant.

use amseg_util::MaskImage;
use image::{imageops, ImageBuffer, Luma, Pixel, Rgb, RgbImage};
use imageproc::geometric_transformations::{
    warp_into_with, warp_with, Interpolation, Projection,
};

type Buffer<P> = ImageBuffer<P, Vec<<P as Pixel>::Subpixel>>;

/// Swap rows and columns.
pub fn transpose<P: Pixel>(image: &Buffer<P>) -> Buffer<P> {
    let (width, height) = image.dimensions();
    ImageBuffer::from_fn(height, width, |x, y| *image.get_pixel(y, x))
}

/// Rotate counter-clockwise by `quarter_turns * 90` degrees.
pub fn rotate_quarter_turns<P>(image: &Buffer<P>, quarter_turns: u8) -> Buffer<P>
where
    P: Pixel + 'static,
{
    match quarter_turns % 4 {
        1 => imageops::rotate270(image),
        2 => imageops::rotate180(image),
        3 => imageops::rotate90(image),
        _ => image.clone(),
    }
}

/// Rotation by `angle_degrees` (counter-clockwise on screen) and uniform
/// `scale` about `center`, followed by a translation of `shift`.
///
/// Maps source coordinates to destination coordinates.
pub fn shift_scale_rotate(
    center: (f32, f32),
    angle_degrees: f32,
    scale: f32,
    shift: (f32, f32),
) -> Projection {
    let (cx, cy) = center;
    Projection::translate(cx + shift.0, cy + shift.1)
        * Projection::rotate(-angle_degrees.to_radians())
        * Projection::scale(scale, scale)
        * Projection::translate(-cx, -cy)
}

/// Fold a coordinate back into `[0, len - 1]` without repeating the edge
/// pixel (`gfedcb|abcdefgh|gfedcba`).
fn reflect_101(coord: f32, len: u32) -> f32 {
    if len <= 1 {
        return 0.0;
    }

    let last = (len - 1) as f32;
    let folded = coord.rem_euclid(2.0 * last);
    if folded > last {
        2.0 * last - folded
    } else {
        folded
    }
}

/// Warp a mask with nearest-neighbour sampling and a reflected border.
/// `transform` maps source to destination.
pub fn warp_nearest(mask: &MaskImage, transform: &Projection) -> MaskImage {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return mask.clone();
    }

    let inverse = transform.invert();
    warp_with(
        mask,
        move |x, y| {
            let (sx, sy) = inverse * (x, y);
            (reflect_101(sx, width), reflect_101(sy, height))
        },
        Interpolation::Nearest,
        Luma([0.0]),
    )
}

/// Warp an image with bilinear sampling and a reflected border.
/// `transform` maps source to destination.
pub fn warp_bilinear(image: &RgbImage, transform: &Projection) -> RgbImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    // imageproc needs both neighbours of a sample in bounds, so a sample on
    // the last row or column reads one replicated pixel past the edge.
    let padded = RgbImage::from_fn(width + 1, height + 1, |x, y| {
        *image.get_pixel(x.min(width - 1), y.min(height - 1))
    });

    let inverse = transform.invert();
    let mut out = RgbImage::new(width, height);
    warp_into_with(
        &padded,
        move |x, y| {
            let (sx, sy) = inverse * (x, y);
            (reflect_101(sx, width), reflect_101(sy, height))
        },
        Interpolation::Bilinear,
        Rgb([0, 0, 0]),
        &mut out,
    );
    out
}

/// Resize a mask by nearest-neighbour lookup. Values are copied unchanged,
/// so a 0/255 mask stays 0/255.
pub fn resize_nearest(mask: &MaskImage, width: u32, height: u32) -> MaskImage {
    let (src_width, src_height) = mask.dimensions();
    if src_width == 0 || src_height == 0 {
        return ImageBuffer::new(width, height);
    }

    let scale_x = src_width as f32 / width.max(1) as f32;
    let scale_y = src_height as f32 / height.max(1) as f32;
    let mut out = ImageBuffer::new(width, height);
    warp_into_with(
        mask,
        move |x, y| {
            let sx = ((x + 0.5) * scale_x).floor();
            let sy = ((y + 0.5) * scale_y).floor();
            (
                sx.min((src_width - 1) as f32),
                sy.min((src_height - 1) as f32),
            )
        },
        Interpolation::Nearest,
        Luma([0.0]),
        &mut out,
    );
    out
}
