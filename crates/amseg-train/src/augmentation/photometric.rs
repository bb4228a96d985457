//! Photometric operations. These only touch the image; masks pass through.

use image::{Rgb, RgbImage};

/// Apply a per-intensity lookup table to every channel.
fn apply_lut(image: &mut RgbImage, lut: &[u8; 256]) {
    for value in image.iter_mut() {
        *value = lut[usize::from(*value)];
    }
}

/// `x * alpha + beta * 255`, clipped to the 8-bit range.
pub fn brightness_contrast(image: &mut RgbImage, alpha: f32, beta: f32) {
    let mut lut = [0u8; 256];
    for (value, out) in lut.iter_mut().enumerate() {
        *out = (value as f32 * alpha + beta * 255.0).clamp(0.0, 255.0) as u8;
    }
    apply_lut(image, &lut);
}

/// `255 * (x / 255) ^ gamma`.
pub fn gamma(image: &mut RgbImage, gamma: f32) {
    let mut lut = [0u8; 256];
    for (value, out) in lut.iter_mut().enumerate() {
        *out = (255.0 * (value as f32 / 255.0).powf(gamma)).clamp(0.0, 255.0) as u8;
    }
    apply_lut(image, &lut);
}

/// Contrast limited adaptive histogram equalization of the luma channel.
///
/// The image is split into a `grid.0 x grid.1` tile grid. Each tile gets its own
/// equalization table with histogram bins clipped at
/// `clip_limit * tile_area / 256` and the excess spread over all bins. Pixels
/// are mapped by bilinear interpolation between the four nearest tile tables.
/// Chroma is kept, so hues survive the equalization.
pub fn clahe(image: &mut RgbImage, clip_limit: f32, grid: (u32, u32)) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let tile_w = width.div_ceil(grid.0.max(1)).max(1);
    let tile_h = height.div_ceil(grid.1.max(1)).max(1);
    let tiles_x = width.div_ceil(tile_w) as usize;
    let tiles_y = height.div_ceil(tile_h) as usize;

    let luma: Vec<u8> = image.pixels().map(|p| to_ycbcr(p).0).collect();
    let at = |x: u32, y: u32| luma[(y * width + x) as usize];

    let mut luts = Vec::with_capacity(tiles_x * tiles_y);
    for ty in 0..tiles_y as u32 {
        for tx in 0..tiles_x as u32 {
            let x_end = ((tx + 1) * tile_w).min(width);
            let y_end = ((ty + 1) * tile_h).min(height);

            let mut histogram = [0u32; 256];
            for y in ty * tile_h..y_end {
                for x in tx * tile_w..x_end {
                    histogram[usize::from(at(x, y))] += 1;
                }
            }

            let area = (x_end - tx * tile_w) * (y_end - ty * tile_h);
            luts.push(clipped_equalization(histogram, area, clip_limit));
        }
    }

    let axis = |pos: u32, tile: u32, count: usize| -> (usize, usize, f32) {
        let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
        let lo = (f.floor().max(0.0) as usize).min(count - 1);
        let hi = (lo + 1).min(count - 1);
        (lo, hi, (f - lo as f32).clamp(0.0, 1.0))
    };

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let (x0, x1, wx) = axis(x, tile_w, tiles_x);
        let (y0, y1, wy) = axis(y, tile_h, tiles_y);
        let value = usize::from(at(x, y));
        let lookup = |tx: usize, ty: usize| f32::from(luts[ty * tiles_x + tx][value]);

        let top = lookup(x0, y0) * (1.0 - wx) + lookup(x1, y0) * wx;
        let bottom = lookup(x0, y1) * (1.0 - wx) + lookup(x1, y1) * wx;
        let equalized = (top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8;

        let (_, cb, cr) = to_ycbcr(pixel);
        *pixel = from_ycbcr(equalized, cb, cr);
    }
}

fn clipped_equalization(mut histogram: [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in histogram.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }

        let share = excess / 256;
        let remainder = (excess % 256) as usize;
        for (i, bin) in histogram.iter_mut().enumerate() {
            *bin += share + u32::from(i < remainder);
        }
    }

    let scale = 255.0 / area.max(1) as f32;
    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;
    for (bin, out) in histogram.iter().zip(lut.iter_mut()) {
        cumulative += bin;
        *out = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Full-range BT.601 RGB to YCbCr.
fn to_ycbcr(pixel: &Rgb<u8>) -> (u8, f32, f32) {
    let [r, g, b] = pixel.0.map(f32::from);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    (y.round().clamp(0.0, 255.0) as u8, cb, cr)
}

fn from_ycbcr(y: u8, cb: f32, cr: f32) -> Rgb<u8> {
    let y = f32::from(y);
    let (cb, cr) = (cb - 128.0, cr - 128.0);
    let channel = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    Rgb([
        channel(y + 1.402 * cr),
        channel(y - 0.344_136 * cb - 0.714_136 * cr),
        channel(y + 1.772 * cb),
    ])
}
