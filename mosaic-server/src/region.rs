use crate::color::{ColorAccumulator, ImageHandle, PixelColor};
use crate::error::{MosaicError, Result};
use std::collections::HashMap;

/// Tile coordinate inside a target image: `(x / tile_width, y / tile_height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionIndex {
    pub rx: u32,
    pub ry: u32,
}

impl RegionIndex {
    pub const fn new(rx: u32, ry: u32) -> Self {
        Self { rx, ry }
    }
}

/// Number of tile columns and rows covering a `width` x `height` image.
pub fn grid_dims(width: u32, height: u32, tile_width: u32, tile_height: u32) -> (u32, u32) {
    (width.div_ceil(tile_width), height.div_ceil(tile_height))
}

/// Representative color per tile.
///
/// Edge tiles may be narrower or shorter than the requested size when the image dimensions are
/// not multiples of it.
pub fn reduce_regions(
    image: &ImageHandle,
    tile_width: u32,
    tile_height: u32,
) -> Result<HashMap<RegionIndex, PixelColor>> {
    if tile_width == 0 || tile_height == 0 {
        return Err(MosaicError::invalid_input(format!(
            "tile dimensions must be positive (got {tile_width}x{tile_height})"
        )));
    }
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 {
        return Err(MosaicError::invalid_input(format!(
            "image has no pixels ({w}x{h})"
        )));
    }
    let (cols, rows) = grid_dims(w, h, tile_width, tile_height);
    let mut accs = vec![ColorAccumulator::default(); cols as usize * rows as usize];
    for (x, y, px) in image.as_rgba().enumerate_pixels() {
        let (rx, ry) = (x / tile_width, y / tile_height);
        accs[(ry * cols + rx) as usize].accumulate((*px).into());
    }
    let mut out = HashMap::with_capacity(accs.len());
    for (i, acc) in accs.iter().enumerate() {
        let i = i as u32;
        out.insert(RegionIndex::new(i % cols, i / cols), acc.finalize()?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::reduce;
    use image::{ImageBuffer, Rgba};

    fn gradient(w: u32, h: u32) -> ImageHandle {
        ImageHandle::new(ImageBuffer::from_fn(w, h, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8, 255])
        }))
    }

    #[test]
    fn region_count_is_ceil_product() {
        let img = gradient(37, 20);
        let regions = reduce_regions(&img, 8, 8).unwrap();
        assert_eq!(regions.len(), (37usize.div_ceil(8)) * (20usize.div_ceil(8)));
        assert!(regions.contains_key(&RegionIndex::new(4, 2)));
        assert!(!regions.contains_key(&RegionIndex::new(5, 0)));
    }

    #[test]
    fn weighted_region_average_matches_whole_image() {
        let (w, h, t) = (23u32, 17u32, 5u32);
        let img = gradient(w, h);
        let regions = reduce_regions(&img, t, t).unwrap();
        let whole = reduce(&img).unwrap();
        let mut sums = [0f64; 3];
        for (idx, c) in &regions {
            let tw = (w - idx.rx * t).min(t) as f64;
            let th = (h - idx.ry * t).min(t) as f64;
            for (s, ch) in sums.iter_mut().zip(c.channels()) {
                *s += tw * th * ch as f64;
            }
        }
        let n = (w * h) as f64;
        for (s, ch) in sums.iter().zip(whole.channels()) {
            // Per-region truncation loses < 1 per channel.
            assert!((s / n - ch as f64).abs() <= 1.0, "{} vs {}", s / n, ch);
        }
    }

    #[test]
    fn single_tile_equals_full_reduction() {
        let img = gradient(6, 4);
        let regions = reduce_regions(&img, 6, 4).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[&RegionIndex::new(0, 0)], reduce(&img).unwrap());
    }

    #[test]
    fn first_pixel_of_each_tile_counts() {
        // Only the top-left pixel of the 2x2 tile is non-black.
        let img = ImageHandle::new(ImageBuffer::from_fn(2, 2, |x, y| {
            if x == 0 && y == 0 {
                Rgba([200, 0, 0, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        }));
        let regions = reduce_regions(&img, 2, 2).unwrap();
        assert_eq!(regions[&RegionIndex::new(0, 0)].red, 50);
    }

    #[test]
    fn zero_tile_dimension_is_invalid() {
        let img = gradient(4, 4);
        assert!(matches!(
            reduce_regions(&img, 0, 4),
            Err(MosaicError::InvalidInput { .. })
        ));
        assert!(reduce_regions(&img, 4, 0).is_err());
    }
}
