//! Representative-color reduction.
//!
//! A source image is summarised by the truncated arithmetic mean of each RGB channel. No gamma
//! correction or weighting is applied; channels are independent.

use crate::error::{MosaicError, Result};
use image::{DynamicImage, Rgba, RgbaImage};
use std::fmt;
use std::sync::Arc;

/// Alpha written into every reduced color. The lowest non-transparent `u8` value, so reductions
/// stay comparable with each other regardless of the source alpha.
pub const REDUCED_ALPHA: u8 = 1;

/// An 8-bit RGBA sample usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PixelColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl PixelColor {
    pub const fn new(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Color with the same alpha that reductions produce.
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self::new(red, green, blue, REDUCED_ALPHA)
    }

    pub fn channels(&self) -> [u8; 3] {
        [self.red, self.green, self.blue]
    }
}

impl From<Rgba<u8>> for PixelColor {
    fn from(px: Rgba<u8>) -> Self {
        let [r, g, b, a] = px.0;
        Self::new(r, g, b, a)
    }
}

impl From<PixelColor> for Rgba<u8> {
    fn from(c: PixelColor) -> Self {
        Rgba([c.red, c.green, c.blue, c.alpha])
    }
}

impl fmt::Display for PixelColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

/// Immutable, cheaply clonable pixel grid.
#[derive(Clone)]
pub struct ImageHandle(Arc<RgbaImage>);

impl ImageHandle {
    pub fn new(img: RgbaImage) -> Self {
        Self(Arc::new(img))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn pixel(&self, x: u32, y: u32) -> PixelColor {
        (*self.0.get_pixel(x, y)).into()
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.0
    }

    /// True when both handles share the same underlying pixel buffer.
    pub fn same_image(&self, other: &ImageHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<DynamicImage> for ImageHandle {
    fn from(img: DynamicImage) -> Self {
        Self::new(img.to_rgba8())
    }
}

impl From<RgbaImage> for ImageHandle {
    fn from(img: RgbaImage) -> Self {
        Self::new(img)
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Running channel sums for one image or region.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorAccumulator {
    red: u64,
    green: u64,
    blue: u64,
    count: u64,
}

impl ColorAccumulator {
    #[inline]
    pub fn accumulate(&mut self, color: PixelColor) {
        self.red += color.red as u64;
        self.green += color.green as u64;
        self.blue += color.blue as u64;
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Truncated per-channel mean. Fails if nothing was accumulated.
    pub fn finalize(&self) -> Result<PixelColor> {
        if self.count == 0 {
            return Err(MosaicError::invalid_input("cannot average zero pixels"));
        }
        // A mean of u8 samples never exceeds u8::MAX.
        Ok(PixelColor::rgb(
            (self.red / self.count) as u8,
            (self.green / self.count) as u8,
            (self.blue / self.count) as u8,
        ))
    }
}

/// Representative color of a whole image.
pub fn reduce(image: &ImageHandle) -> Result<PixelColor> {
    if image.width() == 0 || image.height() == 0 {
        return Err(MosaicError::invalid_input(format!(
            "image has no pixels ({}x{})",
            image.width(),
            image.height()
        )));
    }
    let mut acc = ColorAccumulator::default();
    for px in image.as_rgba().pixels() {
        acc.accumulate((*px).into());
    }
    acc.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageBuffer;

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> ImageHandle {
        ImageHandle::new(ImageBuffer::from_pixel(
            w,
            h,
            Rgba([rgb[0], rgb[1], rgb[2], 255]),
        ))
    }

    #[test]
    fn solid_image_reduces_to_itself() {
        let img = solid(7, 3, [12, 200, 99]);
        assert_eq!(reduce(&img).unwrap(), PixelColor::rgb(12, 200, 99));
    }

    #[test]
    fn mean_is_truncated() {
        // Two pixels: (0,0,0) and (255,1,3) -> (127,0,1)
        let img = ImageHandle::new(ImageBuffer::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 1, 3, 255])
            }
        }));
        assert_eq!(reduce(&img).unwrap(), PixelColor::rgb(127, 0, 1));
    }

    #[test]
    fn saturated_channels_do_not_overflow() {
        let img = solid(512, 512, [255, 255, 255]);
        let c = reduce(&img).unwrap();
        assert_eq!(c.channels(), [255, 255, 255]);
    }

    #[test]
    fn zero_pixel_image_is_invalid() {
        let img = ImageHandle::new(RgbaImage::new(0, 4));
        assert!(matches!(
            reduce(&img),
            Err(MosaicError::InvalidInput { .. })
        ));
        assert!(ColorAccumulator::default().finalize().is_err());
    }

    #[test]
    fn alpha_is_fixed_regardless_of_source() {
        let img = ImageHandle::new(ImageBuffer::from_pixel(2, 2, Rgba([10, 20, 30, 0])));
        assert_eq!(reduce(&img).unwrap().alpha, REDUCED_ALPHA);
    }
}
