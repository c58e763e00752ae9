//! Weighted perceptual distance between colors.
//!
//! Colors are compared in HSV with every coordinate normalised to `[0, 1]`. Hue is compared
//! linearly (no wrap-around), so pure red (0.0) and a red-leaning magenta (~0.97) are far apart.

use crate::color::PixelColor;
use crate::error::{MosaicError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Hue/saturation/value triple, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perceptual {
    pub hue: f64,
    pub saturation: f64,
    pub value: f64,
}

/// Pure RGB -> HSV conversion. Achromatic colors get hue 0.
pub fn to_perceptual(c: PixelColor) -> Perceptual {
    let r = c.red as f64 / 255.0;
    let g = c.green as f64 / 255.0;
    let b = c.blue as f64 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let chroma = max - min;

    let hue_deg = if chroma == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / chroma).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / chroma + 2.0)
    } else {
        60.0 * ((r - g) / chroma + 4.0)
    };
    let saturation = if max == 0.0 { 0.0 } else { chroma / max };

    Perceptual {
        hue: hue_deg / 360.0,
        saturation,
        value: max,
    }
}

/// Per-coordinate weights of the distance norm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceWeights {
    pub hue: f64,
    pub saturation: f64,
    pub value: f64,
}

impl Default for DistanceWeights {
    fn default() -> Self {
        Self {
            hue: 0.8,
            saturation: 0.1,
            value: 0.1,
        }
    }
}

impl DistanceWeights {
    pub fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("hue", self.hue),
            ("saturation", self.saturation),
            ("value", self.value),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(MosaicError::invalid_input(format!(
                    "weight '{name}' must be finite and non-negative (got {w})"
                )));
            }
        }
        Ok(())
    }
}

/// Distance function plus a counter of how many distances were evaluated.
#[derive(Debug, Default)]
pub struct DistanceModel {
    weights: DistanceWeights,
    evaluations: AtomicU64,
}

impl DistanceModel {
    pub fn new(weights: DistanceWeights) -> Self {
        Self {
            weights,
            evaluations: AtomicU64::new(0),
        }
    }

    pub fn weights(&self) -> DistanceWeights {
        self.weights
    }

    /// `sqrt(wh*dh^2 + ws*ds^2 + wv*dv^2)`
    pub fn distance(&self, a: PixelColor, b: PixelColor) -> f64 {
        self.distance_from(&to_perceptual(a), b)
    }

    /// Same as [`Self::distance`] with the first operand already converted.
    pub fn distance_from(&self, a: &Perceptual, b: PixelColor) -> f64 {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let b = to_perceptual(b);
        let dh = a.hue - b.hue;
        let ds = a.saturation - b.saturation;
        let dv = a.value - b.value;
        let w = &self.weights;
        (w.hue * dh * dh + w.saturation * ds * ds + w.value * dv * dv).sqrt()
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }
}
