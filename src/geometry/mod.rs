//! Geometry primitives shared by every converter and the validator.
//!
//! Boxes carry a zero-sized space marker so that pixel-space values read
//! from source annotations can never be written out as if they were
//! already normalized.
//!
//! # Example
//!
//! ```
//! use yoloprep::geometry::{BBoxXYXY, ImageSize, Pixel};
//!
//! let size = ImageSize::new(100, 100).unwrap();
//! let px = BBoxXYXY::<Pixel>::from_xyxy(10.0, 10.0, 50.0, 40.0);
//! let norm = px.to_normalized_cxcywh(size);
//! assert_eq!((norm.cx, norm.cy, norm.w, norm.h), (0.3, 0.25, 0.4, 0.3));
//! ```

mod bbox;

pub use bbox::{BBoxXYXY, CxCyWh};

use std::fmt;

use serde::Serialize;

/// Marker for absolute pixel coordinates, origin at the top-left corner.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pixel {}

/// Marker for coordinates divided by the image width or height.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Normalized {}

impl fmt::Debug for Pixel {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

impl fmt::Debug for Normalized {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

/// Pixel dimensions of the image an annotation belongs to.
///
/// Both sides are guaranteed non-zero, so dividing by them is always safe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ImageSize {
    width: u32,
    height: u32,
}

impl ImageSize {
    /// Returns `None` when either side is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { width, height })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub(crate) fn width_f64(&self) -> f64 {
        self.width as f64
    }

    #[inline]
    pub(crate) fn height_f64(&self) -> f64 {
        self.height as f64
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_size_rejects_zero_sides() {
        assert!(ImageSize::new(0, 10).is_none());
        assert!(ImageSize::new(10, 0).is_none());
        assert_eq!(ImageSize::new(640, 480).unwrap().to_string(), "640x480");
    }
}
