//! Corner and center box representations.

use std::marker::PhantomData;

use super::{ImageSize, Normalized, Pixel};

/// An axis-aligned box stored as two corners (xmin, ymin, xmax, ymax).
///
/// The constructor does not reorder or clamp anything. A box built from
/// bad source data stays bad so that the caller can report it.
#[derive(Clone, Copy, PartialEq)]
pub struct BBoxXYXY<TSpace> {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    _space: PhantomData<TSpace>,
}

impl<TSpace> BBoxXYXY<TSpace> {
    #[inline]
    pub fn from_xyxy(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            _space: PhantomData,
        }
    }

    /// Enclosing box of a point list, or `None` for an empty list.
    ///
    /// Rectangles and polygons both reduce to this box; any interior
    /// shape detail is dropped.
    pub fn enclosing<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut iter = points.into_iter();
        let (x0, y0) = iter.next()?;
        let (xmin, ymin, xmax, ymax) = iter.fold((x0, y0, x0, y0), |(x1, y1, x2, y2), (x, y)| {
            (x1.min(x), y1.min(y), x2.max(x), y2.max(y))
        });
        Some(Self::from_xyxy(xmin, ymin, xmax, ymax))
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.xmin.is_finite() && self.ymin.is_finite() && self.xmax.is_finite() && self.ymax.is_finite()
    }
}

impl<TSpace> std::fmt::Debug for BBoxXYXY<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BBoxXYXY")
            .field("xmin", &self.xmin)
            .field("ymin", &self.ymin)
            .field("xmax", &self.xmax)
            .field("ymax", &self.ymax)
            .finish()
    }
}

impl BBoxXYXY<Pixel> {
    /// Normalized center box:
    /// `cx = (xmin + xmax) / 2 / W`, `w = (xmax - xmin) / W`, same for y.
    pub fn to_normalized_cxcywh(&self, size: ImageSize) -> CxCyWh<Normalized> {
        let (iw, ih) = (size.width_f64(), size.height_f64());
        CxCyWh::new(
            (self.xmin + self.xmax) / 2.0 / iw,
            (self.ymin + self.ymax) / 2.0 / ih,
            (self.xmax - self.xmin) / iw,
            (self.ymax - self.ymin) / ih,
        )
    }
}

/// A box stored as center point plus width and height.
#[derive(Clone, Copy, PartialEq)]
pub struct CxCyWh<TSpace> {
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
    _space: PhantomData<TSpace>,
}

impl<TSpace> CxCyWh<TSpace> {
    #[inline]
    pub fn new(cx: f64, cy: f64, w: f64, h: f64) -> Self {
        Self {
            cx,
            cy,
            w,
            h,
            _space: PhantomData,
        }
    }

    /// True when width and height are both strictly positive.
    #[inline]
    pub fn has_area(&self) -> bool {
        self.w > 0.0 && self.h > 0.0
    }
}

impl<TSpace> std::fmt::Debug for CxCyWh<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CxCyWh")
            .field("cx", &self.cx)
            .field("cy", &self.cy)
            .field("w", &self.w)
            .field("h", &self.h)
            .finish()
    }
}

impl CxCyWh<Normalized> {
    /// COCO-style top-left box in pixels to a normalized center box:
    /// `cx = (x + w / 2) / W`, `w = w / W`, same for y.
    pub fn from_top_left_pixels(x: f64, y: f64, w: f64, h: f64, size: ImageSize) -> Self {
        let (iw, ih) = (size.width_f64(), size.height_f64());
        Self::new((x + w / 2.0) / iw, (y + h / 2.0) / ih, w / iw, h / ih)
    }

    /// Back to pixel corners: `x1 = (cx - w / 2) * W`, etc.
    pub fn to_pixel_xyxy(&self, size: ImageSize) -> BBoxXYXY<Pixel> {
        let (iw, ih) = (size.width_f64(), size.height_f64());
        BBoxXYXY::from_xyxy(
            (self.cx - self.w / 2.0) * iw,
            (self.cy - self.h / 2.0) * ih,
            (self.cx + self.w / 2.0) * iw,
            (self.cy + self.h / 2.0) * ih,
        )
    }

    /// True when all four values lie in `[0, 1]`.
    pub fn is_within_unit(&self) -> bool {
        [self.cx, self.cy, self.w, self.h]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }
}
