#![allow(dead_code)]

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

use yoloprep::geometry::{BBoxXYXY, ImageSize, Pixel};

pub const EPS_ROUNDTRIP: f64 = 1e-6;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

pub fn arb_image_size() -> impl Strategy<Value = ImageSize> {
    (1u32..=4096, 1u32..=4096).prop_map(|(w, h)| ImageSize::new(w, h).expect("non-zero size"))
}

/// A box with `0 <= x1 < x2 <= W` and `0 <= y1 < y2 <= H`.
pub fn arb_pixel_box_within(size: ImageSize) -> impl Strategy<Value = BBoxXYXY<Pixel>> {
    let (w, h) = (size.width() as f64, size.height() as f64);
    (0.0..1.0f64, 0.0..1.0f64, 0.0..1.0f64, 0.0..1.0f64).prop_filter_map(
        "box must have positive area",
        move |(a, b, c, d)| {
            let (x1, x2) = if a < b { (a, b) } else { (b, a) };
            let (y1, y2) = if c < d { (c, d) } else { (d, c) };
            let bbox = BBoxXYXY::from_xyxy(x1 * w, y1 * h, x2 * w, y2 * h);
            (bbox.width() > 0.0 && bbox.height() > 0.0).then_some(bbox)
        },
    )
}

pub fn arb_sized_box() -> impl Strategy<Value = (ImageSize, BBoxXYXY<Pixel>)> {
    arb_image_size().prop_flat_map(|size| (Just(size), arb_pixel_box_within(size)))
}

/// Any pixel point list, including ones outside the image and empty lists.
pub fn arb_points() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((-200.0..5000.0f64, -200.0..5000.0f64), 0..8)
}
