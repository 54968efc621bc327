//! Fuzz target for COCO JSON parsing.
//!
//! Feeds arbitrary bytes to the COCO parser and, when they parse, builds
//! the class registry and per-image records from them.
//!
//! Run with:
//!   cargo +nightly fuzz run coco_json_parse
//!
//! Or with a corpus:
//!   cargo +nightly fuzz run coco_json_parse fuzz/corpus/coco_json_parse/

#![no_main]

use libfuzzer_sys::fuzz_target;
use yoloprep::convert::coco::{convert_coco_records, from_coco_slice, registry_from_coco};
use yoloprep::convert::ConversionReport;

fuzz_target!(|data: &[u8]| {
    // Cap input size to avoid OOM on very large inputs.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(coco) = from_coco_slice(data) else {
        return;
    };
    let Ok(registry) = registry_from_coco(&coco) else {
        return;
    };
    let mut report = ConversionReport::new("<fuzz>");
    let _ = convert_coco_records(&coco, &registry, &mut report);
});
