//! Fuzz target for LabelMe JSON parsing and shape conversion.
//!
//! Run with:
//!   cargo +nightly fuzz run labelme_json_parse

#![no_main]

use libfuzzer_sys::fuzz_target;
use yoloprep::convert::labelme::fuzz_convert_labelme_slice;

fuzz_target!(|data: &[u8]| {
    // 10MB is generous for one annotation file.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = fuzz_convert_labelme_slice(data);
});
