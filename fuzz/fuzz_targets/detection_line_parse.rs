//! Fuzz target for detector report line parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use yoloprep::convert::detections::parse_detection_line;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    let _ = parse_detection_line(line);
});
