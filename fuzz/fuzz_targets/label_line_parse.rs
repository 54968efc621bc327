//! Fuzz target for single-line label parsing and range checks.

#![no_main]

use libfuzzer_sys::fuzz_target;
use yoloprep::record::parse_label_line;
use yoloprep::registry::ClassRegistry;
use yoloprep::validation::check_line;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(registry) = ClassRegistry::from_names(["a", "b", "c"]) else {
        return;
    };

    if let Ok(Some(parsed)) = parse_label_line(line) {
        let mut issues = Vec::new();
        check_line(&parsed, 1, &registry, &mut issues);
    }
});
