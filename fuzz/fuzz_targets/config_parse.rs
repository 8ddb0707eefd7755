#![no_main]

use std::collections::HashMap;

use camino::Utf8Path;
use hopic_config::{InterpolationValue, NoExtensions};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let mut vars = HashMap::new();
    vars.insert("WORKSPACE".to_string(), InterpolationValue::Present("/ws".to_string()));
    let _ = hopic_config::load_str(data, Utf8Path::new("."), &NoExtensions, &vars);
});
