#![no_main]

use hopic_version::GitVersion;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let parsed = GitVersion::from_description(data);
    let _ = parsed.exact();
    let _ = parsed.to_semver(None);
});
