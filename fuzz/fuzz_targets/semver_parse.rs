#![no_main]

use hopic_version::{SemVer, VersionFormat};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Some(v) = SemVer::parse(data) {
        // A version that parses must render back to something that parses
        // to an equal value.
        let rendered = v.to_string();
        let reparsed = SemVer::parse(&rendered).expect("rendered form reparses");
        assert_eq!(v, reparsed);

        let _ = v.next_major();
        let _ = v.next_minor();
        let _ = v.next_patch();
        let _ = v.next_prerelease(None);
    }
});
