// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

#![no_main]

use ampexp_core::page::Location;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(location) = Location::parse(raw) {
        let origin = location.origin();
        assert!(origin.contains("://"));
        let _ = location.hash_params();
    }
});
