// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

#![no_main]

use ampexp_core::overrides::OverrideList;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let list = OverrideList::parse(Some(raw));
    let reparsed = OverrideList::parse(Some(&list.serialize()));
    assert_eq!(list, reparsed);
    for (name, _) in list.iter() {
        assert!(!name.is_empty());
    }
});
