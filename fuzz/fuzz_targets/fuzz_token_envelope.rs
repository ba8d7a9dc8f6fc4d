// Copyright (c) 2026 ampexp Contributors
// SPDX-License-Identifier: Apache-2.0

#![no_main]

use ampexp_token::{TokenEnvelope, SIGNATURE_LEN};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(envelope) = TokenEnvelope::decode(raw) {
        assert_eq!(envelope.signature().len(), SIGNATURE_LEN);
        assert_eq!(envelope.signed_bytes().len(), 5 + envelope.config_bytes().len());
        let _ = envelope.config();
    }
});
