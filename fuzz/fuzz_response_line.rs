//! Fuzz target for the shim's response line decoder.
//!
//! Run with: cargo +nightly fuzz run fuzz_response_line
//!
//! Every byte sequence a broker sends must decode to a message, a blank line,
//! or an error. Decoded messages must survive a re-encode.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sockbridge_core::ShimResponse;

fuzz_target!(|data: &[u8]| {
    if let Ok(Some(response)) = ShimResponse::decode_line(data) {
        let line = response.encode_line().expect("decoded response re-encodes");
        let again = ShimResponse::decode_line(&line).expect("re-encoded line decodes");
        assert_eq!(again, Some(response));
    }
});
