//! Fuzz target for packfile decoding.
//!
//! Tests that the decoder handles arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use verz_storage::MemoryStore;

fuzz_target!(|data: &[u8]| {
    let store = MemoryStore::new();
    let _ = verz_git::decode_pack(data, &store);
});
