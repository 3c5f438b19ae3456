//! Fuzz target for the upload-pack response parser.
//!
//! The first byte picks a read size; the rest is fed in pieces of that
//! size. Errors are expected, panics are not.

#![no_main]

use libfuzzer_sys::fuzz_target;
use verz_git::UploadPackParser;

fuzz_target!(|data: &[u8]| {
    let Some((&chunk, body)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(chunk).max(1);

    let mut parser = UploadPackParser::new();
    for piece in body.chunks(chunk) {
        if parser.feed(piece).is_err() {
            return;
        }
    }
    let _ = parser.into_packfile();
});
