//! Fuzz target for pkt-line decoding.
//!
//! The cursor must never panic or loop on arbitrary input, and every
//! frame it yields must survive a re-encode.

#![no_main]

use libfuzzer_sys::fuzz_target;
use verz_git::PktLineCursor;

fuzz_target!(|data: &[u8]| {
    let mut cursor = PktLineCursor::new(data);

    while !cursor.is_exhausted() {
        let start = cursor.offset();
        match cursor.read() {
            Ok(pkt) => {
                assert!(cursor.offset() > start);
                let encoded = pkt.encode().expect("decoded frame re-encodes");
                assert_eq!(encoded.len(), cursor.offset() - start);
                let (again, _) = verz_git::decode_one(&encoded, 0).expect("re-encoded frame decodes");
                assert_eq!(again, pkt);
            }
            Err(_) => break,
        }
    }
});
