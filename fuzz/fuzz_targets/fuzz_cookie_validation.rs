#![no_main]

use libfuzzer_sys::fuzz_target;
use syn_acceptor::cookie::{CookieCodec, DEFAULT_MAX_TS_DIFF};
use syn_acceptor::endpoint::EndpointId;

// Feeds arbitrary bytes as a claimed cookie against a freshly keyed codec.
// Validation must never panic, and must be deterministic for a fixed input
// (the two calls land within the same 64s quantum for any reasonable fuzz
// iteration time).

fuzz_target!(|data: &[u8]| {
    if data.len() < 16 {
        return;
    }

    let local_addr = data[0..4].to_vec();
    let remote_addr = data[4..8].to_vec();
    let local_port = u16::from_be_bytes([data[8], data[9]]);
    let remote_port = u16::from_be_bytes([data[10], data[11]]);
    let client_seq = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);
    let claimed_cookie = u32::from_be_bytes([
        data.get(16).copied().unwrap_or(0),
        data.get(17).copied().unwrap_or(0),
        data.get(18).copied().unwrap_or(0),
        data.get(19).copied().unwrap_or(0),
    ]);

    let id = EndpointId::new(local_addr, local_port, remote_addr, remote_port);
    let codec = CookieCodec::new(DEFAULT_MAX_TS_DIFF);

    let first = codec.validate_cookie(&id, claimed_cookie, client_seq);
    let second = codec.validate_cookie(&id, claimed_cookie, client_seq);
    assert_eq!(first, second, "validation must be deterministic for a fixed input");

    if let Some(recovered) = first {
        assert!(recovered < 4, "validated cookie must recover an in-range MSS index");
    }
});
