#![no_main]

use libfuzzer_sys::fuzz_target;
use syn_acceptor::cookie::{CookieCodec, DEFAULT_MAX_TS_DIFF};
use syn_acceptor::endpoint::EndpointId;

// For any (id, client_seq, data) with data < 4, creating then immediately
// validating a cookie must recover exactly `data` (spec invariant 2).

fuzz_target!(|data: &[u8]| {
    if data.len() < 14 {
        return;
    }

    let local_addr = data[0..4].to_vec();
    let remote_addr = data[4..8].to_vec();
    let local_port = u16::from_be_bytes([data[8], data[9]]);
    let remote_port = u16::from_be_bytes([data[10], data[11]]);
    let client_seq = u32::from_be_bytes([data[12], data[13], data.get(14).copied().unwrap_or(0), data.get(15).copied().unwrap_or(0)]);
    let mss_index = (data[0] % 4) as u32;

    let id = EndpointId::new(local_addr, local_port, remote_addr, remote_port);
    let codec = CookieCodec::new(DEFAULT_MAX_TS_DIFF);

    let cookie = codec.create_cookie(&id, client_seq, mss_index);
    assert_eq!(codec.validate_cookie(&id, cookie, client_seq), Some(mss_index));
});
