use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::endpoint::EndpointId;
use crate::mss::MSS_TABLE;

/// SHA-1's block size; the nonces are sized to match it so a single block
/// carries each one in the hash primitive below.
const NONCE_LEN: usize = 64;

/// Cookies live roughly 64s-192s depending on how close to a 64s boundary
/// they were minted. Overridable per codec via `CookieConfig::max_timestamp_diff`
/// for environments with unusually high round-trip latency.
pub const DEFAULT_MAX_TS_DIFF: u32 = 2;

/// 64-second quanta, i.e. `epoch_seconds >> TS_SHIFT`.
const TS_SHIFT: u32 = 6;

/// Deterministic keyed hash over a 4-tuple, a timestamp, and one of the
/// listener's two nonces, used both to mint cookies and to revalidate them.
///
/// Two independent nonces prevent an attacker who observes one cookie from
/// deriving related ones; neither nonce rotates or is ever transmitted.
pub struct CookieCodec {
    nonces: [[u8; NONCE_LEN]; 2],
    hasher: Mutex<Sha1>,
    max_ts_diff: u32,
}

impl CookieCodec {
    /// Draw two fresh 512-bit nonces from a cryptographic RNG. `max_ts_diff`
    /// is the number of 64-second quanta a minted cookie remains valid for.
    pub fn new(max_ts_diff: u32) -> Self {
        let mut nonces = [[0u8; NONCE_LEN]; 2];
        OsRng.fill_bytes(&mut nonces[0]);
        OsRng.fill_bytes(&mut nonces[1]);
        Self {
            nonces,
            hasher: Mutex::new(Sha1::new()),
            max_ts_diff,
        }
    }

    /// `H(id, ts, nonce_index)`: first 4 bytes of
    /// `SHA1(local_port || remote_port || ts || nonce || local_addr || remote_addr)`,
    /// read as a big-endian u32. The shared engine is reset between calls.
    fn hash(&self, id: &EndpointId, ts: u32, nonce_index: usize) -> u32 {
        let mut hasher = self.hasher.lock().expect("cookie hasher mutex poisoned");
        Digest::reset(&mut *hasher);
        hasher.update(id.local_port.to_be_bytes());
        hasher.update(id.remote_port.to_be_bytes());
        hasher.update(ts.to_be_bytes());
        hasher.update(self.nonces[nonce_index]);
        hasher.update(&id.local_addr);
        hasher.update(&id.remote_addr);
        let digest = hasher.finalize_reset();
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    fn current_timestamp() -> u32 {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_secs();
        ((secs >> TS_SHIFT) & 0xFF) as u32
    }

    /// Mint a cookie for `(id, client_seq, data)`. `data` is the 2-bit MSS
    /// class folded into the low bits; the top byte is the 64-second
    /// timestamp quantum, with any carry from the low-24-bit addition
    /// absorbed into it (this is intentional — validation undoes the same
    /// 32-bit wrapping arithmetic in reverse).
    pub fn create_cookie(&self, id: &EndpointId, client_seq: u32, data: u32) -> u32 {
        self.create_cookie_at(id, client_seq, data, Self::current_timestamp())
    }

    /// Revalidate a returned cookie. Returns the recovered MSS-table index
    /// if the cookie is within its lifetime and `data` indexes a valid MSS
    /// slot; `None` otherwise (unknown, expired, or forged).
    pub fn validate_cookie(&self, id: &EndpointId, cookie: u32, client_seq: u32) -> Option<u32> {
        self.validate_cookie_at(id, cookie, client_seq, Self::current_timestamp())
    }

    fn create_cookie_at(&self, id: &EndpointId, client_seq: u32, data: u32, ts: u32) -> u32 {
        let high8 = ts << 24;
        let h0 = self.hash(id, 0, 0);
        let h1 = self.hash(id, ts, 1);

        let v = h0.wrapping_add(client_seq).wrapping_add(high8);
        v.wrapping_add(h1.wrapping_add(data) & 0x00FF_FFFF)
    }

    fn validate_cookie_at(&self, id: &EndpointId, cookie: u32, client_seq: u32, ts_now: u32) -> Option<u32> {
        let h0 = self.hash(id, 0, 0);

        let v = cookie.wrapping_sub(h0).wrapping_sub(client_seq);
        let cookie_ts = v >> 24;

        if (ts_now.wrapping_sub(cookie_ts)) & 0xFF > self.max_ts_diff {
            return None;
        }

        let h1 = self.hash(id, cookie_ts, 1);
        let data = v.wrapping_sub(h1) & 0x00FF_FFFF;

        if (data as usize) < MSS_TABLE.len() {
            Some(data)
        } else {
            None
        }
    }
}

impl Default for CookieCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TS_DIFF)
    }
}
