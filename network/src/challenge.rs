//! Address-bound challenge tokens for V2 queries.
//!
//! Prevents reflection/amplification: before any response longer than its
//! request is emitted, the client must complete one round-trip to prove it
//! owns its source address. The service keeps no per-client state; tokens
//! are recomputed from the secret on every verification.
//!
//! Token format (32 bytes):
//! - bytes 0..3: timestamp window (big-endian)
//! - bytes 4..7: reserved (zero)
//! - bytes 8..31: HMAC-SHA256(window ‖ client address bytes), truncated to 24

use std::net::IpAddr;

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use hyquery_protocol::v2::CHALLENGE_TOKEN_SIZE;
use hyquery_protocol::wire::constant_time_eq;
use hyquery_utils::time::unix_seconds;

type HmacSha256 = Hmac<Sha256>;

/// Tokens are minted against 30-second epoch windows.
const WINDOW_SECONDS: u64 = 30;
/// Length of the generated secret when none is configured.
const EPHEMERAL_SECRET_LENGTH: usize = 32;
/// Truncated MAC length carried in the token.
const TOKEN_MAC_LENGTH: usize = 24;

/// Stateless challenge token mint/verify service.
///
/// The key material is read-only after construction, so the service is safe
/// to share across dispatch threads.
pub struct ChallengeService {
    secret: Vec<u8>,
    validity_windows: u32,
}

impl ChallengeService {
    /// Create a service with an explicit secret.
    pub fn new(secret: Vec<u8>, validity_seconds: u32) -> Self {
        let clamped = validity_seconds.max(1) as u64;
        let validity_windows = clamped.div_ceil(WINDOW_SECONDS).max(1) as u32;
        Self {
            secret,
            validity_windows,
        }
    }

    /// Create a service from operator configuration. An empty secret means
    /// tokens are minted from 32 fresh random bytes and invalidate on
    /// restart.
    pub fn from_config(configured_secret: &str, validity_seconds: u32) -> Self {
        let secret = if configured_secret.trim().is_empty() {
            let mut bytes = vec![0u8; EPHEMERAL_SECRET_LENGTH];
            rand::thread_rng().fill_bytes(&mut bytes);
            bytes
        } else {
            configured_secret.as_bytes().to_vec()
        };
        Self::new(secret, validity_seconds)
    }

    /// Mint a token bound to `addr` for the current window.
    pub fn mint(&self, addr: IpAddr) -> [u8; CHALLENGE_TOKEN_SIZE] {
        self.mint_at(addr, current_window())
    }

    /// Verify a token against the address it arrived from.
    pub fn verify(&self, token: &[u8], addr: IpAddr) -> bool {
        self.verify_at(token, addr, current_window())
    }

    fn mint_at(&self, addr: IpAddr, window: u32) -> [u8; CHALLENGE_TOKEN_SIZE] {
        let mut token = [0u8; CHALLENGE_TOKEN_SIZE];
        token[..4].copy_from_slice(&window.to_be_bytes());
        // bytes 4..8 stay zero (reserved)
        let mac = self.compute_mac(addr, window);
        token[8..].copy_from_slice(&mac[..TOKEN_MAC_LENGTH]);
        token
    }

    fn verify_at(&self, token: &[u8], addr: IpAddr, current: u32) -> bool {
        if token.len() != CHALLENGE_TOKEN_SIZE {
            return false;
        }

        let mut window_bytes = [0u8; 4];
        window_bytes.copy_from_slice(&token[..4]);
        let token_window = u32::from_be_bytes(window_bytes);

        // Accept only the sliding set of past windows; never the future.
        for i in 0..self.validity_windows {
            let expected_window = current.wrapping_sub(i);
            if token_window == expected_window {
                let expected = self.mint_at(addr, token_window);
                return constant_time_eq(token, &expected);
            }
        }

        false
    }

    fn compute_mac(&self, addr: IpAddr, window: u32) -> [u8; 32] {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(&window.to_be_bytes());
        match addr {
            IpAddr::V4(v4) => mac.update(&v4.octets()),
            IpAddr::V6(v6) => mac.update(&v6.octets()),
        }
        mac.finalize().into_bytes().into()
    }
}

fn current_window() -> u32 {
    (unix_seconds() / WINDOW_SECONDS) as u32
}
