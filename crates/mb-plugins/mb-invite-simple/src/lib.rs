//! # mb-invite-simple
//!
//! SHA-256 based implementation of `InviteCodeProvider`.
//! Codes are 8 characters from an alphabet without look-alikes (no 0/O, 1/I/L),
//! so they survive being read aloud or typed from a screenshot.

use mb_core::traits::InviteCodeProvider;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

pub const CODE_LEN: usize = 8;

const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

pub struct SimpleInviteCodes {
    /// Secret mixed into every code so codes can't be derived from the counter.
    salt: String,
    /// Keeps codes distinct even if the OS randomness source fails.
    counter: AtomicU64,
}

impl SimpleInviteCodes {
    /// Accepts a salt string (e.g., from configuration)
    pub fn new(salt: &str) -> Self {
        Self {
            salt: salt.to_string(),
            counter: AtomicU64::new(0),
        }
    }

    fn encode(digest: &[u8]) -> String {
        digest
            .iter()
            .take(CODE_LEN)
            .map(|b| ALPHABET[(*b as usize) % ALPHABET.len()] as char)
            .collect()
    }
}

impl InviteCodeProvider for SimpleInviteCodes {
    /// Generates a code such as `K7QX3MPA`.
    fn generate(&self) -> String {
        let mut nonce = [0u8; 16];
        if let Err(e) = getrandom::getrandom(&mut nonce) {
            // Still unique per group; only less unpredictable.
            tracing::warn!(error = %e, "os randomness unavailable for invite code");
        }
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(self.counter.fetch_add(1, Ordering::Relaxed).to_be_bytes());
        hasher.update(nonce);
        Self::encode(&hasher.finalize())
    }

    /// Uppercases, strips spaces and dashes, and checks length and alphabet.
    fn normalize(&self, input: &str) -> Option<String> {
        let code: String = input
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let valid = code.len() == CODE_LEN
            && code.bytes().all(|b| ALPHABET.contains(&b));
        valid.then_some(code)
    }
}
