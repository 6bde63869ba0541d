//! Time-based one-time passwords (RFC 6238) over HMAC-SHA256.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

const DIGITS: u32 = 6;
const SECRET_LEN: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct Totp {
    step_secs: u64,
    /// Neighbouring steps accepted on either side of the current one
    window: u64,
}

impl Totp {
    pub fn new(step_secs: u64) -> Self {
        Self {
            step_secs: step_secs.max(1),
            window: 1,
        }
    }

    pub fn generate_secret() -> Vec<u8> {
        let mut secret = vec![0u8; SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut secret);
        secret
    }

    pub fn code_at(&self, secret: &[u8], unix_secs: u64) -> String {
        hotp(secret, unix_secs / self.step_secs)
    }

    pub fn verify(&self, secret: &[u8], code: &str, unix_secs: u64) -> bool {
        let code = code.trim();
        if code.len() != DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        let counter = unix_secs / self.step_secs;
        let first = counter.saturating_sub(self.window);
        (first..=counter + self.window).any(|c| hotp(secret, c).as_bytes().ct_eq(code.as_bytes()).into())
    }
}

fn hotp(secret: &[u8], counter: u64) -> String {
    // HMAC accepts keys of any length
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = (u32::from(digest[offset]) & 0x7f) << 24
        | u32::from(digest[offset + 1]) << 16
        | u32::from(digest[offset + 2]) << 8
        | u32::from(digest[offset + 3]);
    format!("{:0width$}", binary % 10u32.pow(DIGITS), width = DIGITS as usize)
}
