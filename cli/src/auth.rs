use std::fmt::Write;

use chrono::{DateTime, Duration, Utc};
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const SESSION_DAYS: i64 = 30;

const HASH_SCHEME: &str = "pbkdf2-sha256";
const PBKDF2_ITERATIONS: u32 = if cfg!(test) { 1_000 } else { 210_000 };

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

/// Hash a password as `pbkdf2-sha256$<iterations>$<salt>$<hash>`, salt and
/// hash hex-encoded.
pub fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::rng().random();
    let salt = to_hex(&salt);
    let key = derive_key(password, salt.as_bytes(), PBKDF2_ITERATIONS);
    format!("{HASH_SCHEME}${PBKDF2_ITERATIONS}${salt}${}", to_hex(&key))
}

/// Check a password against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    if iterations == 0 {
        return false;
    }

    let actual = to_hex(&derive_key(password, salt.as_bytes(), iterations));
    actual.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Opaque bearer token: 32 random bytes, hex.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    to_hex(&bytes)
}

pub fn session_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(SESSION_DAYS)
}
