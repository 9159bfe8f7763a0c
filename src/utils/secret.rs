//! Random token generation and hashing for the short-lived auth artifacts.
//!
//! Two hashing regimes coexist on purpose: OAuth client secrets go through
//! argon2id (attacker-chosen, low-entropy input), while OTPs and
//! verification tokens are already high-entropy and are stored as plain
//! SHA-256 hex for fast lookup.

use argon2::{
    password_hash::{rand_core::OsRng as PasswordOsRng, PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::FlowError;

/// Length of the opaque public identifier exposed on the wire.
pub const PUBLIC_ID_LENGTH: usize = 14;

/// Length of opaque session identifiers.
pub const SESSION_ID_LENGTH: usize = 43;

/// Alphanumeric charset for public ids and session ids.
const OPAQUE_ID_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a 14-character opaque public id for wire exposure.
pub fn generate_public_id() -> String {
    random_string(PUBLIC_ID_LENGTH)
}

/// Generate an opaque session identifier.
pub fn generate_session_id() -> String {
    random_string(SESSION_ID_LENGTH)
}

/// Generate the OAuth `state` round-trip value: 32 random bytes,
/// base64url-encoded without padding.
pub fn generate_state_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a single-use CSRF token for the consent form.
pub fn generate_csrf_token() -> String {
    generate_state_token()
}

/// Generate an email-verification token: 256 bits of randomness,
/// base64url-encoded without padding. The plaintext goes into the mailed
/// URL; only its SHA-256 hex is stored.
pub fn generate_verification_token() -> String {
    generate_state_token()
}

/// Generate a 6-digit numeric OTP, uniform over 000000..=999999.
pub fn generate_otp() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", n)
}

fn random_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..OPAQUE_ID_CHARSET.len());
            OPAQUE_ID_CHARSET[idx] as char
        })
        .collect()
}

/// SHA-256 hex digest used to store OTPs and verification tokens.
/// Lookups compare by hash only; the plaintext is never persisted or logged.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash an OAuth client secret with argon2id (default parameters).
/// The admin surface that registers clients is the writer; the core only
/// verifies.
#[allow(dead_code)]
pub fn hash_client_secret(secret: &str) -> Result<String, FlowError> {
    let salt = SaltString::generate(&mut PasswordOsRng);
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| FlowError::InternalError(anyhow::anyhow!("secret hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Verify a client secret against its stored argon2id hash.
///
/// Argon2's verifier is constant-time over the derived key. A mismatch is
/// an error, not a boolean, so callers cannot forget to check it.
pub fn verify_client_secret(secret: &str, stored_hash: &str) -> Result<(), FlowError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| FlowError::InternalError(anyhow::anyhow!("bad secret hash: {}", e)))?;
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .map_err(|_| FlowError::InvalidClientSecret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_id_shape() {
        let id = generate_public_id();
        assert_eq!(id.len(), PUBLIC_ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_public_id_uniqueness() {
        assert_ne!(generate_public_id(), generate_public_id());
    }

    #[test]
    fn test_session_id_shape() {
        let id = generate_session_id();
        assert_eq!(id.len(), SESSION_ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_state_token_is_base64url_of_32_bytes() {
        let state = generate_state_token();
        // 32 bytes -> 43 base64url chars without padding
        assert_eq!(state.len(), 43);
        assert!(state
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_otp_is_six_digits() {
        for _ in 0..100 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_sha256_hex_is_deterministic() {
        let a = sha256_hex("123456");
        let b = sha256_hex("123456");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sha256_hex_differs_by_input() {
        assert_ne!(sha256_hex("123456"), sha256_hex("123457"));
    }

    #[test]
    fn test_client_secret_round_trip() {
        let secret = generate_state_token();
        let hash = hash_client_secret(&secret).unwrap();

        assert_ne!(secret, hash);
        assert!(verify_client_secret(&secret, &hash).is_ok());
    }

    #[test]
    fn test_client_secret_mismatch() {
        let hash = hash_client_secret("correct-secret").unwrap();
        let result = verify_client_secret("wrong-secret", &hash);
        assert!(matches!(result, Err(FlowError::InvalidClientSecret)));
    }

    #[test]
    fn test_client_secret_hashes_are_salted() {
        let hash1 = hash_client_secret("same").unwrap();
        let hash2 = hash_client_secret("same").unwrap();
        assert_ne!(hash1, hash2);
        assert!(verify_client_secret("same", &hash1).is_ok());
        assert!(verify_client_secret("same", &hash2).is_ok());
    }
}
