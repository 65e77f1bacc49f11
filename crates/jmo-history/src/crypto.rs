//! Raw-finding encryption at rest.
//!
//! AES-256-GCM with a key derived from `JMO_ENCRYPTION_KEY` via
//! PBKDF2-HMAC-SHA256. Stored blobs are `enc:v1:` followed by
//! base64(salt || nonce || ciphertext). There is no key rotation; decryption
//! with a wrong or missing key surfaces a clear error.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use crate::error::{HistoryError, Result};

/// Environment variable carrying the symmetric key material.
pub const ENCRYPTION_KEY_ENV: &str = "JMO_ENCRYPTION_KEY";

const PREFIX: &str = "enc:v1:";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const PBKDF2_ITERATIONS: u32 = 150_000;

/// True when the blob carries the encrypted-payload prefix.
pub fn is_encrypted(blob: &str) -> bool {
    blob.starts_with(PREFIX)
}

fn derive_key(key_material: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(key_material.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

/// Encrypt a raw-finding blob with key material from the environment.
pub fn encrypt_raw(plaintext: &str, key_material: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let key_bytes = derive_key(key_material, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
        .map_err(|_| HistoryError::Crypto("encryption failed".to_string()))?;

    let mut payload = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    payload.extend_from_slice(&salt);
    payload.extend_from_slice(&nonce_bytes);
    payload.extend_from_slice(&ciphertext);
    Ok(format!("{PREFIX}{}", BASE64.encode(payload)))
}

/// Decrypt a blob produced by [`encrypt_raw`]. Tamper or a wrong key fails
/// the GCM tag check and surfaces as a crypto error.
pub fn decrypt_raw(blob: &str, key_material: &str) -> Result<String> {
    let encoded = blob
        .strip_prefix(PREFIX)
        .ok_or_else(|| HistoryError::Crypto("blob is not encrypted".to_string()))?;
    let payload = BASE64
        .decode(encoded)
        .map_err(|e| HistoryError::Crypto(format!("base64 decode failed: {e}")))?;
    if payload.len() < SALT_LEN + NONCE_LEN {
        return Err(HistoryError::Crypto("payload too short".to_string()));
    }
    let (salt, rest) = payload.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let key_bytes = derive_key(key_material, salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| {
            HistoryError::Crypto("decryption failed: wrong key or tampered payload".to_string())
        })?;
    String::from_utf8(plaintext)
        .map_err(|_| HistoryError::Crypto("decrypted payload is not UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let blob = encrypt_raw(r#"{"Raw": "secret"}"#, "passphrase").unwrap();
        assert!(is_encrypted(&blob));
        let plain = decrypt_raw(&blob, "passphrase").unwrap();
        assert_eq!(plain, r#"{"Raw": "secret"}"#);
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = encrypt_raw("data", "right-key").unwrap();
        assert!(matches!(
            decrypt_raw(&blob, "wrong-key"),
            Err(HistoryError::Crypto(_))
        ));
    }

    #[test]
    fn test_tampered_payload_fails() {
        let blob = encrypt_raw("data", "key").unwrap();
        let mut payload = BASE64.decode(blob.strip_prefix(PREFIX).unwrap()).unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0xff;
        let tampered = format!("{PREFIX}{}", BASE64.encode(payload));
        assert!(decrypt_raw(&tampered, "key").is_err());
    }

    #[test]
    fn test_unique_ciphertexts_per_call() {
        let a = encrypt_raw("same", "key").unwrap();
        let b = encrypt_raw("same", "key").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_plain_blob_detection() {
        assert!(!is_encrypted(r#"{"Raw": "x"}"#));
        assert!(decrypt_raw("not encrypted", "key").is_err());
    }
}
