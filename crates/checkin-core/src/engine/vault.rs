// ── Engine: Credential Vault (spec §4.A) ───────────────────────────────────
// AES-256-GCM encrypt/decrypt of passwords with a fixed, externally
// configured 32-byte key. A fresh random 12-byte nonce is generated per
// encryption and prepended to the ciphertext; the combined buffer is
// base64-encoded. No prefix tag — output is plain base64 of
// `nonce || gcm_ciphertext_with_tag`, matching the original implementation's
// wire format.

use crate::atoms::error::{CheckinError, CheckinResult};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use zeroize::Zeroize;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypt `plaintext` with the given 32-byte key. Returns base64 of
/// `nonce || ciphertext_with_tag`.
pub fn encrypt(plaintext: &str, key: &[u8]) -> CheckinResult<String> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| CheckinError::ConfigInvalid("encryption key must be 32 bytes".into()))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CheckinError::Other("AES-256-GCM encryption failed".into()))?;

    let mut packed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    packed.extend_from_slice(&nonce_bytes);
    packed.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(packed))
}

/// Decrypt a value produced by [`encrypt`]. A tag mismatch or truncated
/// buffer is surfaced as `CredentialsCorrupted` (spec §4.A: "a tag-mismatch
/// is fatal to the calling operation").
pub fn decrypt(encoded: &str, key: &[u8]) -> CheckinResult<String> {
    let packed = STANDARD
        .decode(encoded)
        .map_err(|_| CheckinError::CredentialsCorrupted)?;

    if packed.len() < NONCE_LEN + TAG_LEN {
        return Err(CheckinError::CredentialsCorrupted);
    }

    let (nonce_bytes, ciphertext) = packed.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| CheckinError::ConfigInvalid("encryption key must be 32 bytes".into()))?;

    let mut plaintext_bytes = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CheckinError::CredentialsCorrupted)?;

    let result =
        String::from_utf8(plaintext_bytes.clone()).map_err(|_| CheckinError::CredentialsCorrupted);
    plaintext_bytes.zeroize();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> Vec<u8> {
        (0u8..32).collect()
    }

    #[test]
    fn round_trips() {
        let key = test_key();
        let ciphertext = encrypt("hunter2", &key).unwrap();
        assert_eq!(decrypt(&ciphertext, &key).unwrap(), "hunter2");
    }

    #[test]
    fn fresh_nonce_each_call() {
        let key = test_key();
        let a = encrypt("same plaintext", &key).unwrap();
        let b = encrypt("same plaintext", &key).unwrap();
        assert_ne!(a, b, "two encryptions of the same plaintext must differ");
    }

    #[test]
    fn wrong_key_is_credentials_corrupted() {
        let key = test_key();
        let other_key: Vec<u8> = (1u8..33).collect();
        let ciphertext = encrypt("secret", &key).unwrap();
        let result = decrypt(&ciphertext, &other_key);
        assert!(matches!(result, Err(CheckinError::CredentialsCorrupted)));
    }

    #[test]
    fn truncated_ciphertext_is_credentials_corrupted() {
        let key = test_key();
        let result = decrypt(&STANDARD.encode(b"short"), &key);
        assert!(matches!(result, Err(CheckinError::CredentialsCorrupted)));
    }

    #[test]
    fn malformed_base64_is_credentials_corrupted() {
        let key = test_key();
        let result = decrypt("not valid base64!!!", &key);
        assert!(matches!(result, Err(CheckinError::CredentialsCorrupted)));
    }

    #[test]
    fn rejects_wrong_key_length() {
        let short_key = vec![0u8; 16];
        assert!(encrypt("x", &short_key).is_err());
    }
}
