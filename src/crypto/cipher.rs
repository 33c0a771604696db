//! AEAD Cipher Module
//!
//! AES-256-GCM sealing and opening over raw key bytes.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use crate::crypto::kdf::KEY_LEN;
use crate::error::CryptoError;

/// AES-GCM nonce length (96 bits)
pub const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag length
pub const TAG_LEN: usize = 16;

/// Generates a fresh random nonce.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

// == Seal ==
/// Encrypts `plaintext`, returning ciphertext with the tag appended.
pub fn seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::Unsupported(format!("cipher init failed: {e}")))?;
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::Unsupported("AES-GCM encryption failed".to_string()))
}

// == Open ==
/// Decrypts and authenticates `ciphertext`.
///
/// Any authentication failure is an `IntegrityViolation`; no plaintext is
/// returned unless the tag verifies.
pub fn open(key: &[u8; KEY_LEN], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::InvalidInput(format!(
            "nonce must be {NONCE_LEN} bytes, got {}",
            nonce.len()
        )));
    }
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::InvalidInput(
            "ciphertext shorter than authentication tag".to_string(),
        ));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::Unsupported(format!("cipher init failed: {e}")))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::IntegrityViolation)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LEN] = [42; KEY_LEN];

    #[test]
    fn test_seal_then_open() {
        let nonce = generate_nonce();
        let sealed = seal(&KEY, &nonce, b"hello").unwrap();

        assert_eq!(sealed.len(), 5 + TAG_LEN);
        assert_eq!(open(&KEY, &nonce, &sealed).unwrap(), b"hello");
    }

    #[test]
    fn test_tampered_ciphertext_fails_integrity() {
        let nonce = generate_nonce();
        let mut sealed = seal(&KEY, &nonce, b"hello").unwrap();
        sealed[0] ^= 0x01;

        assert_eq!(open(&KEY, &nonce, &sealed), Err(CryptoError::IntegrityViolation));
    }

    #[test]
    fn test_wrong_key_fails_integrity() {
        let nonce = generate_nonce();
        let sealed = seal(&KEY, &nonce, b"hello").unwrap();

        assert_eq!(
            open(&[7; KEY_LEN], &nonce, &sealed),
            Err(CryptoError::IntegrityViolation)
        );
    }

    #[test]
    fn test_structural_errors_are_invalid_input() {
        assert!(matches!(
            open(&KEY, &[0; 8], &[0; 32]),
            Err(CryptoError::InvalidInput(_))
        ));
        assert!(matches!(
            open(&KEY, &[0; NONCE_LEN], &[0; 4]),
            Err(CryptoError::InvalidInput(_))
        ));
    }
}
