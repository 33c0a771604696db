//! Secure Token Module

use rand::RngCore;

use crate::error::CryptoError;

/// Largest token accepted, in bytes
pub const MAX_TOKEN_BYTES: usize = 1024;

// == Generate Secure Token ==
/// Returns `length` CSPRNG bytes, hex-encoded.
pub fn generate_secure_token(length: usize) -> Result<String, CryptoError> {
    if length == 0 || length > MAX_TOKEN_BYTES {
        return Err(CryptoError::InvalidInput(format!(
            "token length must be between 1 and {MAX_TOKEN_BYTES} bytes, got {length}"
        )));
    }

    let mut bytes = vec![0u8; length];
    rand::rng().fill_bytes(&mut bytes);
    Ok(hex::encode(bytes))
}
