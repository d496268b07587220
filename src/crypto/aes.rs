use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::{Engine as _, engine::general_purpose};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::token::IdentityError;

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// The size of the AES-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// The process-wide key used to seal identity tokens.
///
/// Key material is zeroized on drop. `Debug` prints the fingerprint only.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Creates a new `SymmetricKey` from a byte array.
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self(key)
    }

    /// Builds a key from a slice, returning `None` unless it is exactly `KEY_SIZE` bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let key: [u8; KEY_SIZE] = bytes.try_into().ok()?;
        Some(Self(key))
    }

    /// Returns a reference to the key as a byte array.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// URL-safe base64 text form, as kept alongside session records.
    pub fn to_base64(&self) -> String {
        general_purpose::URL_SAFE.encode(self.0)
    }

    /// Parses the text form produced by [`SymmetricKey::to_base64`].
    pub fn from_base64(text: &str) -> Option<Self> {
        let mut bytes = general_purpose::URL_SAFE.decode(text).ok()?;
        let key = Self::from_slice(&bytes);
        bytes.zeroize();
        key
    }

    /// A short, non-reversible identifier for logs: the first 4 bytes of
    /// SHA-256 over the key, hex encoded.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..4])
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.0[..].ct_eq(&other.0[..]).into()
    }
}

impl Eq for SymmetricKey {}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SymmetricKey").field(&self.fingerprint()).finish()
    }
}

/// Generates a new random AES-256 key from the OS CSPRNG.
pub fn generate_key() -> SymmetricKey {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    let secure = SymmetricKey::new(key);
    key.zeroize();
    secure
}

/// Generates a new random AES-GCM nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypts `plaintext` under `key` with AES-256-GCM, binding `aad`.
///
/// # Returns
///
/// The ciphertext (with the 16-byte tag appended) and the fresh nonce used.
pub fn encrypt(
    key: &SymmetricKey,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; NONCE_SIZE]), IdentityError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let nonce_bytes = generate_nonce();
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|e| IdentityError::Encryption(format!("Encryption failed: {}", e)))?;

    Ok((ciphertext, nonce_bytes))
}

/// Decrypts and authenticates `ciphertext` (tag included) under `key`.
///
/// Any verification failure (wrong key, altered bytes, truncation,
/// different `aad`) yields [`IdentityError::AuthenticationFailed`].
pub fn decrypt(
    key: &SymmetricKey,
    ciphertext: &[u8],
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
) -> Result<Vec<u8>, IdentityError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Nonce::from(*nonce);

    cipher
        .decrypt(&nonce, Payload { msg: ciphertext, aad })
        .map_err(|_| IdentityError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_recovers_plaintext() {
        let key = generate_key();
        let (ciphertext, nonce) = encrypt(&key, b"owx_abc123", b"v1").unwrap();

        assert_eq!(ciphertext.len(), b"owx_abc123".len() + TAG_SIZE);
        assert_eq!(decrypt(&key, &ciphertext, &nonce, b"v1").unwrap(), b"owx_abc123");
    }

    #[test]
    fn decrypt_rejects_wrong_key_and_wrong_aad() {
        let key = generate_key();
        let other = generate_key();
        let (ciphertext, nonce) = encrypt(&key, b"subject", b"v1").unwrap();

        assert!(matches!(
            decrypt(&other, &ciphertext, &nonce, b"v1"),
            Err(IdentityError::AuthenticationFailed)
        ));
        assert!(matches!(
            decrypt(&key, &ciphertext, &nonce, b"v2"),
            Err(IdentityError::AuthenticationFailed)
        ));
    }

    #[test]
    fn nonces_are_fresh_per_call() {
        let key = generate_key();
        let (a, nonce_a) = encrypt(&key, b"same", b"").unwrap();
        let (b, nonce_b) = encrypt(&key, b"same", b"").unwrap();

        assert_ne!(nonce_a, nonce_b);
        assert_ne!(a, b);
    }

    #[test]
    fn key_text_form_round_trips_and_rejects_bad_lengths() {
        let key = generate_key();
        let restored = SymmetricKey::from_base64(&key.to_base64()).unwrap();

        assert_eq!(restored, key);
        assert!(SymmetricKey::from_base64("c2hvcnQ=").is_none());
        assert!(SymmetricKey::from_slice(&[0u8; 16]).is_none());
    }

    #[test]
    fn debug_output_does_not_expose_key_material() {
        let key = SymmetricKey::new([7u8; KEY_SIZE]);
        let printed = format!("{:?}", key);

        assert!(printed.contains(&key.fingerprint()));
        assert!(!printed.contains(&hex::encode([7u8; KEY_SIZE])));
        assert_eq!(key.fingerprint().len(), 8);
    }
}
