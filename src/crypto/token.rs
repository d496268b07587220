use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use thiserror::Error;

use crate::crypto::aes::{self, NONCE_SIZE, SymmetricKey, TAG_SIZE};
use crate::crypto::key_store::KeyProvider;
use crate::validation::auth::{validate_subject_id, validate_token_text};

/// Leading byte of every token; also bound as AEAD associated data.
pub const TOKEN_VERSION: u8 = 0x01;

const TIMESTAMP_SIZE: usize = 8;
const HEADER_SIZE: usize = 1 + NONCE_SIZE;

/// Failures of the identity token path.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// The subject id to encode was empty.
    #[error("subject id must not be empty")]
    EmptySubject,

    /// The subject id to encode exceeds the storable length.
    #[error("subject id must be at most {0} bytes")]
    SubjectTooLong(usize),

    /// The key store could not produce or create a key.
    #[error("identity key unavailable: {0}")]
    KeyUnavailable(String),

    /// The token is not valid transport encoding or has the wrong shape.
    #[error("malformed token")]
    MalformedToken,

    /// The ciphertext or tag did not verify under the current key.
    #[error("token authentication failed")]
    AuthenticationFailed,

    /// The token is older than the configured maximum age.
    #[error("token expired")]
    Expired,

    /// The cipher refused to seal the payload.
    #[error("encryption error: {0}")]
    Encryption(String),
}

impl IdentityError {
    /// Whether this failure means "the caller did not prove an identity",
    /// as opposed to a server-side fault.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            IdentityError::MalformedToken | IdentityError::AuthenticationFailed | IdentityError::Expired
        )
    }
}

/// Seals `subject_id` under `key` into the transport form:
/// base64url(version || nonce || AES-256-GCM(issued_at_be || subject_id)).
pub fn seal(key: &SymmetricKey, subject_id: &str, issued_at: u64) -> Result<String, IdentityError> {
    let mut plaintext = Vec::with_capacity(TIMESTAMP_SIZE + subject_id.len());
    plaintext.extend_from_slice(&issued_at.to_be_bytes());
    plaintext.extend_from_slice(subject_id.as_bytes());

    let (ciphertext, nonce) = aes::encrypt(key, &plaintext, &[TOKEN_VERSION])?;

    let mut raw = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    raw.push(TOKEN_VERSION);
    raw.extend_from_slice(&nonce);
    raw.extend_from_slice(&ciphertext);

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(raw))
}

/// Opens a token produced by [`seal`], returning the subject id and the
/// issue timestamp (unix seconds).
pub fn open(key: &SymmetricKey, token: &str) -> Result<(String, u64), IdentityError> {
    let raw = general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| IdentityError::MalformedToken)?;

    if raw.len() < HEADER_SIZE + TAG_SIZE || raw[0] != TOKEN_VERSION {
        return Err(IdentityError::MalformedToken);
    }

    let nonce: [u8; NONCE_SIZE] = raw[1..HEADER_SIZE]
        .try_into()
        .map_err(|_| IdentityError::MalformedToken)?;

    let plaintext = aes::decrypt(key, &raw[HEADER_SIZE..], &nonce, &[TOKEN_VERSION])?;

    if plaintext.len() <= TIMESTAMP_SIZE {
        return Err(IdentityError::MalformedToken);
    }
    let (stamp, subject) = plaintext.split_at(TIMESTAMP_SIZE);
    let issued_at = u64::from_be_bytes(stamp.try_into().map_err(|_| IdentityError::MalformedToken)?);
    let subject_id = String::from_utf8(subject.to_vec()).map_err(|_| IdentityError::MalformedToken)?;

    Ok((subject_id, issued_at))
}

fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Two-way mapping between a subject id and an opaque bearer token,
/// parameterized by the key provider it reads the process-wide key from.
pub struct TokenCodec<K> {
    keys: K,
    max_age: Option<Duration>,
}

impl<K: KeyProvider> TokenCodec<K> {
    /// Creates a codec whose tokens never expire.
    pub fn new(keys: K) -> Self {
        Self { keys, max_age: None }
    }

    /// Rejects tokens issued more than `max_age` ago.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// The key provider backing this codec.
    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// Encodes `subject_id` into a fresh token.
    pub async fn encode(&self, subject_id: &str) -> Result<String, IdentityError> {
        let (token, _) = self.encode_with_key(subject_id).await?;
        Ok(token)
    }

    /// Encodes `subject_id` and also hands back the key the token was sealed under.
    pub async fn encode_with_key(&self, subject_id: &str) -> Result<(String, SymmetricKey), IdentityError> {
        validate_subject_id(subject_id)?;

        let key = self.keys.get_or_create_key().await?;
        let token = seal(&key, subject_id, unix_now())?;

        tracing::debug!("🔐 Token issued for subject {} (key {})", subject_id, key.fingerprint());
        Ok((token, key))
    }

    /// Authenticates and decrypts `token`, returning the subject id it carries.
    pub async fn decode(&self, token: &str) -> Result<String, IdentityError> {
        validate_token_text(token)?;

        let key = self.keys.get_or_create_key().await?;
        let (subject_id, issued_at) = open(&key, token)?;

        if let Some(max_age) = self.max_age {
            let age = unix_now().saturating_sub(issued_at);
            if age > max_age.as_secs() {
                tracing::debug!("⌛ Token for subject {} is {}s old", subject_id, age);
                return Err(IdentityError::Expired);
            }
        }

        Ok(subject_id)
    }
}
