//! Story-scoped pseudonyms and continuation tokens.
//!
//! Both are AES-256-GCM under a key derived from the server secret and the
//! story id. The nonce is derived from the key and the plaintext, so the
//! same input always produces the same output: a player's handle is
//! stable across requests and the turn engine stays a pure function.
//!
//! Encoded form: lowercase hex of `nonce || ciphertext || tag`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use cadex_core::error::DomainError;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Failure to encode or decode a handle or token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The input is not hex.
    #[error("token is not valid hex: {0}")]
    Malformed(String),

    /// The input is shorter than a nonce plus an authentication tag.
    #[error("token is truncated ({0} bytes)")]
    Truncated(usize),

    /// Authentication failed: wrong story, wrong secret or tampered bytes.
    #[error("token does not belong to this story")]
    Rejected,

    /// The decrypted bytes are not UTF-8.
    #[error("decoded text is not valid UTF-8")]
    NotUtf8,

    /// The cipher refused the plaintext.
    #[error("encryption failed")]
    Encrypt,
}

impl From<CodecError> for DomainError {
    fn from(err: CodecError) -> Self {
        DomainError::Decode(err.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
enum Purpose {
    Handle,
    Continuation,
}

impl Purpose {
    fn label(self) -> &'static [u8] {
        match self {
            Purpose::Handle => b"cadex.handle",
            Purpose::Continuation => b"cadex.continuation",
        }
    }
}

/// Deterministic, reversible encoder for player handles and hand-off text.
#[derive(Clone)]
pub struct PrivacyCodec {
    secret: Vec<u8>,
}

impl std::fmt::Debug for PrivacyCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivacyCodec")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl PrivacyCodec {
    /// Creates a codec keyed by `secret`.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Story-scoped pseudonym for `real_id`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encrypt` if the cipher rejects the input.
    pub fn handle(&self, story_id: Uuid, real_id: &str) -> Result<String, CodecError> {
        self.seal(Purpose::Handle, story_id, real_id)
    }

    /// Recovers the real id behind a handle.
    ///
    /// # Errors
    ///
    /// Returns a `CodecError` if the handle was not produced for this story.
    pub fn reveal_handle(&self, story_id: Uuid, handle: &str) -> Result<String, CodecError> {
        self.open(Purpose::Handle, story_id, handle)
    }

    /// Encrypts hand-off text for the shared story document.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encrypt` if the cipher rejects the input.
    pub fn token(&self, story_id: Uuid, plaintext: &str) -> Result<String, CodecError> {
        self.seal(Purpose::Continuation, story_id, plaintext)
    }

    /// Decrypts a continuation token.
    ///
    /// # Errors
    ///
    /// Returns a `CodecError` for malformed, truncated or foreign tokens.
    pub fn detoken(&self, story_id: Uuid, token: &str) -> Result<String, CodecError> {
        self.open(Purpose::Continuation, story_id, token)
    }

    fn key(&self, purpose: Purpose, story_id: Uuid) -> [u8; 32] {
        let digest = Sha256::new()
            .chain_update(&self.secret)
            .chain_update([0u8])
            .chain_update(purpose.label())
            .chain_update([0u8])
            .chain_update(story_id.as_bytes())
            .finalize();
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        key
    }

    fn cipher(&self, purpose: Purpose, story_id: Uuid) -> (Aes256Gcm, [u8; 32]) {
        let key = self.key(purpose, story_id);
        (Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)), key)
    }

    fn seal(&self, purpose: Purpose, story_id: Uuid, plaintext: &str) -> Result<String, CodecError> {
        let (cipher, key) = self.cipher(purpose, story_id);
        let digest = Sha256::new()
            .chain_update(key)
            .chain_update(plaintext.as_bytes())
            .finalize();
        let nonce = Nonce::from_slice(&digest[..NONCE_LEN]);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CodecError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce);
        out.extend_from_slice(&ciphertext);
        Ok(hex::encode(out))
    }

    fn open(&self, purpose: Purpose, story_id: Uuid, encoded: &str) -> Result<String, CodecError> {
        let bytes = hex::decode(encoded).map_err(|e| CodecError::Malformed(e.to_string()))?;
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(CodecError::Truncated(bytes.len()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let (cipher, _) = self.cipher(purpose, story_id);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CodecError::Rejected)?;
        String::from_utf8(plaintext).map_err(|_| CodecError::NotUtf8)
    }
}
