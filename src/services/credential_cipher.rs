//! Field-level encryption for integration credentials
//!
//! Credentials are serialized to JSON, sealed with AES-256-GCM under a random
//! 96-bit nonce and stored as `base64(nonce || ciphertext)`. Plaintext never
//! reaches the database.

use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use thiserror::Error;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),
    #[error("Encryption failed: {0}")]
    Encrypt(String),
    #[error("Decryption failed: {0}")]
    Decrypt(String),
    #[error("Invalid credential payload: {0}")]
    Payload(String),
}

/// Encrypt-on-write / decrypt-on-read for credential blobs
pub trait CredentialCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<String, CipherError>;
    fn decrypt(&self, sealed: &str) -> Result<Vec<u8>, CipherError>;
}

/// AES-256-GCM credential cipher
#[derive(Clone)]
pub struct AesGcmCredentialCipher {
    cipher: Arc<Aes256Gcm>,
}

impl AesGcmCredentialCipher {
    /// Build from a raw 32-byte key
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?;

        Ok(Self {
            cipher: Arc::new(cipher),
        })
    }

    /// Build from the base64 form used in `CREDENTIALS_ENCRYPTION_KEY`
    pub fn from_base64_key(encoded: &str) -> Result<Self, CipherError> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CipherError::InvalidKey(format!("not valid base64: {}", e)))?;
        Self::new(&key)
    }
}

impl CredentialCipher for AesGcmCredentialCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        // Format: [nonce (12 bytes)][ciphertext (variable)]
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(sealed))
    }

    fn decrypt(&self, sealed: &str) -> Result<Vec<u8>, CipherError> {
        let bytes = STANDARD
            .decode(sealed)
            .map_err(|e| CipherError::Decrypt(format!("not valid base64: {}", e)))?;

        if bytes.len() <= NONCE_LEN {
            return Err(CipherError::Decrypt("sealed payload too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| CipherError::Decrypt(e.to_string()))
    }
}

/// Serialize and encrypt a credential document
pub fn seal_credentials(
    cipher: &dyn CredentialCipher,
    credentials: &Value,
) -> Result<String, CipherError> {
    let plaintext =
        serde_json::to_vec(credentials).map_err(|e| CipherError::Payload(e.to_string()))?;
    cipher.encrypt(&plaintext)
}

/// Decrypt and deserialize a stored credential document
pub fn open_credentials(cipher: &dyn CredentialCipher, sealed: &str) -> Result<Value, CipherError> {
    let plaintext = cipher.decrypt(sealed)?;
    serde_json::from_slice(&plaintext).map_err(|e| CipherError::Payload(e.to_string()))
}
