//! Symmetric string encryption for test data
//!
//! AES-256-GCM with a random 96-bit nonce; ciphertexts are
//! `base64(nonce || ciphertext)`.

use crate::{Error, Result};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Environment variable holding the base64-encoded 32-byte key
pub const ENCRYPTION_KEY_ENV: &str = "TESTFORGE_ENCRYPTION_KEY";

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher for short strings
#[derive(Clone)]
pub struct StringCipher {
    cipher: Aes256Gcm,
}

impl StringCipher {
    /// Create a cipher from raw key bytes (must be 32 bytes)
    pub fn new(key: &[u8]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| Error::Crypto(format!("Invalid key length {} (expected 32)", key.len())))?;
        Ok(Self { cipher })
    }

    /// Create a cipher from a base64-encoded key
    pub fn from_base64(key: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(key.trim())
            .map_err(|e| Error::Crypto(format!("Invalid key encoding: {}", e)))?;
        Self::new(&bytes)
    }

    /// Create a cipher from `TESTFORGE_ENCRYPTION_KEY`
    pub fn from_env() -> Result<Self> {
        let key = std::env::var(ENCRYPTION_KEY_ENV)
            .map_err(|_| Error::InvalidConfig(format!("{} is not set", ENCRYPTION_KEY_ENV)))?;
        Self::from_base64(&key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| Error::Crypto(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let data = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Crypto(format!("Invalid ciphertext encoding: {}", e)))?;
        if data.len() <= NONCE_LEN {
            return Err(Error::Crypto("Ciphertext too short".to_string()));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| Error::Crypto(e.to_string()))?;
        String::from_utf8(plaintext).map_err(|e| Error::Crypto(e.to_string()))
    }
}

impl std::fmt::Debug for StringCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringCipher").finish_non_exhaustive()
    }
}
