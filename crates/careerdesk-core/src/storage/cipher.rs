use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;

use super::StoreError;

/// Fixed salt: the secret is already random, argon2 only stretches it to a key.
const KEY_SALT: &[u8] = b"careerdesk-store-v1";

const NONCE_LEN: usize = 12;

/// Length of freshly generated secrets, in bytes
const SECRET_LEN: usize = 32;

/// Seals store files with ChaCha20-Poly1305.
///
/// Sealed layout is `nonce (12 bytes) || ciphertext+tag`. Any tampering or a
/// wrong key fails authentication and surfaces as [`StoreError::Crypto`].
#[derive(Clone)]
pub struct StoreCipher {
    cipher: ChaCha20Poly1305,
}

impl StoreCipher {
    pub fn from_secret(secret: &[u8]) -> Result<Self, StoreError> {
        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(secret, KEY_SALT, &mut key)
            .map_err(|e| StoreError::Crypto(e.to_string()))?;

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    /// A new random secret, base64 encoded for keychain storage
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        STANDARD.encode(bytes)
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, StoreError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| StoreError::Crypto("encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, StoreError> {
        if sealed.len() < NONCE_LEN {
            return Err(StoreError::Crypto("sealed data too short".to_string()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StoreError::Crypto("authentication failed".to_string()))
    }
}
