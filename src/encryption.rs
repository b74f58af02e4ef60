use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher for refresh tokens kept in the users table.
///
/// Ciphertexts are `base64(nonce || ciphertext)` with a fresh random nonce
/// per call.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Build a cipher from a base64-encoded 32-byte key
    pub fn from_base64_key(key: &str) -> Result<Self> {
        let key_bytes = BASE64
            .decode(key)
            .context("Failed to decode encryption key")?;

        if key_bytes.len() != 32 {
            anyhow::bail!("Encryption key must be 32 bytes");
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes).context("Failed to create cipher")?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, data: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, data.as_bytes())
            .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

        let mut result = nonce.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(result))
    }

    pub fn decrypt(&self, encrypted_data: &str) -> Result<String> {
        let encrypted_bytes = BASE64
            .decode(encrypted_data)
            .context("Failed to decode encrypted data")?;

        if encrypted_bytes.len() < NONCE_LEN {
            anyhow::bail!("Invalid encrypted data: too short");
        }

        let (nonce_bytes, ciphertext) = encrypted_bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| anyhow::anyhow!("Decryption failed: {}", e))?;

        String::from_utf8(plaintext).context("Failed to convert decrypted data to string")
    }
}
