//! Symmetric ciphers behind the obfuscation value filters.

use crate::error::{ConfigError, TransformError};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use std::fmt;
use std::sync::Arc;

/// AES-256-GCM nonce size (96 bits = 12 bytes)
const NONCE_SIZE: usize = 12;
/// AES-256 key size (256 bits = 32 bytes)
const KEY_SIZE: usize = 32;

/// Reversible cipher used by `obfuscate` and `deobfuscate`.
pub trait Cryptograph: Send + Sync {
    fn encrypt(&self, plain: &str) -> Result<Vec<u8>, TransformError>;

    fn decrypt(&self, encrypted: &[u8]) -> Result<String, TransformError>;
}

/// AES-256-GCM cryptograph. Encrypted payloads are the random nonce followed
/// by the ciphertext.
#[derive(Clone)]
pub struct AesCryptograph {
    cipher: Aes256Gcm,
}

impl AesCryptograph {
    /// Create a cryptograph from raw key bytes. Shorter keys are zero-padded,
    /// longer keys truncated.
    pub fn new(key: &[u8]) -> Result<Self, ConfigError> {
        let mut key_bytes = [0u8; KEY_SIZE];
        let len = key.len().min(KEY_SIZE);
        key_bytes[..len].copy_from_slice(&key[..len]);

        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| ConfigError::Cryptograph(format!("failed to create cipher: {}", e)))?;
        Ok(Self { cipher })
    }

    /// Create from a base64-encoded key.
    pub fn from_base64_key(key_b64: &str) -> Result<Self, ConfigError> {
        let key = BASE64
            .decode(key_b64.trim())
            .map_err(|e| ConfigError::Cryptograph(format!("invalid base64 key: {}", e)))?;
        Self::new(&key)
    }

    /// Create with a freshly generated key; values encrypted with it cannot
    /// be read back by another process.
    pub fn random() -> Result<Self, ConfigError> {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(&key)
    }

    /// Generate a random base64 key, suitable for the `secret` setting.
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        BASE64.encode(key)
    }
}

impl Cryptograph for AesCryptograph {
    fn encrypt(&self, plain: &str) -> Result<Vec<u8>, TransformError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plain.as_bytes())
            .map_err(|e| TransformError::Cipher(format!("encryption failed: {}", e)))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, encrypted: &[u8]) -> Result<String, TransformError> {
        if encrypted.len() < NONCE_SIZE {
            return Err(TransformError::Cipher(format!(
                "encrypted payload too short: {} bytes",
                encrypted.len()
            )));
        }
        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| TransformError::Cipher(format!("decryption failed: {}", e)))?;
        String::from_utf8(plain)
            .map_err(|e| TransformError::Decode(format!("invalid UTF-8 in decrypted data: {}", e)))
    }
}

impl fmt::Debug for AesCryptograph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesCryptograph")
            .field("cipher", &"[REDACTED]")
            .finish()
    }
}

/// Instantiate a cryptograph by configuration name.
///
/// # Arguments
/// * `name` - cryptograph name, currently only `aes-gcm`
/// * `secret` - base64 key; a random key is generated when absent
pub fn cryptograph_by_name(
    name: &str,
    secret: Option<&str>,
) -> Result<Arc<dyn Cryptograph>, ConfigError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "aes-gcm" | "aes" | "aes256gcm" => {
            let crypto = match secret {
                Some(key) => AesCryptograph::from_base64_key(key)?,
                None => {
                    tracing::warn!("no secret configured, obfuscated values will not survive a restart");
                    AesCryptograph::random()?
                }
            };
            Ok(Arc::new(crypto))
        }
        other => Err(ConfigError::Cryptograph(format!("unknown cryptograph: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = AesCryptograph::generate_key();
        let crypto = AesCryptograph::from_base64_key(&key).unwrap();

        let encrypted = crypto.encrypt("my-secret-value").unwrap();
        assert_ne!(encrypted, b"my-secret-value".to_vec());
        assert_eq!(crypto.decrypt(&encrypted).unwrap(), "my-secret-value");
    }

    #[test]
    fn test_different_nonces() {
        let crypto = AesCryptograph::random().unwrap();
        let first = crypto.encrypt("same").unwrap();
        let second = crypto.encrypt("same").unwrap();
        assert_ne!(first, second);
        assert_eq!(crypto.decrypt(&second).unwrap(), "same");
    }

    #[test]
    fn test_wrong_key_fails() {
        let one = AesCryptograph::random().unwrap();
        let two = AesCryptograph::random().unwrap();
        let encrypted = one.encrypt("secret").unwrap();
        assert!(matches!(two.decrypt(&encrypted), Err(TransformError::Cipher(_))));
        assert!(one.decrypt(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_by_name() {
        assert!(cryptograph_by_name("aes-gcm", None).is_ok());
        assert!(cryptograph_by_name("AES-GCM", Some(&AesCryptograph::generate_key())).is_ok());
        assert!(matches!(
            cryptograph_by_name("rot13", None),
            Err(ConfigError::Cryptograph(_))
        ));
    }
}
