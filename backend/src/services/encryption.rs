//! At-rest encryption for project access tokens.
//!
//! Ciphertext layout: `base64(nonce || aes256gcm(plaintext))` with a random
//! 96-bit nonce per value.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Reversible string cipher used by the resolver and engine.
pub trait TokenCipher: Send + Sync {
    fn encrypt_string(&self, plaintext: &str) -> Result<String>;
    fn decrypt_string(&self, ciphertext: &str) -> Result<String>;
}

/// AES-256-GCM token cipher.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Build from raw key bytes; the key must be exactly 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(AppError::Crypto(format!(
                "encryption key must be {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }
        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        })
    }

    /// Derive the key as SHA-256 of an arbitrary passphrase.
    pub fn from_passphrase(passphrase: &str) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(AppError::Crypto("encryption passphrase is empty".into()));
        }
        let digest = Sha256::digest(passphrase.as_bytes());
        Self::new(digest.as_slice())
    }

    /// Accept either a base64-encoded 32-byte key or a passphrase.
    pub fn from_config_value(value: &str) -> Result<Self> {
        match STANDARD.decode(value.trim()) {
            Ok(bytes) if bytes.len() == KEY_LEN => Self::new(&bytes),
            _ => Self::from_passphrase(value),
        }
    }

    /// Fresh random key, base64-encoded, for `generate-key`.
    pub fn generate_key() -> String {
        STANDARD.encode(Aes256Gcm::generate_key(&mut OsRng))
    }
}

impl TokenCipher for AesGcmCipher {
    fn encrypt_string(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| AppError::Crypto(format!("encrypt: {}", e)))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    fn decrypt_string(&self, ciphertext: &str) -> Result<String> {
        let raw = STANDARD
            .decode(ciphertext)
            .map_err(|e| AppError::Crypto(format!("decode: {}", e)))?;
        if raw.len() <= NONCE_LEN {
            return Err(AppError::Crypto("ciphertext too short".into()));
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|e| AppError::Crypto(format!("decrypt: {}", e)))?;
        String::from_utf8(plain).map_err(|e| AppError::Crypto(format!("utf8: {}", e)))
    }
}

/// Mask a secret for logging: the first and last four characters survive,
/// anything of eight characters or fewer is fully masked.
pub fn mask_sensitive(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = AesGcmCipher::from_passphrase("correct horse battery staple").unwrap();
        let sealed = cipher.encrypt_string("glpat-secret-token").unwrap();
        assert_ne!(sealed, "glpat-secret-token");
        assert_eq!(cipher.decrypt_string(&sealed).unwrap(), "glpat-secret-token");
    }

    #[test]
    fn test_nonce_is_random() {
        let cipher = AesGcmCipher::from_passphrase("k").unwrap();
        let a = cipher.encrypt_string("same").unwrap();
        let b = cipher.encrypt_string("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let a = AesGcmCipher::from_passphrase("key-one").unwrap();
        let b = AesGcmCipher::from_passphrase("key-two").unwrap();
        let sealed = a.encrypt_string("token").unwrap();
        assert!(matches!(b.decrypt_string(&sealed), Err(AppError::Crypto(_))));
    }

    #[test]
    fn test_garbage_ciphertext_fails() {
        let cipher = AesGcmCipher::from_passphrase("k").unwrap();
        assert!(cipher.decrypt_string("%%%").is_err());
        assert!(cipher.decrypt_string(&STANDARD.encode([0u8; 4])).is_err());
    }

    #[test]
    fn test_key_length_enforced() {
        assert!(AesGcmCipher::new(&[0u8; 16]).is_err());
        assert!(AesGcmCipher::new(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_config_value_accepts_generated_key() {
        let key = AesGcmCipher::generate_key();
        let a = AesGcmCipher::from_config_value(&key).unwrap();
        let b = AesGcmCipher::new(&STANDARD.decode(&key).unwrap()).unwrap();
        let sealed = a.encrypt_string("t").unwrap();
        assert_eq!(b.decrypt_string(&sealed).unwrap(), "t");
    }

    // -----------------------------------------------------------------------
    // mask_sensitive
    // -----------------------------------------------------------------------

    #[test]
    fn test_mask_sensitive() {
        assert_eq!(mask_sensitive("glpat-abcdef123456"), "glpa****3456");
        assert_eq!(mask_sensitive("short"), "*****");
        assert_eq!(mask_sensitive("12345678"), "********");
        assert_eq!(mask_sensitive(""), "");
    }
}
