//! API token encryption at rest and timing-safe secret comparison
//!
//! Stored configs never contain a plaintext CMS token. The ciphertext format
//! is `"{iv_hex}:{ciphertext_hex}"` (AES-256-GCM, tag appended to the
//! ciphertext), so legacy plaintext tokens are recognizable and tolerated on
//! read.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::Rng;
use sha2::{Digest, Sha256};

/// AES-GCM nonce length in bytes
const IV_LENGTH: usize = 12;

/// Encrypts and decrypts stored API tokens with a fixed 256-bit key
#[derive(Clone)]
pub struct TokenCipher {
    key: [u8; 32],
}

impl TokenCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Build a cipher from deployment secrets.
    ///
    /// Prefers `ENCRYPTION_KEY` (64 hex characters). Without it, derives a
    /// key from `CRON_SECRET` via SHA-256 so single-secret deployments still
    /// encrypt at rest.
    pub fn from_secrets(
        encryption_key: Option<&str>,
        cron_secret: Option<&str>,
    ) -> Result<Self, String> {
        if let Some(key_hex) = encryption_key {
            if key_hex.len() != 64 {
                return Err("ENCRYPTION_KEY must be 64 hex characters (32 bytes)".to_string());
            }
            let bytes = hex::decode(key_hex)
                .map_err(|e| format!("ENCRYPTION_KEY is not valid hex: {}", e))?;
            let mut key = [0u8; 32];
            key.copy_from_slice(&bytes);
            return Ok(Self::new(key));
        }

        let fallback = cron_secret.unwrap_or("default-insecure-key-change-me");
        let digest = Sha256::digest(fallback.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Ok(Self::new(key))
    }

    /// Encrypt a token into the `iv:ciphertext` hex format
    pub fn encrypt(&self, plaintext: &str) -> Result<String, String> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let iv: [u8; IV_LENGTH] = rand::thread_rng().gen();

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| "Encryption failed".to_string())?;

        Ok(format!("{}:{}", hex::encode(iv), hex::encode(ciphertext)))
    }

    /// Decrypt a token from the `iv:ciphertext` hex format
    pub fn decrypt(&self, encrypted: &str) -> Result<String, String> {
        let (iv_hex, data_hex) = encrypted
            .split_once(':')
            .ok_or_else(|| "Invalid encrypted format".to_string())?;

        let iv = hex::decode(iv_hex).map_err(|e| format!("Invalid IV: {}", e))?;
        if iv.len() != IV_LENGTH {
            return Err("Invalid IV length".to_string());
        }
        let data = hex::decode(data_hex).map_err(|e| format!("Invalid ciphertext: {}", e))?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&iv), data.as_ref())
            .map_err(|_| "Decryption failed (wrong key or corrupted data)".to_string())?;

        String::from_utf8(plaintext).map_err(|e| format!("Decrypted token is not UTF-8: {}", e))
    }
}

/// Check whether a stored value matches the `iv:ciphertext` hex format
///
/// Used to tolerate configs written before encryption at rest existed.
pub fn is_encrypted(value: &str) -> bool {
    match value.split_once(':') {
        Some((iv, data)) => {
            iv.len() == IV_LENGTH * 2
                && !data.is_empty()
                && iv.chars().all(|c| c.is_ascii_hexdigit())
                && data.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

/// Timing-safe string comparison
///
/// Accumulates differences over the full padded length so the comparison
/// time does not depend on where the first mismatch occurs.
pub fn secure_compare(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let len = a.len().max(b.len());

    let mut diff = (a.len() ^ b.len()) as u8;
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= x ^ y;
    }

    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> TokenCipher {
        TokenCipher::new([7u8; 32])
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let cipher = test_cipher();
        let token = "da0c4b1e9f0123456789abcdef";

        let encrypted = cipher.encrypt(token).unwrap();
        assert_ne!(encrypted, token);
        assert!(is_encrypted(&encrypted));
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), token);
    }

    #[test]
    fn test_encrypt_uses_fresh_iv() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same-token-0123456789").unwrap();
        let b = cipher.encrypt("same-token-0123456789").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let encrypted = test_cipher().encrypt("secret-token-0123456789").unwrap();
        let other = TokenCipher::new([9u8; 32]);
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_is_encrypted_rejects_plaintext() {
        assert!(!is_encrypted("plain-api-token-0123456789"));
        assert!(!is_encrypted("full:access0123456789abc"));
        assert!(!is_encrypted(""));
    }

    #[test]
    fn test_from_secrets_key_validation() {
        assert!(TokenCipher::from_secrets(Some("deadbeef"), None).is_err());
        assert!(TokenCipher::from_secrets(Some(&"ab".repeat(32)), None).is_ok());
    }

    #[test]
    fn test_from_secrets_fallback_is_deterministic() {
        let a = TokenCipher::from_secrets(None, Some("cron-secret")).unwrap();
        let b = TokenCipher::from_secrets(None, Some("cron-secret")).unwrap();
        let encrypted = a.encrypt("token-0123456789abcdef").unwrap();
        assert_eq!(b.decrypt(&encrypted).unwrap(), "token-0123456789abcdef");
    }

    #[test]
    fn test_secure_compare() {
        assert!(secure_compare("secret", "secret"));
        assert!(!secure_compare("secret", "secreT"));
        assert!(!secure_compare("secret", "secret-longer"));
        assert!(!secure_compare("", "x"));
        assert!(secure_compare("", ""));
    }
}
