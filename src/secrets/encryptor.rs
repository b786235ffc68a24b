//! Authenticated encryption of individual setting values.
//!
//! Wire form: `encrypted:v1 <payload>`, where the payload is unpadded
//! URL-safe base64 of
//!
//! ```text
//! key_id_len: u8 | key_id | nonce: [u8; 12] | AES-256-GCM ciphertext + tag
//! ```
//!
//! The key id is bound as associated data, so a payload re-labelled with
//! another key id fails authentication.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

use super::kdf::derive_key;
use super::keychain::{KeychainManager, validate_key_id};
use crate::config::SecretString;
use crate::error::{SecretError, SecretResult};

/// Marker that starts every encrypted value. The version follows it.
pub const TAG_PREFIX: &str = "encrypted:";

/// Current wire version.
pub const TAG: &str = "encrypted:v1";

const NONCE_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;

/// True if `text` is written in the encrypted form (any version).
pub fn is_tagged(text: &str) -> bool {
    text.trim_start().starts_with(TAG_PREFIX)
}

/// An encrypted value. Holds no plaintext.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedValue {
    key_id: String,
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl EncryptedValue {
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Parse the `encrypted:v1 <payload>` form.
    pub fn parse(text: &str) -> SecretResult<Self> {
        let rest = text
            .trim()
            .strip_prefix(TAG_PREFIX)
            .ok_or_else(|| SecretError::MalformedPayload("missing encrypted: tag".to_string()))?;
        let (version, payload) = rest
            .split_once(char::is_whitespace)
            .ok_or_else(|| SecretError::MalformedPayload("missing payload".to_string()))?;
        if version != "v1" {
            return Err(SecretError::MalformedPayload(format!(
                "unsupported version '{}'",
                version
            )));
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim())
            .map_err(|e| SecretError::MalformedPayload(format!("invalid base64: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    fn from_bytes(bytes: &[u8]) -> SecretResult<Self> {
        let (&id_len, rest) = bytes
            .split_first()
            .ok_or_else(|| SecretError::MalformedPayload("empty payload".to_string()))?;
        let id_len = usize::from(id_len);
        if rest.len() < id_len + NONCE_LEN + GCM_TAG_LEN {
            return Err(SecretError::MalformedPayload("payload is truncated".to_string()));
        }

        let (id_bytes, rest) = rest.split_at(id_len);
        let key_id = std::str::from_utf8(id_bytes)
            .map_err(|_| SecretError::MalformedPayload("key id is not UTF-8".to_string()))?;
        validate_key_id(key_id)?;

        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);

        Ok(Self {
            key_id: key_id.to_string(),
            nonce,
            ciphertext: ciphertext.to_vec(),
        })
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.key_id.len() + NONCE_LEN + self.ciphertext.len());
        // validate_key_id caps the length at 64
        bytes.push(self.key_id.len() as u8);
        bytes.extend_from_slice(self.key_id.as_bytes());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }
}

impl fmt::Display for EncryptedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", TAG, URL_SAFE_NO_PAD.encode(self.to_bytes()))
    }
}

impl fmt::Debug for EncryptedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedValue")
            .field("key_id", &self.key_id)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

impl std::str::FromStr for EncryptedValue {
    type Err = SecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Encrypts and decrypts values with keys resolved through a [`KeychainManager`].
#[derive(Debug, Clone)]
pub struct Encryptor {
    keychain: Arc<KeychainManager>,
}

impl Encryptor {
    pub fn new(keychain: Arc<KeychainManager>) -> Self {
        Self { keychain }
    }

    pub fn keychain(&self) -> &KeychainManager {
        &self.keychain
    }

    /// Encryptor over the same store whose environment fallback uses
    /// `prefix` and `env`. See [`KeychainManager::scoped`].
    pub fn scoped(&self, prefix: &str, env: Option<&HashMap<String, String>>) -> Self {
        Self::new(Arc::new(self.keychain.scoped(prefix, env)))
    }

    fn cipher(&self, key_id: &str) -> SecretResult<Aes256Gcm> {
        let material = self.keychain.retrieve(key_id)?;
        let key = derive_key(material.trim().as_bytes());
        Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..])))
    }

    pub fn encrypt(&self, plaintext: &str, key_id: &str) -> SecretResult<EncryptedValue> {
        validate_key_id(key_id)?;
        let cipher = self.cipher(key_id)?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: key_id.as_bytes(),
                },
            )
            .map_err(|_| SecretError::Encrypt {
                key_id: key_id.to_string(),
            })?;

        Ok(EncryptedValue {
            key_id: key_id.to_string(),
            nonce,
            ciphertext,
        })
    }

    pub fn decrypt(&self, value: &EncryptedValue) -> SecretResult<SecretString> {
        let cipher = self.cipher(&value.key_id)?;
        let failed = || SecretError::Decrypt {
            key_id: value.key_id.clone(),
        };

        let plaintext = Zeroizing::new(
            cipher
                .decrypt(
                    Nonce::from_slice(&value.nonce),
                    Payload {
                        msg: &value.ciphertext,
                        aad: value.key_id.as_bytes(),
                    },
                )
                .map_err(|_| failed())?,
        );
        let text = std::str::from_utf8(&plaintext).map_err(|_| failed())?;
        Ok(SecretString::new(text))
    }

    /// Encrypt and render in the document-embeddable form.
    pub fn encrypt_to_string(&self, plaintext: &str, key_id: &str) -> SecretResult<String> {
        self.encrypt(plaintext, key_id).map(|v| v.to_string())
    }

    /// Parse and decrypt a document value.
    pub fn decrypt_str(&self, text: &str) -> SecretResult<SecretString> {
        self.decrypt(&EncryptedValue::parse(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::keychain::{MemoryStore, SecretStore, UnavailableStore};
    use std::collections::HashMap;

    fn encryptor(keys: &[(&str, &str)]) -> Encryptor {
        let store = MemoryStore::new();
        for (id, material) in keys {
            store.set(id, material).unwrap();
        }
        Encryptor::new(Arc::new(
            KeychainManager::new(Arc::new(store)).with_env(HashMap::new()),
        ))
    }

    #[test]
    fn test_roundtrip() {
        let enc = encryptor(&[("default", "material-one")]);
        let long = "x".repeat(4096);
        for plaintext in ["", "hunter2", "ünïcødé 🔑", long.as_str()] {
            let tagged = enc.encrypt_to_string(plaintext, "default").unwrap();
            assert!(tagged.starts_with("encrypted:v1 "));
            assert!(!tagged.contains(plaintext) || plaintext.is_empty());
            assert_eq!(enc.decrypt_str(&tagged).unwrap().expose(), plaintext);
        }
    }

    #[test]
    fn test_nonce_is_fresh() {
        let enc = encryptor(&[("default", "material-one")]);
        let a = enc.encrypt_to_string("same", "default").unwrap();
        let b = enc.encrypt_to_string("same", "default").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_foreign_key_fails() {
        let tagged = encryptor(&[("default", "material-one")])
            .encrypt_to_string("hunter2", "default")
            .unwrap();
        let other = encryptor(&[("default", "material-two")]);
        assert_eq!(
            other.decrypt_str(&tagged).unwrap_err(),
            SecretError::Decrypt {
                key_id: "default".to_string()
            }
        );
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let enc = encryptor(&[("default", "material-one")]);
        let value = enc.encrypt("hunter2", "default").unwrap();
        let mut tampered = value.clone();
        if let Some(last) = tampered.ciphertext.last_mut() {
            *last ^= 0x01;
        }
        assert!(matches!(
            enc.decrypt(&tampered),
            Err(SecretError::Decrypt { .. })
        ));
    }

    #[test]
    fn test_relabelled_key_id_fails() {
        let enc = encryptor(&[("alpha", "same-material"), ("bravo", "same-material")]);
        let mut value = enc.encrypt("hunter2", "alpha").unwrap();
        value.key_id = "bravo".to_string();
        assert!(matches!(enc.decrypt(&value), Err(SecretError::Decrypt { .. })));
    }

    #[test]
    fn test_malformed_payloads() {
        let enc = encryptor(&[("default", "material-one")]);
        for text in [
            "encrypted:v1",
            "encrypted:v1 !!!not-base64!!!",
            "encrypted:v1 AAAA",
            "encrypted:v2 AAAA",
            "plain text",
        ] {
            assert!(
                matches!(enc.decrypt_str(text), Err(SecretError::MalformedPayload(_))),
                "expected malformed payload for {:?}",
                text
            );
        }
    }

    #[test]
    fn test_missing_key() {
        let enc = Encryptor::new(Arc::new(
            KeychainManager::new(Arc::new(UnavailableStore)).with_env(HashMap::new()),
        ));
        assert!(matches!(
            enc.encrypt("x", "default"),
            Err(SecretError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_display_and_debug_do_not_leak() {
        let enc = encryptor(&[("default", "material-one")]);
        let value = enc.encrypt("hunter2", "default").unwrap();
        let reparsed: EncryptedValue = value.to_string().parse().unwrap();
        assert_eq!(reparsed, value);
        assert_eq!(reparsed.key_id(), "default");

        let debug = format!("{:?}", value);
        assert!(debug.contains("default"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_is_tagged() {
        assert!(is_tagged("encrypted:v1 abc"));
        assert!(is_tagged("  encrypted:v9 abc"));
        assert!(!is_tagged("plain"));
        assert!(!is_tagged("not encrypted:v1"));
    }
}
