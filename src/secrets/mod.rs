//! Encrypted setting values.
//!
//! A setting may be written as `encrypted:v1 <payload>`. The loader hands
//! such values to an [`Encryptor`], which asks a [`KeychainManager`] for the
//! key material named in the payload, derives the key and decrypts. Every
//! failure is a [`SecretError`](crate::error::SecretError).

pub mod encryptor;
pub mod kdf;
pub mod keychain;

pub use encryptor::{EncryptedValue, Encryptor, TAG, is_tagged};
pub use kdf::generate_key_material;
pub use keychain::{
    DEFAULT_KEY_ID, KEYCHAIN_SERVICE, KeychainManager, MemoryStore, PlatformStore, SecretStore,
    UnavailableStore, validate_key_id,
};
