//! Key derivation.
//!
//! Key material from the keychain or the environment is arbitrary text (a
//! generated base64 string or a passphrase). It is turned into an AES-256 key
//! with BLAKE3 in key-derivation mode under a fixed context string.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// Length of a derived key in bytes.
pub const KEY_LEN: usize = 32;

/// Domain-separation context. Changing it invalidates every stored value.
const KEY_CONTEXT: &str = "termconf 2024-06 config secret encryption key v1";

/// Derive a symmetric key from raw key material.
pub fn derive_key(material: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    Zeroizing::new(blake3::derive_key(KEY_CONTEXT, material))
}

/// Fresh random key material: 32 bytes from the OS RNG, base64-encoded.
pub fn generate_key_material() -> Zeroizing<String> {
    let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
    OsRng.fill_bytes(&mut bytes[..]);
    Zeroizing::new(STANDARD.encode(&bytes[..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        assert_eq!(*derive_key(b"material"), *derive_key(b"material"));
        assert_ne!(*derive_key(b"material"), *derive_key(b"materiaL"));
    }

    #[test]
    fn test_generated_material_is_fresh() {
        let a = generate_key_material();
        let b = generate_key_material();
        assert_ne!(*a, *b);
        assert_eq!(STANDARD.decode(a.as_bytes()).unwrap().len(), KEY_LEN);
    }
}
