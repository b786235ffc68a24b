//! Encrypt and keygen subcommands
//!
//! `encrypt` prints a ready-to-embed `encrypted:v1 ...` value on stdout and
//! usage guidance on stderr, so the value can be piped or captured cleanly.

use clap::Args;

use crate::secrets::{DEFAULT_KEY_ID, Encryptor, KeychainManager, generate_key_material};

/// Arguments for the encrypt subcommand
#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// Plaintext to encrypt
    pub plaintext: String,

    /// Key id naming the key material to use
    #[arg(short, long, default_value = DEFAULT_KEY_ID)]
    pub key_id: String,
}

/// Arguments for the keygen subcommand
#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Key id to generate material for
    #[arg(short, long, default_value = DEFAULT_KEY_ID)]
    pub key_id: String,

    /// Save the material in the platform secret store
    #[arg(long)]
    pub store: bool,
}

/// Encrypt `args.plaintext`, returning (stdout line, stderr guidance).
pub fn encrypt(encryptor: &Encryptor, args: &EncryptArgs) -> anyhow::Result<(String, String)> {
    let tagged = encryptor.encrypt_to_string(&args.plaintext, &args.key_id)?;
    let guidance = format!(
        "Paste the value into your config file, for example:\n\n  \
         credentials:\n    apiToken: \"{}\"\n\n\
         It decrypts with key id '{}' from the secret store or ${}.",
        tagged,
        args.key_id,
        encryptor.keychain().env_var_name(&args.key_id)
    );
    Ok((tagged, guidance))
}

/// Generate key material, returning (stdout export line, stderr guidance).
pub fn keygen(keychain: &KeychainManager, args: &KeygenArgs) -> anyhow::Result<(String, String)> {
    crate::secrets::validate_key_id(&args.key_id)?;
    let material = generate_key_material();
    let var = keychain.env_var_name(&args.key_id);

    let guidance = if args.store {
        keychain.store(&args.key_id, &material)?;
        format!(
            "Stored key '{}' in the platform secret store. \
             The export line is only needed on hosts without one.",
            args.key_id
        )
    } else {
        format!(
            "Keep this value secret. Export it, or rerun with --store to \
             save it in the platform secret store as key '{}'.",
            args.key_id
        )
    };
    Ok((format!("export {}={}", var, material.as_str()), guidance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemoryStore;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn keychain() -> KeychainManager {
        KeychainManager::new(Arc::new(MemoryStore::new())).with_env(HashMap::new())
    }

    #[test]
    fn test_keygen_store_then_encrypt() {
        let keychain = Arc::new(keychain());
        let (export, _) = keygen(
            &keychain,
            &KeygenArgs {
                key_id: "default".to_string(),
                store: true,
            },
        )
        .unwrap();
        assert!(export.starts_with("export TERMCONF_ENCRYPTION_KEY_DEFAULT="));

        let encryptor = Encryptor::new(keychain);
        let (tagged, guidance) = encrypt(
            &encryptor,
            &EncryptArgs {
                plaintext: "hunter2".to_string(),
                key_id: "default".to_string(),
            },
        )
        .unwrap();
        assert!(tagged.starts_with("encrypted:v1 "));
        assert!(!guidance.contains("hunter2"));
        assert_eq!(encryptor.decrypt_str(&tagged).unwrap().expose(), "hunter2");
    }

    #[test]
    fn test_encrypt_without_key_fails() {
        let encryptor = Encryptor::new(Arc::new(keychain()));
        let result = encrypt(
            &encryptor,
            &EncryptArgs {
                plaintext: "x".to_string(),
                key_id: "missing".to_string(),
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_keygen_rejects_bad_key_id() {
        let result = keygen(
            &keychain(),
            &KeygenArgs {
                key_id: "no spaces".to_string(),
                store: false,
            },
        );
        assert!(result.is_err());
    }
}
