//! Integration tests for encrypted values through the public secrets API.

use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;
use termconf::error::SecretError;
use termconf::secrets::{
    EncryptedValue, Encryptor, KeychainManager, MemoryStore, SecretStore, UnavailableStore,
    generate_key_material, is_tagged,
};

/// Helper to build an encryptor over a memory store holding `keys`.
fn encryptor_with(keys: &[(&str, &str)]) -> Encryptor {
    let store = MemoryStore::new();
    for (id, material) in keys {
        store.set(id, material).unwrap();
    }
    Encryptor::new(Arc::new(
        KeychainManager::new(Arc::new(store)).with_env(HashMap::new()),
    ))
}

#[test]
fn test_value_encrypted_on_one_host_decrypts_on_another_with_same_material() {
    let material = generate_key_material();
    let writer = encryptor_with(&[("team", material.as_str())]);
    let tagged = writer.encrypt_to_string("s3cret token", "team").unwrap();
    assert!(is_tagged(&tagged));

    // The reader has no keychain, only the exported variable.
    let env = HashMap::from([(
        "TERMCONF_ENCRYPTION_KEY_TEAM".to_string(),
        material.as_str().to_string(),
    )]);
    let reader = Encryptor::new(Arc::new(
        KeychainManager::new(Arc::new(UnavailableStore)).with_env(env),
    ));
    assert_eq!(reader.decrypt_str(&tagged).unwrap().expose(), "s3cret token");
}

#[test]
fn test_keychain_wins_over_environment() {
    let store = MemoryStore::new();
    store.set("default", "from keychain").unwrap();
    let env = HashMap::from([(
        "TERMCONF_ENCRYPTION_KEY_DEFAULT".to_string(),
        "from env".to_string(),
    )]);
    let keychain = KeychainManager::new(Arc::new(store)).with_env(env);

    assert_eq!(keychain.retrieve("default").unwrap().as_str(), "from keychain");
}

#[test]
fn test_custom_prefix_changes_fallback_variable() {
    let env = HashMap::from([(
        "MYAPP_ENCRYPTION_KEY_CI_KEY".to_string(),
        "ci material".to_string(),
    )]);
    let keychain = KeychainManager::new(Arc::new(UnavailableStore))
        .with_env_prefix("MYAPP")
        .with_env(env);

    assert_eq!(keychain.env_var_name("ci-key"), "MYAPP_ENCRYPTION_KEY_CI_KEY");
    assert_eq!(keychain.retrieve("ci-key").unwrap().as_str(), "ci material");
}

#[test]
fn test_foreign_key_is_rejected() {
    let tagged = encryptor_with(&[("default", "alpha")])
        .encrypt_to_string("payload", "default")
        .unwrap();

    let err = encryptor_with(&[("default", "beta")])
        .decrypt_str(&tagged)
        .unwrap_err();
    assert_eq!(
        err,
        SecretError::Decrypt {
            key_id: "default".to_string()
        }
    );
}

#[test]
fn test_missing_key_names_the_variable_to_set() {
    let tagged = encryptor_with(&[("prod", "material")])
        .encrypt_to_string("payload", "prod")
        .unwrap();

    let err = encryptor_with(&[]).decrypt_str(&tagged).unwrap_err();
    assert!(err.to_string().contains("TERMCONF_ENCRYPTION_KEY_PROD"));
    assert!(!err.to_string().contains("payload"));
}

#[test]
fn test_parsed_value_exposes_only_metadata() {
    let tagged = encryptor_with(&[("default", "material")])
        .encrypt_to_string("do not print me", "default")
        .unwrap();

    let value: EncryptedValue = tagged.parse().unwrap();
    assert_eq!(value.key_id(), "default");
    assert_eq!(value.to_string(), tagged);
    assert!(!format!("{:?}", value).contains("do not print me"));
}
