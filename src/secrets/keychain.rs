//! Key material lookup: platform secret store first, environment second.
//!
//! The store is a trait object so callers (and tests) decide which backend a
//! [`KeychainManager`] talks to. Nothing here is process-global.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::DEFAULT_ENV_PREFIX;
use crate::config::env::ENCRYPTION_KEY_INFIX;
use crate::error::{SecretError, SecretResult};

/// Service name under which key material is stored in the platform store.
pub const KEYCHAIN_SERVICE: &str = "termconf";

/// Key id used when none is given.
pub const DEFAULT_KEY_ID: &str = "default";

const MAX_KEY_ID_LEN: usize = 64;

/// Check a key id: 1-64 characters of `[A-Za-z0-9_-]`.
pub fn validate_key_id(key_id: &str) -> SecretResult<()> {
    let valid = !key_id.is_empty()
        && key_id.len() <= MAX_KEY_ID_LEN
        && key_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(SecretError::InvalidKeyId(key_id.to_string()))
    }
}

/// A backend holding key material by key id.
pub trait SecretStore: Send + Sync {
    /// `Ok(None)` when the store works but has no entry for `key_id`.
    fn get(&self, key_id: &str) -> SecretResult<Option<Zeroizing<String>>>;

    fn set(&self, key_id: &str, material: &str) -> SecretResult<()>;
}

/// The operating system's credential store (Keychain, Credential Manager,
/// Secret Service / keyutils).
#[derive(Debug, Clone)]
pub struct PlatformStore {
    service: String,
}

impl PlatformStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key_id: &str) -> SecretResult<keyring::Entry> {
        keyring::Entry::new(&self.service, key_id).map_err(|e| SecretError::Keychain(e.to_string()))
    }
}

impl Default for PlatformStore {
    fn default() -> Self {
        Self::new(KEYCHAIN_SERVICE)
    }
}

impl SecretStore for PlatformStore {
    fn get(&self, key_id: &str) -> SecretResult<Option<Zeroizing<String>>> {
        match self.entry(key_id)?.get_password() {
            Ok(material) => Ok(Some(Zeroizing::new(material))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SecretError::Keychain(e.to_string())),
        }
    }

    fn set(&self, key_id: &str, material: &str) -> SecretResult<()> {
        self.entry(key_id)?
            .set_password(material)
            .map_err(|e| SecretError::Keychain(e.to_string()))
    }
}

/// In-process store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Zeroizing<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, key_id: &str) -> SecretResult<Option<Zeroizing<String>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| SecretError::Keychain("memory store lock poisoned".to_string()))?;
        Ok(entries.get(key_id).cloned())
    }

    fn set(&self, key_id: &str, material: &str) -> SecretResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| SecretError::Keychain("memory store lock poisoned".to_string()))?;
        entries.insert(key_id.to_string(), Zeroizing::new(material.to_string()));
        Ok(())
    }
}

/// A store that is never reachable, as on a headless host without a
/// secret service.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableStore;

impl SecretStore for UnavailableStore {
    fn get(&self, _key_id: &str) -> SecretResult<Option<Zeroizing<String>>> {
        Err(SecretError::Keychain("no platform secret store available".to_string()))
    }

    fn set(&self, _key_id: &str, _material: &str) -> SecretResult<()> {
        Err(SecretError::Keychain("no platform secret store available".to_string()))
    }
}

/// Resolves key ids to key material.
#[derive(Clone)]
pub struct KeychainManager {
    store: Arc<dyn SecretStore>,
    env_prefix: String,
    /// `None` reads the process environment on each lookup.
    env: Option<HashMap<String, String>>,
}

impl KeychainManager {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            env: None,
        }
    }

    /// Manager backed by the operating system's credential store.
    pub fn platform() -> Self {
        Self::new(Arc::new(PlatformStore::default()))
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Use a fixed environment snapshot instead of the process environment.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    /// Same store, with fallback variables named under `prefix` and read
    /// from `env` (or from this manager's own source when `env` is `None`).
    pub fn scoped(&self, prefix: &str, env: Option<&HashMap<String, String>>) -> Self {
        Self {
            store: Arc::clone(&self.store),
            env_prefix: prefix.to_string(),
            env: env.cloned().or_else(|| self.env.clone()),
        }
    }

    /// Fallback variable for `key_id`, e.g. `TERMCONF_ENCRYPTION_KEY_PROD_EU`
    /// for `prod-eu`.
    pub fn env_var_name(&self, key_id: &str) -> String {
        format!(
            "{}_{}{}",
            self.env_prefix.trim_end_matches('_').to_ascii_uppercase(),
            ENCRYPTION_KEY_INFIX,
            key_id.to_ascii_uppercase().replace('-', "_")
        )
    }

    /// Key material for `key_id`.
    ///
    /// An unreachable store is not an error by itself: the environment
    /// fallback is tried before giving up.
    pub fn retrieve(&self, key_id: &str) -> SecretResult<Zeroizing<String>> {
        validate_key_id(key_id)?;

        match self.store.get(key_id) {
            Ok(Some(material)) if !material.trim().is_empty() => return Ok(material),
            Ok(_) => debug!(key_id, "Key not in secret store, trying environment"),
            Err(e) => debug!(key_id, error = %e, "Secret store unavailable, trying environment"),
        }

        let var = self.env_var_name(key_id);
        let from_env = match &self.env {
            Some(env) => env.get(&var).cloned(),
            None => std::env::var(&var).ok(),
        };
        match from_env {
            Some(material) if !material.trim().is_empty() => Ok(Zeroizing::new(material)),
            _ => Err(SecretError::KeyNotFound {
                key_id: key_id.to_string(),
                env_var: var,
            }),
        }
    }

    /// Save key material in the store. There is no environment fallback for writes.
    pub fn store(&self, key_id: &str, material: &str) -> SecretResult<()> {
        validate_key_id(key_id)?;
        self.store.set(key_id, material)
    }
}

impl std::fmt::Debug for KeychainManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeychainManager")
            .field("env_prefix", &self.env_prefix)
            .field("env", &self.env.as_ref().map(|e| e.len()))
            .finish_non_exhaustive()
    }
}
