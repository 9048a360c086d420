//! Per-domain request header overrides.
//!
//! Some calendar hosts reject the default client headers. Overrides are
//! stored encrypted at rest (they may carry API tokens) as base64 blobs of
//! `[nonce: 24 bytes][XChaCha20-Poly1305 ciphertext + tag]` over a JSON
//! [`DomainConfig`], decrypted once at startup with a key from the environment.

use std::collections::{BTreeMap, HashMap};

use base64::{Engine as _, engine::general_purpose::STANDARD};
#[allow(deprecated)] // upstream generic-array 0.x deprecation
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::DomainConfigSettings;
use crate::error::{CalMergeError, CalMergeResult};

const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;
/// Binds blobs to this purpose so they can't be swapped with other secrets.
const AAD: &[u8] = b"calmerge:domain-config";

/// Header overrides for one host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Host name → header overrides lookup.
pub trait DomainConfigProvider: Send + Sync {
    fn get(&self, domain: &str) -> Option<DomainConfig>;
}

/// Decrypted overrides held in memory, keyed by lower-cased host.
#[derive(Debug, Clone, Default)]
pub struct DomainConfigs {
    by_domain: HashMap<String, DomainConfig>,
}

impl DomainConfigs {
    pub fn new(configs: impl IntoIterator<Item = DomainConfig>) -> Self {
        DomainConfigs {
            by_domain: configs
                .into_iter()
                .map(|config| (config.domain.trim().to_ascii_lowercase(), config))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_domain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_domain.is_empty()
    }

    /// Decrypt every blob with `key`. Blobs that fail to decrypt are skipped.
    pub fn decrypt_all(key: &[u8; KEY_LEN], blobs: &[String]) -> Self {
        let configs = blobs.iter().filter_map(|blob| match decrypt_domain_config(key, blob) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::error!(error = %e, "Failed to decrypt domain config, skipping");
                None
            }
        });
        Self::new(configs)
    }

    /// Load from settings, reading the key from the configured environment variable.
    ///
    /// A missing key is not fatal: it yields an empty lookup.
    pub fn from_settings(settings: &DomainConfigSettings) -> Self {
        if settings.encrypted.is_empty() {
            return Self::default();
        }

        let key = match std::env::var(&settings.key_env) {
            Ok(key) => key,
            Err(_) => {
                tracing::warn!(
                    key_env = %settings.key_env,
                    "Domain config key not set, domain-specific headers are disabled"
                );
                return Self::default();
            }
        };

        match decode_key(&key) {
            Ok(key) => {
                let configs = Self::decrypt_all(&key, &settings.encrypted);
                tracing::info!(count = configs.len(), "Loaded domain configs");
                configs
            }
            Err(e) => {
                tracing::error!(error = %e, "Invalid domain config key");
                Self::default()
            }
        }
    }
}

impl DomainConfigProvider for DomainConfigs {
    fn get(&self, domain: &str) -> Option<DomainConfig> {
        self.by_domain.get(&domain.to_ascii_lowercase()).cloned()
    }
}

/// A fresh random key, base64-encoded.
pub fn generate_key() -> String {
    let mut key = [0u8; KEY_LEN];
    rand::rng().fill_bytes(&mut key);
    STANDARD.encode(key)
}

pub fn decode_key(encoded: &str) -> CalMergeResult<[u8; KEY_LEN]> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CalMergeError::DomainConfig(format!("key is not valid base64: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| CalMergeError::DomainConfig(format!("key must be {KEY_LEN} bytes")))
}

#[allow(deprecated)]
pub fn encrypt_domain_config(key: &[u8; KEY_LEN], config: &DomainConfig) -> CalMergeResult<String> {
    let plaintext = serde_json::to_vec(config)?;
    let cipher = XChaCha20Poly1305::new(key.into());

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: &plaintext, aad: AAD })
        .map_err(|e| CalMergeError::DomainConfig(e.to_string()))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(blob))
}

#[allow(deprecated)]
pub fn decrypt_domain_config(key: &[u8; KEY_LEN], blob: &str) -> CalMergeResult<DomainConfig> {
    let bytes = STANDARD
        .decode(blob.trim())
        .map_err(|e| CalMergeError::DomainConfig(format!("blob is not valid base64: {e}")))?;
    if bytes.len() < NONCE_LEN + TAG_LEN {
        return Err(CalMergeError::DomainConfig("blob too short".into()));
    }

    let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = XChaCha20Poly1305::new(key.into());

    let plaintext = cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad: AAD })
        .map_err(|e| CalMergeError::DomainConfig(e.to_string()))?;

    Ok(serde_json::from_slice(&plaintext)?)
}
