//! Typed credential references and one-shot resolution.
//!
//! Segments never carry secrets inline unless the caller chose to; they carry
//! a reference (literal value, environment variable name, or OS keychain
//! entry) that is resolved exactly once when the run context is built.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeychainRef {
    pub service: String,
    pub account: String,
}

/// A reference to a secret. Exactly one source is consulted, in order:
/// `value`, then `env`, then `keychain`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct CredentialRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keychain: Option<KeychainRef>,
}

impl CredentialRef {
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.env.is_none() && self.keychain.is_none()
    }
}

/// Resolve a credential reference into its secret value.
pub fn resolve(reference: &CredentialRef, field: &str) -> Result<String> {
    if let Some(value) = &reference.value {
        return Ok(value.clone());
    }

    if let Some(env_name) = &reference.env {
        return std::env::var(env_name).map_err(|_| {
            Error::validation_invalid_argument(
                field,
                format!("Environment variable '{}' is not set", env_name),
                None,
                Some(vec![format!("Export {} before running", env_name)]),
            )
        });
    }

    if let Some(keychain) = &reference.keychain {
        let entry = keyring::Entry::new(&keychain.service, &keychain.account).map_err(|e| {
            Error::validation_invalid_argument(
                field,
                format!("Cannot open keychain entry '{}': {}", keychain.service, e),
                None,
                None,
            )
        })?;
        return entry.get_password().map_err(|e| {
            Error::validation_invalid_argument(
                field,
                format!(
                    "Cannot read keychain entry '{}/{}': {}",
                    keychain.service, keychain.account, e
                ),
                None,
                Some(vec![format!(
                    "Store the secret: security/keyring entry '{}' account '{}'",
                    keychain.service, keychain.account
                )]),
            )
        });
    }

    Err(Error::validation_missing_argument(
        field,
        format!("Credential reference '{}' names no source", field),
    ))
}

/// Resolve an optional reference; `None` (or an empty reference) stays `None`.
pub fn resolve_optional(reference: Option<&CredentialRef>, field: &str) -> Result<Option<String>> {
    match reference {
        None => Ok(None),
        Some(r) if r.is_empty() => Ok(None),
        Some(r) => resolve(r, field).map(Some),
    }
}
