use std::env;

use crate::ContentError;

/// Wrapper around sensitive values to reduce accidental logging.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***redacted***")
    }
}

/// Require that a given environment variable is set and non-empty.
pub fn require_env(var: &str) -> Result<SecretValue, ContentError> {
    optional_env(var).ok_or_else(|| ContentError::MissingSecret(var.to_string()))
}

/// Read a secret that may legitimately be absent; blank values count as absent.
pub fn optional_env(var: &str) -> Option<SecretValue> {
    if var.trim().is_empty() {
        return None;
    }
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(SecretValue(value)),
        _ => None,
    }
}
