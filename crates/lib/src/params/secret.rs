//! Registry of secret values that must never reach rendered output.

use std::borrow::Cow;
use std::sync::{Arc, PoisonError, RwLock};

use crate::consts::REDACTED;

/// Shared set of resolved secret values.
///
/// Cloning is cheap and every clone sees the same values, so the store can be
/// handed to output sinks before any parameter has been resolved.
#[derive(Debug, Clone, Default)]
pub struct SecretStore {
  values: Arc<RwLock<Vec<String>>>,
}

impl SecretStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Remember a value as secret. Empty strings are ignored.
  pub fn register(&self, value: &str) {
    if value.is_empty() {
      return;
    }

    let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
    if values.iter().any(|v| v == value) {
      return;
    }
    values.push(value.to_string());
    // Longest first so a secret containing another secret is replaced whole.
    values.sort_by_key(|v| std::cmp::Reverse(v.len()));
  }

  pub fn is_empty(&self) -> bool {
    self.values.read().unwrap_or_else(PoisonError::into_inner).is_empty()
  }

  /// Replace every occurrence of a registered secret with the redaction marker.
  pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
    let values = self.values.read().unwrap_or_else(PoisonError::into_inner);

    let mut result = Cow::Borrowed(text);
    for value in values.iter() {
      if result.contains(value.as_str()) {
        result = Cow::Owned(result.replace(value.as_str(), REDACTED));
      }
    }
    result
  }
}
