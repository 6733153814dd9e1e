//! # Unseal Key Cache
//!
//! Unseal shares read from Vault, keyed by share id.

use std::collections::HashMap;
use std::fmt;
use zeroize::Zeroizing;

const REDACTED_EMPTY: &str = "<empty>";

/// Render a share for logs: first character followed by `...`
pub fn redact_share(value: &str) -> String {
    match value.chars().next() {
        Some(first) => format!("{first}..."),
        None => REDACTED_EMPTY.to_string(),
    }
}

/// Cached unseal shares
///
/// Replaced as a whole on refresh; values are zeroed on drop and never
/// appear in `Debug` output.
#[derive(Default, Clone)]
pub struct UnsealKeys {
    shares: HashMap<String, Zeroizing<String>>,
}

impl UnsealKeys {
    /// Empty cache, as held before the first refresh
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached shares
    pub fn len(&self) -> usize {
        self.shares.len()
    }

    /// True before the first successful refresh
    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Iterate `(share id, share value)` in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.shares.iter().map(|(id, v)| (id.as_str(), v.as_str()))
    }

    /// Share ids, sorted, for logging
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.shares.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl From<HashMap<String, String>> for UnsealKeys {
    fn from(document: HashMap<String, String>) -> Self {
        Self {
            shares: document
                .into_iter()
                .map(|(id, value)| (id, Zeroizing::new(value)))
                .collect(),
        }
    }
}

impl fmt::Debug for UnsealKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnsealKeys")
            .field("ids", &self.ids())
            .finish_non_exhaustive()
    }
}
