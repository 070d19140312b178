//! Names for synthesized CTEs.

use indexmap::IndexMap;
use sha2::{Digest, Sha256};

/// Bijective map from a path or call signature to a CTE name.
///
/// One registry lives for one rule invocation, so names never leak between requests.
#[derive(Debug, Clone)]
pub struct CteRegistry {
    prefix: String,
    names: IndexMap<String, String>,
}

impl CteRegistry {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            names: IndexMap::new(),
        }
    }

    /// The name for `signature`, allocating one on first use.
    pub fn name_for(&mut self, signature: &str) -> String {
        if let Some(name) = self.names.get(signature) {
            return name.clone();
        }
        let mut hasher = Sha256::new();
        hasher.update(signature.as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        let mut len = 10;
        let name = loop {
            let candidate = format!("{}{}", self.prefix, &digest[..len]);
            if len == digest.len() || !self.names.values().any(|n| *n == candidate) {
                break candidate;
            }
            len += 2;
        };
        self.names.insert(signature.to_string(), name.clone());
        name
    }

    pub fn get(&self, signature: &str) -> Option<&str> {
        self.names.get(signature).map(String::as_str)
    }

    /// Signatures and names in allocation order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for CteRegistry {
    fn default() -> Self {
        Self::new("rs_")
    }
}
