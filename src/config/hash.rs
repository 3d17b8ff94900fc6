//! Fingerprinting of decision sets.
//!
//! Fingerprints are SHA-256 digests of the canonical JSON form. Every map in
//! the hashed types is a `BTreeMap`, so equal values always serialize to the
//! same bytes.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Result, VmError};
use crate::resolver::DecisionSet;

/// Hasher for computing configuration fingerprints.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the fingerprint of a decision set.
    ///
    /// Two resolutions of the same input always produce the same fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the decision set cannot be serialized.
    pub fn hash_decisions(&self, decisions: &DecisionSet) -> Result<String> {
        Self::hash_json(decisions)
    }

    fn hash_json(value: &impl Serialize) -> Result<String> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| VmError::internal(format!("Failed to serialize for hashing: {e}")))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstanceConfig;
    use crate::resolver::resolve;

    fn config(name: &str) -> InstanceConfig {
        let yaml = format!(
            r"
project_id: my-project
zone: europe-west1-b
name: {name}
labels:
  b: two
  a: one
network_interfaces:
  - network: default
    subnetwork: default
firewall_rules: {{}}
"
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    #[test]
    fn test_decision_hash_deterministic() {
        let hasher = ConfigHasher::new();
        let cfg = config("web");

        let hash1 = hasher.hash_decisions(&resolve(&cfg).unwrap()).unwrap();
        let hash2 = hasher.hash_decisions(&resolve(&cfg).unwrap()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_configs_different_hash() {
        let hasher = ConfigHasher::new();

        let hash1 = hasher.hash_decisions(&resolve(&config("web")).unwrap()).unwrap();
        let hash2 = hasher.hash_decisions(&resolve(&config("db")).unwrap()).unwrap();

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        let full_hash = "abcdef1234567890abcdef1234567890";
        let short = hasher.short_hash(full_hash);

        assert_eq!(short, "abcdef12");
        assert_eq!(short.len(), 8);
    }
}
