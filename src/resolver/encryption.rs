//! Disk encryption resolution.

use tracing::debug;

use crate::config::InstanceConfig;
use crate::error::ResolveError;

use super::decision::DiskEncryptionKey;

/// Which disks carry a customer-managed key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptionDecision {
    /// Key for the boot disk; set only when `encrypt_boot` is requested.
    pub boot: Option<DiskEncryptionKey>,
    /// Key for every created attached disk, independent of `encrypt_boot`.
    pub attached: Option<DiskEncryptionKey>,
}

/// Resolves the encryption settings.
///
/// # Errors
///
/// Returns `InvalidCombination` when both a raw key and a KMS key are set.
pub fn resolve_encryption(config: &InstanceConfig) -> Result<EncryptionDecision, ResolveError> {
    let Some(encryption) = &config.encryption else {
        return Ok(EncryptionDecision::default());
    };

    let raw = non_empty(encryption.disk_encryption_key_raw.as_deref());
    let kms = non_empty(encryption.kms_key_self_link.as_deref());

    let key = match (raw, kms) {
        (Some(_), Some(_)) => {
            return Err(ResolveError::invalid(
                "encryption",
                "disk_encryption_key_raw and kms_key_self_link are mutually exclusive",
            ));
        }
        (Some(raw), None) => Some(DiskEncryptionKey::Raw(raw.to_string())),
        (None, Some(kms)) => Some(DiskEncryptionKey::Kms(kms.to_string())),
        (None, None) => None,
    };

    debug!(
        "Encryption: key={}, encrypt_boot={}",
        key.as_ref().map_or_else(|| String::from("none"), DiskEncryptionKey::describe),
        encryption.encrypt_boot
    );

    Ok(EncryptionDecision {
        boot: if encryption.encrypt_boot { key.clone() } else { None },
        attached: key,
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(encryption: &str) -> InstanceConfig {
        let yaml = format!("name: vm\nencryption:\n{encryption}");
        serde_yaml::from_str(&yaml).unwrap()
    }

    #[test]
    fn test_no_encryption() {
        let config: InstanceConfig = serde_yaml::from_str("name: vm").unwrap();
        let decision = resolve_encryption(&config).unwrap();
        assert_eq!(decision, EncryptionDecision::default());
    }

    #[test]
    fn test_both_keys_rejected() {
        let config = config_with(
            "  disk_encryption_key_raw: c2VjcmV0\n  kms_key_self_link: projects/p/locations/l/keyRings/r/cryptoKeys/k\n",
        );
        let err = resolve_encryption(&config).unwrap_err();
        assert_eq!(err.kind(), "InvalidCombination");
        assert_eq!(err.field(), "encryption");
    }

    #[test]
    fn test_kms_key_without_encrypt_boot() {
        let config = config_with("  kms_key_self_link: projects/p/locations/l/keyRings/r/cryptoKeys/k\n");
        let decision = resolve_encryption(&config).unwrap();
        assert!(decision.boot.is_none());
        assert!(matches!(decision.attached, Some(DiskEncryptionKey::Kms(_))));
    }

    #[test]
    fn test_raw_key_with_encrypt_boot() {
        let config = config_with("  encrypt_boot: true\n  disk_encryption_key_raw: c2VjcmV0\n");
        let decision = resolve_encryption(&config).unwrap();
        assert_eq!(decision.boot, Some(DiskEncryptionKey::Raw(String::from("c2VjcmV0"))));
        assert_eq!(decision.boot, decision.attached);
    }

    #[test]
    fn test_raw_key_is_redacted() {
        let key = DiskEncryptionKey::Raw(String::from("c2VjcmV0"));
        assert!(!format!("{key:?}").contains("c2VjcmV0"));
        assert!(!key.describe().contains("c2VjcmV0"));

        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json["source"], "raw");
        assert!(!json.to_string().contains("c2VjcmV0"));
        assert_eq!(json["sha256"].as_str().map(str::len), Some(64));

        let other = serde_json::to_value(DiskEncryptionKey::Raw(String::from("b3RoZXI="))).unwrap();
        assert_ne!(json["sha256"], other["sha256"]);
    }

    #[test]
    fn test_kms_key_serialized_as_link() {
        let link = "projects/p/locations/l/keyRings/r/cryptoKeys/k";
        let json = serde_json::to_value(DiskEncryptionKey::Kms(link.to_string())).unwrap();
        assert_eq!(json["source"], "kms");
        assert_eq!(json["value"], link);
    }
}
