//! Configuration specification types for the resolver.
//!
//! This module defines all the structs that map to the `compute-vm.yaml` file.
//! Required fields deserialize to empty values when absent so that the resolver,
//! not the YAML parser, reports them as missing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// Default boot image.
pub const DEFAULT_BOOT_IMAGE: &str = "projects/debian-cloud/global/images/family/debian-11";

/// Default machine type.
pub const DEFAULT_INSTANCE_TYPE: &str = "f1-micro";

/// Default disk type for boot and attached disks.
pub const DEFAULT_DISK_TYPE: &str = "pd-balanced";

/// The root configuration structure: one instance or instance template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct InstanceConfig {
    /// Project that owns every emitted resource.
    #[serde(default)]
    #[validate(length(max = 30, message = "project id must be at most 30 characters"))]
    pub project_id: String,
    /// Zone the instance (or the template's region) lives in.
    #[serde(default)]
    pub zone: String,
    /// Instance name, or template name prefix.
    #[serde(default)]
    #[validate(length(max = 63, message = "name must be at most 63 characters"))]
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional fully qualified hostname.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Machine type.
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    /// Minimum CPU platform.
    #[serde(default)]
    pub min_cpu_platform: Option<String>,
    /// Emit an instance template instead of an instance.
    #[serde(default)]
    pub create_template: bool,
    /// Resource labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Instance metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Network tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Boot disk.
    #[serde(default)]
    #[validate(nested)]
    pub boot_disk: BootDiskConfig,
    /// Defaults merged into every attached disk's options.
    #[serde(default)]
    pub attached_disk_defaults: AttachedDiskDefaults,
    /// Additional disks.
    #[serde(default)]
    #[validate(nested)]
    pub attached_disks: Vec<AttachedDiskConfig>,
    /// Local SSD scratch disks.
    #[serde(default)]
    pub scratch_disks: ScratchDisksConfig,
    /// Network interfaces, in attachment order.
    #[serde(default)]
    pub network_interfaces: Option<Vec<NetworkInterfaceConfig>>,
    /// Extended interface options keyed by interface index.
    #[serde(default)]
    pub network_interface_options: BTreeMap<usize, NetworkInterfaceOptions>,
    /// Instance options.
    #[serde(default)]
    pub options: InstanceOptions,
    /// Scheduling overrides.
    #[serde(default)]
    pub scheduling: Option<SchedulingConfig>,
    /// Shielded VM settings.
    #[serde(default)]
    pub shielded_config: Option<ShieldedConfig>,
    /// Run as a confidential VM.
    #[serde(default)]
    pub confidential_compute: bool,
    /// Disk encryption.
    #[serde(default)]
    pub encryption: Option<EncryptionConfig>,
    /// Service account to attach or create.
    #[serde(default)]
    pub service_account: Option<ServiceAccountConfig>,
    /// IAM bindings on the instance, role to members.
    #[serde(default)]
    pub iam: BTreeMap<String, Vec<String>>,
    /// Tag bindings, key to tag value id.
    #[serde(default)]
    pub tag_bindings: BTreeMap<String, String>,
    /// Unmanaged instance group.
    #[serde(default)]
    pub group: Option<GroupConfig>,
    /// Firewall rules keyed by rule name.
    #[serde(default)]
    pub firewall_rules: Option<BTreeMap<String, FirewallRuleConfig>>,
    /// Enable the virtual display device.
    #[serde(default)]
    pub enable_display: bool,
    /// Allow forwarding of packets with non-matching source addresses.
    #[serde(default)]
    pub can_ip_forward: bool,
}

/// Boot disk configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct BootDiskConfig {
    /// Source image.
    #[serde(default = "default_boot_image")]
    pub image: String,
    /// Disk type.
    #[serde(default = "default_disk_type", rename = "type")]
    pub disk_type: String,
    /// Size in GB.
    #[serde(default = "default_disk_size")]
    #[validate(range(min = 10, max = 65536, message = "boot disk size must be 10-65536 GB"))]
    pub size: u32,
    /// Delete the disk together with the instance.
    #[serde(default = "default_true")]
    pub auto_delete: bool,
}

/// Source kinds for an attached disk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiskSourceType {
    /// Create a new disk from an image.
    Image,
    /// Create a new disk from a snapshot.
    Snapshot,
    /// Attach an existing disk.
    Attach,
}

/// Disk attachment mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiskMode {
    /// Read-write attachment.
    #[default]
    ReadWrite,
    /// Read-only attachment.
    ReadOnly,
}

/// An additional disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct AttachedDiskConfig {
    /// Disk name, suffixed to the instance name for created disks.
    #[validate(length(min = 1, max = 63, message = "disk name must be 1-63 characters"))]
    pub name: String,
    /// Size in GB.
    #[serde(default = "default_disk_size")]
    #[validate(range(min = 1, max = 65536, message = "disk size must be 1-65536 GB"))]
    pub size: u32,
    /// Image, snapshot or existing disk, depending on `source_type`.
    #[serde(default)]
    pub source: Option<String>,
    /// How `source` is interpreted; `None` creates an empty disk.
    #[serde(default)]
    pub source_type: Option<DiskSourceType>,
    /// Per-disk overrides of `attached_disk_defaults`.
    #[serde(default)]
    pub options: Option<AttachedDiskOptions>,
    /// Disk labels, merged over the instance labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Per-disk option overrides; `None` falls back to the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachedDiskOptions {
    /// Attachment mode.
    #[serde(default)]
    pub mode: Option<DiskMode>,
    /// Second zone for a regional disk.
    #[serde(default)]
    pub replica_zone: Option<String>,
    /// Disk type.
    #[serde(default, rename = "type")]
    pub disk_type: Option<String>,
    /// Delete the disk together with the instance.
    #[serde(default)]
    pub auto_delete: Option<bool>,
}

/// Defaults applied to every attached disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachedDiskDefaults {
    /// Attachment mode.
    #[serde(default)]
    pub mode: DiskMode,
    /// Second zone for a regional disk.
    #[serde(default)]
    pub replica_zone: Option<String>,
    /// Disk type.
    #[serde(default = "default_disk_type", rename = "type")]
    pub disk_type: String,
    /// Delete the disk together with the instance.
    #[serde(default = "default_true")]
    pub auto_delete: bool,
}

/// Local SSD scratch disks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScratchDisksConfig {
    /// Number of scratch disks.
    #[serde(default)]
    pub count: u32,
    /// Disk interface.
    #[serde(default)]
    pub interface: ScratchInterface,
}

/// Scratch disk interface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScratchInterface {
    /// NVMe interface.
    #[default]
    Nvme,
    /// SCSI interface.
    Scsi,
}

/// A network interface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkInterfaceConfig {
    /// Network self link or name.
    pub network: String,
    /// Subnetwork self link or name.
    pub subnetwork: String,
    /// Give the interface an external address.
    #[serde(default)]
    pub nat: bool,
    /// Static addresses.
    #[serde(default)]
    pub addresses: Option<InterfaceAddresses>,
    /// Reserve a new external address for this interface.
    #[serde(default)]
    pub allocate_external_address: bool,
}

/// Static addresses for an interface.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterfaceAddresses {
    /// Internal IP to reserve.
    #[serde(default)]
    pub internal: Option<String>,
    /// Existing external IP to use when `nat` is set.
    #[serde(default)]
    pub external: Option<String>,
}

/// Extended options for the interface at a given index.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkInterfaceOptions {
    /// Alias IP ranges, secondary range name to CIDR.
    #[serde(default)]
    pub alias_ips: BTreeMap<String, String>,
    /// Virtual NIC type.
    #[serde(default)]
    pub nic_type: Option<NicType>,
}

/// Virtual NIC types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NicType {
    /// Google virtual NIC.
    Gvnic,
    /// Virtio network device.
    VirtioNet,
}

/// Instance options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceOptions {
    /// Allow the provider to stop the instance to apply updates.
    #[serde(default = "default_true")]
    pub allow_stopping_for_update: bool,
    /// Protect the instance from deletion.
    #[serde(default)]
    pub deletion_protection: bool,
    /// Use the spot provisioning model.
    #[serde(default)]
    pub spot: bool,
}

/// Host maintenance behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum OnHostMaintenance {
    /// Live-migrate the instance.
    #[default]
    Migrate,
    /// Stop the instance.
    Terminate,
}

/// Scheduling overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulingConfig {
    /// Host maintenance behavior.
    #[serde(default)]
    pub on_host_maintenance: Option<OnHostMaintenance>,
    /// Restart automatically after a crash or maintenance.
    #[serde(default)]
    pub automatic_restart: Option<bool>,
}

/// Shielded VM settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShieldedConfig {
    /// Secure boot.
    #[serde(default = "default_true")]
    pub enable_secure_boot: bool,
    /// Virtual TPM.
    #[serde(default = "default_true")]
    pub enable_vtpm: bool,
    /// Integrity monitoring.
    #[serde(default = "default_true")]
    pub enable_integrity_monitoring: bool,
}

/// Disk encryption settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptionConfig {
    /// Apply the key to the boot disk.
    #[serde(default)]
    pub encrypt_boot: bool,
    /// Customer-supplied raw key.
    #[serde(default)]
    pub disk_encryption_key_raw: Option<String>,
    /// KMS key self link.
    #[serde(default)]
    pub kms_key_self_link: Option<String>,
}

/// Service account settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceAccountConfig {
    /// Email of an existing service account.
    #[serde(default)]
    pub email: Option<String>,
    /// Create a dedicated service account.
    #[serde(default)]
    pub create: bool,
    /// OAuth scopes; defaults depend on how the account is obtained.
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

/// Unmanaged instance group settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupConfig {
    /// Group name; defaults to the instance name.
    #[serde(default)]
    pub name: Option<String>,
    /// Named ports, name to port.
    #[serde(default)]
    pub named_ports: BTreeMap<String, u16>,
}

/// Traffic direction of a firewall rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FirewallDirection {
    /// Incoming traffic.
    #[default]
    Ingress,
    /// Outgoing traffic.
    Egress,
}

/// A firewall rule applying to the instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirewallRuleConfig {
    /// Traffic direction.
    #[serde(default)]
    pub direction: FirewallDirection,
    /// Source ranges for ingress, destination ranges for egress.
    #[serde(default)]
    pub ranges: Vec<String>,
    /// Allowed protocols and ports.
    #[serde(default)]
    pub allow: Vec<FirewallProtocol>,
    /// Denied protocols and ports.
    #[serde(default)]
    pub deny: Vec<FirewallProtocol>,
    /// Rule priority.
    #[serde(default = "default_firewall_priority")]
    pub priority: u32,
    /// Network; defaults to the first interface's network.
    #[serde(default)]
    pub network: Option<String>,
    /// Target tags; defaults to the instance tags.
    #[serde(default)]
    pub target_tags: Option<Vec<String>>,
}

/// Protocol and ports matched by a firewall rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirewallProtocol {
    /// Protocol name or number.
    pub protocol: String,
    /// Ports or port ranges.
    #[serde(default)]
    pub ports: Vec<String>,
}

// Default value functions

const fn default_true() -> bool {
    true
}

const fn default_disk_size() -> u32 {
    10
}

const fn default_firewall_priority() -> u32 {
    1000
}

fn default_instance_type() -> String {
    String::from(DEFAULT_INSTANCE_TYPE)
}

fn default_boot_image() -> String {
    String::from(DEFAULT_BOOT_IMAGE)
}

fn default_disk_type() -> String {
    String::from(DEFAULT_DISK_TYPE)
}

impl Default for BootDiskConfig {
    fn default() -> Self {
        Self {
            image: default_boot_image(),
            disk_type: default_disk_type(),
            size: default_disk_size(),
            auto_delete: true,
        }
    }
}

impl Default for AttachedDiskDefaults {
    fn default() -> Self {
        Self {
            mode: DiskMode::ReadWrite,
            replica_zone: None,
            disk_type: default_disk_type(),
            auto_delete: true,
        }
    }
}

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            allow_stopping_for_update: true,
            deletion_protection: false,
            spot: false,
        }
    }
}

impl Default for ShieldedConfig {
    fn default() -> Self {
        Self {
            enable_secure_boot: true,
            enable_vtpm: true,
            enable_integrity_monitoring: true,
        }
    }
}

impl InstanceConfig {
    /// Returns the region the configured zone belongs to.
    #[must_use]
    pub fn region(&self) -> &str {
        zone_region(&self.zone)
    }

    /// Returns the configured interfaces, or an empty slice when absent.
    #[must_use]
    pub fn interfaces(&self) -> &[NetworkInterfaceConfig] {
        self.network_interfaces.as_deref().unwrap_or_default()
    }
}

impl DiskSourceType {
    /// Returns the lowercase name used in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Snapshot => "snapshot",
            Self::Attach => "attach",
        }
    }
}

impl std::fmt::Display for DiskMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ReadWrite => "READ_WRITE",
            Self::ReadOnly => "READ_ONLY",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for OnHostMaintenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Migrate => "MIGRATE",
            Self::Terminate => "TERMINATE",
        };
        write!(f, "{s}")
    }
}

/// Returns the region part of a zone name (`europe-west1-b` gives `europe-west1`).
#[must_use]
pub fn zone_region(zone: &str) -> &str {
    zone.rsplit_once('-').map_or(zone, |(region, _)| region)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_region() {
        assert_eq!(zone_region("europe-west1-b"), "europe-west1");
        assert_eq!(zone_region("us-central1-a"), "us-central1");
        assert_eq!(zone_region("local"), "local");
    }

    #[test]
    fn test_defaults_applied() {
        let config: InstanceConfig = serde_yaml::from_str("name: test").unwrap();
        assert_eq!(config.instance_type, DEFAULT_INSTANCE_TYPE);
        assert_eq!(config.boot_disk.image, DEFAULT_BOOT_IMAGE);
        assert_eq!(config.boot_disk.size, 10);
        assert_eq!(config.attached_disk_defaults.disk_type, DEFAULT_DISK_TYPE);
        assert_eq!(config.attached_disk_defaults.mode, DiskMode::ReadWrite);
        assert!(config.options.allow_stopping_for_update);
        assert!(config.network_interfaces.is_none());
        assert!(config.firewall_rules.is_none());
    }

    #[test]
    fn test_null_source_type() {
        let yaml = r"
name: data
size: 20
source_type: null
options:
  mode: null
  type: pd-ssd
";
        let disk: AttachedDiskConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(disk.source_type.is_none());
        let options = disk.options.unwrap();
        assert!(options.mode.is_none());
        assert_eq!(options.disk_type.as_deref(), Some("pd-ssd"));
    }

    #[test]
    fn test_interface_options_keyed_by_index() {
        let yaml = r"
network_interface_options:
  1:
    alias_ips:
      services: 10.10.0.0/24
    nic_type: GVNIC
";
        let config: InstanceConfig = serde_yaml::from_str(yaml).unwrap();
        let options = config.network_interface_options.get(&1).unwrap();
        assert_eq!(options.nic_type, Some(NicType::Gvnic));
        assert_eq!(options.alias_ips.len(), 1);
    }
}
