//! Decision set types.
//!
//! A decision set is the resolver's complete output: exactly one top-level
//! resource (an instance or an instance template) plus the ordered list of
//! sub-resources the infrastructure engine has to materialize with it.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::config::{FirewallDirection, FirewallProtocol, ScratchInterface, ShieldedConfig};

use super::disks::DiskDecision;
use super::features::SchedulingDecision;
use super::network::{AddressReservation, NicDecision};
use super::shape::ShapeKind;

/// The resolved resource graph for one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionSet {
    /// A single instance.
    Instance {
        /// The instance resource.
        instance: InstanceDecision,
        /// Sub-resources in materialization order.
        resources: Vec<PlannedResource>,
    },
    /// An instance template.
    Template {
        /// The template resource.
        template: TemplateDecision,
        /// Sub-resources in materialization order.
        resources: Vec<PlannedResource>,
    },
}

/// Settings shared by instances and templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineDecision {
    /// Owning project.
    pub project: String,
    /// Machine type.
    pub machine_type: String,
    /// Description.
    pub description: Option<String>,
    /// Hostname.
    pub hostname: Option<String>,
    /// Minimum CPU platform.
    pub min_cpu_platform: Option<String>,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// Metadata.
    pub metadata: BTreeMap<String, String>,
    /// Network tags.
    pub tags: Vec<String>,
    /// Boot disk.
    pub boot_disk: BootDiskDecision,
    /// Attached disks, created or referenced.
    pub attached_disks: Vec<DiskDecision>,
    /// Local SSD scratch disks.
    pub scratch_disks: Vec<ScratchInterface>,
    /// Network interfaces in attachment order.
    pub network_interfaces: Vec<NicDecision>,
    /// Scheduling.
    pub scheduling: SchedulingDecision,
    /// Shielded VM settings.
    pub shielded: Option<ShieldedConfig>,
    /// Confidential VM.
    pub confidential_compute: bool,
    /// Attached service account.
    pub service_account: Option<ServiceAccountAttachment>,
    /// Virtual display device.
    pub enable_display: bool,
    /// IP forwarding.
    pub can_ip_forward: bool,
    /// Sub-resources that must exist before this resource.
    pub depends_on: Vec<Dependency>,
}

/// The instance resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceDecision {
    /// Instance name.
    pub name: String,
    /// Zone.
    pub zone: String,
    /// Deletion protection.
    pub deletion_protection: bool,
    /// Allow the provider to stop the instance for updates.
    pub allow_stopping_for_update: bool,
    /// Shared machine settings.
    #[serde(flatten)]
    pub machine: MachineDecision,
}

/// The instance template resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateDecision {
    /// Name prefix; the provider appends a unique suffix.
    pub name_prefix: String,
    /// Region derived from the configured zone.
    pub region: String,
    /// Shared machine settings.
    #[serde(flatten)]
    pub machine: MachineDecision,
}

/// Boot disk of the instance or template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootDiskDecision {
    /// Source image.
    pub image: String,
    /// Disk type.
    pub disk_type: String,
    /// Size in GB.
    pub size_gb: u32,
    /// Delete with the instance.
    pub auto_delete: bool,
    /// Encryption key, when boot encryption is requested.
    pub encryption: Option<DiskEncryptionKey>,
}

/// A customer-managed disk encryption key.
///
/// Serialized output never carries a raw key, only its SHA-256 digest.
#[derive(Clone, PartialEq, Eq)]
pub enum DiskEncryptionKey {
    /// Customer-supplied raw key.
    Raw(String),
    /// Cloud KMS key self link.
    Kms(String),
}

/// Service account bound to the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceAccountAttachment {
    /// Account email.
    pub email: String,
    /// OAuth scopes.
    pub scopes: Vec<String>,
}

/// A sub-resource emitted next to the top-level resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedResource {
    /// Resource name.
    pub name: String,
    /// Resource kind and settings.
    pub resource: ResourceKind,
    /// Resources that must exist first.
    pub depends_on: Vec<Dependency>,
}

/// A dependency edge of a planned or top-level resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    /// The top-level instance or template.
    Primary,
    /// Another planned resource, by index.
    Resource(usize),
}

/// Kinds of sub-resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceKind {
    /// A static address reservation.
    Address(AddressReservation),
    /// A service account created for the machine.
    ServiceAccount(ServiceAccountResource),
    /// An unmanaged instance group.
    InstanceGroup(GroupDecision),
    /// A firewall rule.
    FirewallRule(FirewallRuleDecision),
    /// An IAM role binding on the instance.
    IamBinding(IamBinding),
    /// A tag binding on the instance.
    TagBinding(TagBinding),
}

/// A service account to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceAccountResource {
    /// Account id.
    pub account_id: String,
    /// Resulting email.
    pub email: String,
    /// Display name.
    pub display_name: String,
}

/// An unmanaged instance group containing the instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupDecision {
    /// Zone.
    pub zone: String,
    /// Named ports.
    pub named_ports: BTreeMap<String, u16>,
    /// Member instance self links.
    pub instances: Vec<String>,
}

/// A firewall rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirewallRuleDecision {
    /// Network.
    pub network: String,
    /// Direction.
    pub direction: FirewallDirection,
    /// Priority.
    pub priority: u32,
    /// Source (ingress) or destination (egress) ranges.
    pub ranges: Vec<String>,
    /// Allowed protocols.
    pub allow: Vec<FirewallProtocol>,
    /// Denied protocols.
    pub deny: Vec<FirewallProtocol>,
    /// Target tags.
    pub target_tags: Vec<String>,
}

/// An IAM binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IamBinding {
    /// Role.
    pub role: String,
    /// Members.
    pub members: Vec<String>,
}

/// A tag binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagBinding {
    /// Parent resource path.
    pub parent: String,
    /// Zone the binding lives in.
    pub location: String,
    /// Tag value id.
    pub tag_value: String,
}

impl DecisionSet {
    /// Returns which top-level kind this set resolved to.
    #[must_use]
    pub const fn shape(&self) -> ShapeKind {
        match self {
            Self::Instance { .. } => ShapeKind::Instance,
            Self::Template { .. } => ShapeKind::Template,
        }
    }

    /// Returns the shared machine settings of the top-level resource.
    #[must_use]
    pub const fn machine(&self) -> &MachineDecision {
        match self {
            Self::Instance { instance, .. } => &instance.machine,
            Self::Template { template, .. } => &template.machine,
        }
    }

    /// Returns the top-level resource name (the name prefix for templates).
    #[must_use]
    pub fn primary_name(&self) -> &str {
        match self {
            Self::Instance { instance, .. } => &instance.name,
            Self::Template { template, .. } => &template.name_prefix,
        }
    }

    /// Returns the sub-resources in materialization order.
    #[must_use]
    pub fn resources(&self) -> &[PlannedResource] {
        match self {
            Self::Instance { resources, .. } | Self::Template { resources, .. } => resources,
        }
    }

    /// Returns the attached disks that create a new disk resource.
    #[must_use]
    pub fn created_disks(&self) -> Vec<&super::disks::DiskResource> {
        self.machine()
            .attached_disks
            .iter()
            .filter_map(DiskDecision::created)
            .collect()
    }

    /// Returns the attached disks that only reference an existing disk.
    #[must_use]
    pub fn disk_references(&self) -> Vec<&super::disks::DiskReference> {
        self.machine()
            .attached_disks
            .iter()
            .filter_map(DiskDecision::reference)
            .collect()
    }

    /// Returns the instance group, if one is emitted.
    #[must_use]
    pub fn group(&self) -> Option<(&str, &GroupDecision)> {
        self.resources().iter().find_map(|r| match &r.resource {
            ResourceKind::InstanceGroup(group) => Some((r.name.as_str(), group)),
            _ => None,
        })
    }

    /// Returns the number of planned resources of the given kind name.
    #[must_use]
    pub fn count_of(&self, kind: &str) -> usize {
        self.resources()
            .iter()
            .filter(|r| r.resource.kind_name() == kind)
            .count()
    }

    /// Returns the total number of resources the engine will materialize.
    #[must_use]
    pub fn total_resources(&self) -> usize {
        let standalone_disks = match self {
            Self::Instance { .. } => self.created_disks().len(),
            Self::Template { .. } => 0,
        };
        1 + standalone_disks + self.resources().len()
    }
}

impl ResourceKind {
    /// Returns the short kind name used in plans.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Address(_) => "address",
            Self::ServiceAccount(_) => "service_account",
            Self::InstanceGroup(_) => "instance_group",
            Self::FirewallRule(_) => "firewall_rule",
            Self::IamBinding(_) => "iam_binding",
            Self::TagBinding(_) => "tag_binding",
        }
    }
}

impl DiskEncryptionKey {
    /// Returns a description safe to print; raw keys are never shown.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Raw(_) => String::from("raw key (redacted)"),
            Self::Kms(link) => format!("kms {link}"),
        }
    }
}

impl Serialize for DiskEncryptionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DiskEncryptionKey", 2)?;
        match self {
            Self::Raw(key) => {
                state.serialize_field("source", "raw")?;
                state.serialize_field("sha256", &hex::encode(Sha256::digest(key.as_bytes())))?;
            }
            Self::Kms(link) => {
                state.serialize_field("source", "kms")?;
                state.serialize_field("value", link)?;
            }
        }
        state.end()
    }
}

impl std::fmt::Debug for DiskEncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw(_) => f.write_str("Raw(<redacted>)"),
            Self::Kms(link) => f.debug_tuple("Kms").field(link).finish(),
        }
    }
}
