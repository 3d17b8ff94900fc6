//! Attached disk resolution.
//!
//! Every attached disk resolves to one of two decisions: a new disk resource
//! (from an image, from a snapshot, or empty) or a reference to a disk that
//! already exists. Per-disk options are merged field by field over the
//! configured defaults before anything else is decided.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::config::{
    AttachedDiskConfig, AttachedDiskDefaults, AttachedDiskOptions, DiskMode, DiskSourceType,
    zone_region,
};
use crate::error::ResolveError;

use super::decision::DiskEncryptionKey;
use super::shape::ShapeKind;

/// Disk options after merging per-disk overrides over the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDiskOptions {
    /// Attachment mode.
    pub mode: DiskMode,
    /// Disk type.
    pub disk_type: String,
    /// Second zone for a regional disk.
    pub replica_zone: Option<String>,
    /// Delete the disk together with the instance.
    pub auto_delete: bool,
}

/// What a new disk is initialized from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum DiskSource {
    /// An image.
    Image(String),
    /// A snapshot.
    Snapshot(String),
    /// Nothing; an empty disk.
    Blank,
}

/// Placement of a new disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum DiskLocation {
    /// Pinned to one zone.
    Zonal {
        /// Zone.
        zone: String,
    },
    /// Replicated across two zones of a region.
    Regional {
        /// Region.
        region: String,
        /// The instance zone and the replica zone.
        replica_zones: Vec<String>,
    },
}

/// A disk resource to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskResource {
    /// Resource name.
    pub name: String,
    /// Device name inside the guest.
    pub device_name: String,
    /// Size in GB.
    pub size_gb: u32,
    /// Initialization source.
    pub source: DiskSource,
    /// Disk type.
    pub disk_type: String,
    /// Attachment mode.
    pub mode: DiskMode,
    /// Delete with the instance.
    pub auto_delete: bool,
    /// Placement.
    pub location: DiskLocation,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// Encryption key.
    pub encryption: Option<DiskEncryptionKey>,
}

/// Scope of an existing disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskScope {
    /// A zonal disk.
    Zonal,
    /// A regional disk.
    Regional,
}

/// A reference to an existing disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskReference {
    /// Device name inside the guest.
    pub device_name: String,
    /// The configured source, verbatim.
    pub source: String,
    /// Scope inferred from the source.
    pub scope: DiskScope,
    /// Attachment mode.
    pub mode: DiskMode,
}

/// Resolution of one attached disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DiskDecision {
    /// Create a new disk resource and attach it.
    Create(DiskResource),
    /// Attach an existing disk; no disk resource is created.
    Attach(DiskReference),
}

/// Instance-level facts the disk resolution depends on.
#[derive(Debug, Clone, Copy)]
pub struct DiskContext<'a> {
    /// Instance name, used as the prefix of created disk names.
    pub instance_name: &'a str,
    /// Instance zone.
    pub zone: &'a str,
    /// Top-level resource kind.
    pub shape: ShapeKind,
    /// Instance labels, inherited by created disks.
    pub labels: &'a BTreeMap<String, String>,
    /// Key applied to every created disk.
    pub encryption: Option<&'a DiskEncryptionKey>,
}

/// Merges per-disk options over the defaults; a `None` field takes the default.
#[must_use]
pub fn merge_disk_options(
    options: Option<&AttachedDiskOptions>,
    defaults: &AttachedDiskDefaults,
) -> ResolvedDiskOptions {
    let options = options.cloned().unwrap_or_default();
    ResolvedDiskOptions {
        mode: options.mode.unwrap_or(defaults.mode),
        disk_type: options.disk_type.unwrap_or_else(|| defaults.disk_type.clone()),
        replica_zone: options.replica_zone.or_else(|| defaults.replica_zone.clone()),
        auto_delete: options.auto_delete.unwrap_or(defaults.auto_delete),
    }
}

/// Infers the scope of an existing disk from its source.
///
/// A link with a `regions/` segment is regional; bare names and `zones/` links are zonal.
#[must_use]
pub fn attach_scope(source: &str) -> DiskScope {
    if source.split('/').any(|segment| segment == "regions") {
        DiskScope::Regional
    } else {
        DiskScope::Zonal
    }
}

/// Resolves every attached disk.
///
/// # Errors
///
/// Returns an error if a disk name is duplicated, a source is missing, a
/// snapshot is requested for a template, or the replica zone is unusable.
pub fn resolve_disks(
    attached_disks: &[AttachedDiskConfig],
    defaults: &AttachedDiskDefaults,
    context: &DiskContext<'_>,
) -> Result<Vec<DiskDecision>, ResolveError> {
    let mut seen = HashSet::new();
    let mut decisions = Vec::with_capacity(attached_disks.len());

    for (i, disk) in attached_disks.iter().enumerate() {
        let prefix = format!("attached_disks[{i}]");

        if !seen.insert(disk.name.as_str()) {
            return Err(ResolveError::invalid(
                format!("{prefix}.name"),
                format!("duplicate disk name '{}'", disk.name),
            ));
        }

        let options = merge_disk_options(disk.options.as_ref(), defaults);
        let decision = resolve_disk(disk, options, context, &prefix)?;
        debug!("Disk {}: {decision}", disk.name);
        decisions.push(decision);
    }

    Ok(decisions)
}

fn resolve_disk(
    disk: &AttachedDiskConfig,
    options: ResolvedDiskOptions,
    context: &DiskContext<'_>,
    prefix: &str,
) -> Result<DiskDecision, ResolveError> {
    let source = match disk.source_type {
        None => DiskSource::Blank,
        Some(source_type) => {
            let source = disk
                .source
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ResolveError::missing(format!("{prefix}.source")))?;

            match source_type {
                DiskSourceType::Attach => {
                    return Ok(DiskDecision::Attach(DiskReference {
                        device_name: disk.name.clone(),
                        source: source.to_string(),
                        scope: attach_scope(source),
                        mode: options.mode,
                    }));
                }
                DiskSourceType::Image => DiskSource::Image(source.to_string()),
                DiskSourceType::Snapshot => {
                    if !context.shape.is_instance() {
                        return Err(ResolveError::unsupported(
                            format!("{prefix}.source_type"),
                            context.shape.as_str(),
                            "snapshot-sourced disks can only be created for instances",
                        ));
                    }
                    DiskSource::Snapshot(source.to_string())
                }
            }
        }
    };

    let location = disk_location(context.zone, options.replica_zone.as_deref(), prefix)?;

    let mut labels = context.labels.clone();
    labels.extend(disk.labels.iter().map(|(k, v)| (k.clone(), v.clone())));

    Ok(DiskDecision::Create(DiskResource {
        name: format!("{}-{}", context.instance_name, disk.name),
        device_name: disk.name.clone(),
        size_gb: disk.size,
        source,
        disk_type: options.disk_type,
        mode: options.mode,
        auto_delete: options.auto_delete,
        location,
        labels,
        encryption: context.encryption.cloned(),
    }))
}

fn disk_location(
    zone: &str,
    replica_zone: Option<&str>,
    prefix: &str,
) -> Result<DiskLocation, ResolveError> {
    let Some(replica_zone) = replica_zone else {
        return Ok(DiskLocation::Zonal {
            zone: zone.to_string(),
        });
    };

    let field = format!("{prefix}.options.replica_zone");
    if replica_zone == zone {
        return Err(ResolveError::invalid(
            field,
            format!("replica zone '{replica_zone}' must differ from the instance zone"),
        ));
    }

    let region = zone_region(zone);
    if zone_region(replica_zone) != region {
        return Err(ResolveError::invalid(
            field,
            format!("replica zone '{replica_zone}' is not in region '{region}'"),
        ));
    }

    Ok(DiskLocation::Regional {
        region: region.to_string(),
        replica_zones: vec![zone.to_string(), replica_zone.to_string()],
    })
}

impl DiskDecision {
    /// Returns the disk resource when this decision creates one.
    #[must_use]
    pub const fn created(&self) -> Option<&DiskResource> {
        match self {
            Self::Create(resource) => Some(resource),
            Self::Attach(_) => None,
        }
    }

    /// Returns the reference when this decision attaches an existing disk.
    #[must_use]
    pub const fn reference(&self) -> Option<&DiskReference> {
        match self {
            Self::Create(_) => None,
            Self::Attach(reference) => Some(reference),
        }
    }
}

impl DiskLocation {
    /// Returns true for regional placement.
    #[must_use]
    pub const fn is_regional(&self) -> bool {
        matches!(self, Self::Regional { .. })
    }
}

impl std::fmt::Display for DiskSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image(name) => write!(f, "image {name}"),
            Self::Snapshot(name) => write!(f, "snapshot {name}"),
            Self::Blank => write!(f, "blank"),
        }
    }
}

impl std::fmt::Display for DiskDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create(disk) => {
                let scope = if disk.location.is_regional() { "regional" } else { "zonal" };
                write!(
                    f,
                    "create {} ({}GB {}, {}, {scope}, {})",
                    disk.name, disk.size_gb, disk.disk_type, disk.source, disk.mode
                )
            }
            Self::Attach(reference) => {
                write!(f, "attach {} ({}, {})", reference.source, reference.scope, reference.mode)
            }
        }
    }
}

impl std::fmt::Display for DiskScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Zonal => "zonal",
            Self::Regional => "regional",
        })
    }
}
