//! Configuration resolution.
//!
//! [`resolve`] maps a parsed [`InstanceConfig`] to a [`DecisionSet`]. It is a
//! pure function: every check runs before anything is returned, and the same
//! input always yields the same set.
//!
//! Sub-resources are ordered so that everything an entry depends on comes
//! before it: address reservations first, then the created service account,
//! then the resources attached to the primary instance.

mod decision;
mod disks;
mod encryption;
mod features;
mod network;
mod outputs;
mod shape;

pub use decision::{
    BootDiskDecision, DecisionSet, Dependency, DiskEncryptionKey, FirewallRuleDecision,
    GroupDecision, IamBinding, InstanceDecision, MachineDecision, PlannedResource, ResourceKind,
    ServiceAccountAttachment, ServiceAccountResource, TagBinding, TemplateDecision,
};
pub use disks::{
    DiskContext, DiskDecision, DiskLocation, DiskReference, DiskResource, DiskScope, DiskSource,
    ResolvedDiskOptions, attach_scope, merge_disk_options, resolve_disks,
};
pub use encryption::{EncryptionDecision, resolve_encryption};
pub use features::{
    CREATED_ACCOUNT_SCOPES, EXTERNAL_ACCOUNT_SCOPES, FeatureSet, ProvisioningModel,
    SchedulingDecision, ServiceAccountDecision, instance_self_link, resolve_optional_features,
    resolve_scheduling, resolve_service_account,
};
pub use network::{
    AddressAllocation, AddressReservation, AddressType, AliasIpRange, ExternalAccess,
    InternalAddress, NicDecision, allocate_addresses, resolve_network_interfaces,
};
pub use outputs::ModuleOutputs;
pub use shape::{ShapeKind, resolve_shape};

use tracing::{debug, info};

use crate::config::InstanceConfig;
use crate::error::ResolveError;

/// Resolves a configuration into its decision set.
///
/// # Errors
///
/// Returns the first `MissingRequiredField`, `InvalidCombination` or
/// `UnsupportedCombination` found. No partial result is ever returned.
pub fn resolve(config: &InstanceConfig) -> Result<DecisionSet, ResolveError> {
    check_required(config)?;

    let shape = resolve_shape(config);
    debug!("Resolving {} '{}'", shape, config.name);

    let encryption = resolve_encryption(config)?;
    let features = resolve_optional_features(config, shape)?;

    let disk_context = DiskContext {
        instance_name: &config.name,
        zone: &config.zone,
        shape,
        labels: &config.labels,
        encryption: encryption.attached.as_ref(),
    };
    let attached_disks = resolve_disks(
        &config.attached_disks,
        &config.attached_disk_defaults,
        &disk_context,
    )?;

    let allocation =
        allocate_addresses(&config.name, config.region(), shape, config.interfaces())?;
    let network_interfaces = resolve_network_interfaces(
        config.interfaces(),
        &config.network_interface_options,
        &allocation,
    )?;

    let mut resources: Vec<PlannedResource> = allocation
        .into_reservations()
        .into_iter()
        .map(|(name, reservation)| PlannedResource {
            name,
            resource: ResourceKind::Address(reservation),
            depends_on: Vec::new(),
        })
        .collect();

    let mut primary_depends_on: Vec<Dependency> = network_interfaces
        .iter()
        .flat_map(NicDecision::reservation_indices)
        .map(Dependency::Resource)
        .collect();

    if let ServiceAccountDecision::Created { resource, .. } = &features.service_account {
        primary_depends_on.push(Dependency::Resource(resources.len()));
        resources.push(PlannedResource {
            name: resource.account_id.clone(),
            resource: ResourceKind::ServiceAccount(resource.clone()),
            depends_on: Vec::new(),
        });
    }
    primary_depends_on.sort_unstable();
    primary_depends_on.dedup();

    let machine = MachineDecision {
        project: config.project_id.clone(),
        machine_type: config.instance_type.clone(),
        description: config.description.clone(),
        hostname: config.hostname.clone(),
        min_cpu_platform: config.min_cpu_platform.clone(),
        labels: config.labels.clone(),
        metadata: config.metadata.clone(),
        tags: config.tags.clone(),
        boot_disk: BootDiskDecision {
            image: config.boot_disk.image.clone(),
            disk_type: config.boot_disk.disk_type.clone(),
            size_gb: config.boot_disk.size,
            auto_delete: config.boot_disk.auto_delete,
            encryption: encryption.boot,
        },
        attached_disks,
        scratch_disks: (0..config.scratch_disks.count)
            .map(|_| config.scratch_disks.interface)
            .collect(),
        network_interfaces,
        scheduling: features.scheduling.clone(),
        shielded: features.shielded,
        confidential_compute: features.confidential_compute,
        service_account: features.service_account.attachment().cloned(),
        enable_display: config.enable_display,
        can_ip_forward: config.can_ip_forward,
        depends_on: primary_depends_on,
    };

    append_attached_resources(&mut resources, features);

    let decisions = if shape.is_instance() {
        DecisionSet::Instance {
            instance: InstanceDecision {
                name: config.name.clone(),
                zone: config.zone.clone(),
                deletion_protection: config.options.deletion_protection,
                allow_stopping_for_update: config.options.allow_stopping_for_update,
                machine,
            },
            resources,
        }
    } else {
        DecisionSet::Template {
            template: TemplateDecision {
                name_prefix: format!("{}-", config.name),
                region: config.region().to_string(),
                machine,
            },
            resources,
        }
    };

    info!(
        "Resolved {} '{}' with {} resources",
        shape,
        config.name,
        decisions.total_resources()
    );
    Ok(decisions)
}

fn check_required(config: &InstanceConfig) -> Result<(), ResolveError> {
    if config.project_id.is_empty() {
        return Err(ResolveError::missing("project_id"));
    }
    if config.zone.is_empty() {
        return Err(ResolveError::missing("zone"));
    }
    if config.name.is_empty() {
        return Err(ResolveError::missing("name"));
    }
    if config.interfaces().is_empty() {
        return Err(ResolveError::missing("network_interfaces"));
    }
    if config.firewall_rules.is_none() {
        return Err(ResolveError::missing("firewall_rules"));
    }
    Ok(())
}

fn append_attached_resources(resources: &mut Vec<PlannedResource>, features: FeatureSet) {
    let attached = |name: String, resource: ResourceKind| PlannedResource {
        name,
        resource,
        depends_on: vec![Dependency::Primary],
    };

    if let Some((name, group)) = features.group {
        resources.push(attached(name, ResourceKind::InstanceGroup(group)));
    }

    resources.extend(features.firewall_rules.into_iter().map(|(name, rule)| PlannedResource {
        name,
        resource: ResourceKind::FirewallRule(rule),
        depends_on: Vec::new(),
    }));

    resources.extend(
        features
            .iam
            .into_iter()
            .map(|binding| attached(binding.role.clone(), ResourceKind::IamBinding(binding))),
    );

    resources.extend(
        features
            .tag_bindings
            .into_iter()
            .map(|(name, binding)| attached(name, ResourceKind::TagBinding(binding))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OnHostMaintenance;

    const BASE: &str = r"
project_id: my-project
zone: europe-west1-b
name: web
network_interfaces:
  - network: default
    subnetwork: default
firewall_rules: {}
";

    fn config(extra: &str) -> InstanceConfig {
        serde_yaml::from_str(&format!("{BASE}{extra}")).unwrap()
    }

    #[test]
    fn test_minimal_instance() {
        let decisions = resolve(&config("")).unwrap();

        assert_eq!(decisions.shape(), ShapeKind::Instance);
        assert_eq!(decisions.primary_name(), "web");
        assert!(decisions.resources().is_empty());
        assert_eq!(decisions.total_resources(), 1);

        let machine = decisions.machine();
        assert_eq!(machine.machine_type, "f1-micro");
        assert_eq!(machine.boot_disk.size_gb, 10);
        assert!(machine.service_account.is_none());
        assert_eq!(machine.scheduling.on_host_maintenance, OnHostMaintenance::Migrate);
    }

    #[test]
    fn test_required_fields() {
        let cases = [
            ("zone: europe-west1-b\nname: web\n", "project_id"),
            ("project_id: p\nname: web\n", "zone"),
            ("project_id: p\nzone: europe-west1-b\n", "name"),
            ("project_id: p\nzone: europe-west1-b\nname: web\nfirewall_rules: {}\n", "network_interfaces"),
            (
                "project_id: p\nzone: europe-west1-b\nname: web\nnetwork_interfaces: []\nfirewall_rules: {}\n",
                "network_interfaces",
            ),
            (
                "project_id: p\nzone: europe-west1-b\nname: web\nnetwork_interfaces:\n  - network: n\n    subnetwork: s\n",
                "firewall_rules",
            ),
        ];

        for (yaml, field) in cases {
            let config: InstanceConfig = serde_yaml::from_str(yaml).unwrap();
            let err = resolve(&config).unwrap_err();
            assert_eq!(err, ResolveError::missing(field), "case {field}");
        }
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut cfg = config(
            r"
labels:
  team: web
  env: prod
attached_disks:
  - name: data
    size: 50
    source_type: image
    source: debian-11
service_account:
  create: true
iam:
  roles/compute.viewer: ['user:a@example.com']
",
        );
        cfg.name = String::from("web-server");

        let first = resolve(&cfg).unwrap();
        let second = resolve(&cfg).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_instance_with_image_disk() {
        let cfg = config(
            r"
attached_disks:
  - name: data
    size: 10
    source_type: image
    source: debian-11
",
        );
        let decisions = resolve(&cfg).unwrap();

        assert!(matches!(decisions, DecisionSet::Instance { .. }));
        let disks = decisions.created_disks();
        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].name, "web-data");
        assert_eq!(disks[0].source, DiskSource::Image(String::from("debian-11")));
        assert!(!disks[0].location.is_regional());
        assert!(decisions.disk_references().is_empty());
        assert_eq!(decisions.total_resources(), 2);
    }

    #[test]
    fn test_template_with_snapshot_disk() {
        let cfg = config(
            r"
create_template: true
attached_disks:
  - name: restore
    source_type: snapshot
    source: projects/my-project/global/snapshots/nightly
",
        );
        let err = resolve(&cfg).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedCombination");
        assert_eq!(err.field(), "attached_disks[0].source_type");
    }

    #[test]
    fn test_template_with_reserved_internal_address() {
        let cfg: InstanceConfig = serde_yaml::from_str(
            r"
project_id: my-project
zone: europe-west1-b
name: web
create_template: true
network_interfaces:
  - network: default
    subnetwork: default
    addresses:
      internal: 10.132.0.5
firewall_rules: {}
",
        )
        .unwrap();
        let err = resolve(&cfg).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedCombination");
        assert_eq!(err.field(), "network_interfaces[0].addresses.internal");
    }

    #[test]
    fn test_template_shape() {
        let decisions = resolve(&config("create_template: true\n")).unwrap();
        let DecisionSet::Template { template, .. } = &decisions else {
            panic!("expected a template");
        };
        assert_eq!(template.name_prefix, "web-");
        assert_eq!(template.region, "europe-west1");
    }

    #[test]
    fn test_group_with_empty_named_ports() {
        let decisions = resolve(&config("group:\n  named_ports: {}\n")).unwrap();
        let (name, group) = decisions.group().unwrap();
        assert_eq!(name, "web");
        assert!(group.named_ports.is_empty());
        assert_eq!(decisions.resources()[0].depends_on, vec![Dependency::Primary]);
    }

    #[test]
    fn test_group_ignored_for_template() {
        let with_group = resolve(&config(
            "create_template: true\ngroup:\n  named_ports: {}\niam:\n  roles/viewer: ['user:a@example.com']\n",
        ))
        .unwrap();
        let without_group = resolve(&config("create_template: true\n")).unwrap();

        assert!(with_group.group().is_none());
        assert_eq!(with_group, without_group);
    }

    #[test]
    fn test_reservations_precede_primary() {
        let cfg: InstanceConfig = serde_yaml::from_str(
            r"
project_id: my-project
zone: europe-west1-b
name: web-server
network_interfaces:
  - network: default
    subnetwork: default
    nat: true
    allocate_external_address: true
    addresses:
      internal: 10.132.0.5
service_account:
  create: true
firewall_rules: {}
",
        )
        .unwrap();
        let decisions = resolve(&cfg).unwrap();

        let kinds: Vec<&str> = decisions
            .resources()
            .iter()
            .map(|r| r.resource.kind_name())
            .collect();
        assert_eq!(kinds, vec!["address", "address", "service_account"]);
        assert_eq!(
            decisions.machine().depends_on,
            vec![
                Dependency::Resource(0),
                Dependency::Resource(1),
                Dependency::Resource(2)
            ]
        );
        assert_eq!(
            decisions.machine().service_account.as_ref().unwrap().email,
            "web-server@my-project.iam.gserviceaccount.com"
        );
    }

    #[test]
    fn test_attached_resources_follow_primary() {
        let cfg: InstanceConfig = serde_yaml::from_str(
            r"
project_id: my-project
zone: europe-west1-b
name: web
network_interfaces:
  - network: default
    subnetwork: default
tag_bindings:
  env: tagValues/123
firewall_rules:
  ssh:
    ranges: [35.235.240.0/20]
    allow:
      - protocol: tcp
        ports: ['22']
",
        )
        .unwrap();
        let decisions = resolve(&cfg).unwrap();

        assert_eq!(decisions.count_of("firewall_rule"), 1);
        assert_eq!(decisions.count_of("tag_binding"), 1);
        let tag = decisions
            .resources()
            .iter()
            .find(|r| r.resource.kind_name() == "tag_binding")
            .unwrap();
        assert_eq!(tag.depends_on, vec![Dependency::Primary]);
        assert_eq!(tag.name, "web-env");
    }

    #[test]
    fn test_first_error_wins_without_partial_output() {
        let cfg = config(
            r"
encryption:
  disk_encryption_key_raw: c2VjcmV0
  kms_key_self_link: projects/p/locations/l/keyRings/r/cryptoKeys/k
",
        );
        let err = resolve(&cfg).unwrap_err();
        assert_eq!(err.kind(), "InvalidCombination");
        assert_eq!(err.field(), "encryption");
    }

    #[test]
    fn test_outputs() {
        let cfg: InstanceConfig = serde_yaml::from_str(
            r"
project_id: my-project
zone: europe-west1-b
name: web
network_interfaces:
  - network: default
    subnetwork: default
    nat: true
    addresses:
      internal: 10.132.0.5
      external: 34.1.2.3
service_account:
  email: runner@my-project.iam.gserviceaccount.com
group: {}
firewall_rules: {}
",
        )
        .unwrap();
        let outputs = ModuleOutputs::from_decisions(&resolve(&cfg).unwrap());

        assert_eq!(
            outputs.self_link.as_deref(),
            Some("projects/my-project/zones/europe-west1-b/instances/web")
        );
        assert_eq!(outputs.internal_ip.as_deref(), Some("10.132.0.5"));
        assert_eq!(outputs.external_ip.as_deref(), Some("34.1.2.3"));
        assert_eq!(
            outputs.service_account_iam_email.as_deref(),
            Some("serviceAccount:runner@my-project.iam.gserviceaccount.com")
        );
        assert_eq!(outputs.group_name.as_deref(), Some("web"));
        assert!(outputs.template_name_prefix.is_none());
    }

    #[test]
    fn test_ephemeral_outputs_unknown() {
        let outputs = ModuleOutputs::from_decisions(&resolve(&config("")).unwrap());
        assert!(outputs.internal_ip.is_none());
        assert!(outputs.external_ip.is_none());
        assert!(outputs.service_account_email.is_none());
    }
}
