//! Optional feature resolution.
//!
//! Each feature is resolved on its own. Instance-scoped features (group, IAM,
//! tag bindings) are dropped without error when a template is resolved.

use serde::Serialize;
use tracing::debug;

use crate::config::{InstanceConfig, OnHostMaintenance, ShieldedConfig};
use crate::error::ResolveError;

use super::decision::{
    FirewallRuleDecision, GroupDecision, IamBinding, ServiceAccountAttachment,
    ServiceAccountResource, TagBinding,
};
use super::shape::ShapeKind;

/// Default scopes for a service account created by the module.
pub const CREATED_ACCOUNT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Default scopes for an externally supplied service account.
pub const EXTERNAL_ACCOUNT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/devstorage.read_only",
    "https://www.googleapis.com/auth/logging.write",
    "https://www.googleapis.com/auth/monitoring.write",
];

/// Length bounds the provider enforces on service account ids.
const ACCOUNT_ID_LEN: std::ops::RangeInclusive<usize> = 6..=30;

/// Provisioning model of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProvisioningModel {
    /// Regular capacity.
    Standard,
    /// Spot capacity.
    Spot,
}

/// Final scheduling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulingDecision {
    /// Provisioning model.
    pub provisioning_model: ProvisioningModel,
    /// Preemptible flag.
    pub preemptible: bool,
    /// Restart after crashes or maintenance.
    pub automatic_restart: bool,
    /// Host maintenance behavior.
    pub on_host_maintenance: OnHostMaintenance,
}

/// How the machine obtains its service account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceAccountDecision {
    /// No service account is attached.
    None,
    /// An existing account is attached.
    External(ServiceAccountAttachment),
    /// A new account is created and attached.
    Created {
        /// The account to create.
        resource: ServiceAccountResource,
        /// The attachment to the machine.
        attachment: ServiceAccountAttachment,
    },
}

/// Every optional feature, resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSet {
    /// Shielded VM settings.
    pub shielded: Option<ShieldedConfig>,
    /// Scheduling.
    pub scheduling: SchedulingDecision,
    /// Confidential VM.
    pub confidential_compute: bool,
    /// Service account.
    pub service_account: ServiceAccountDecision,
    /// IAM bindings; empty for templates.
    pub iam: Vec<IamBinding>,
    /// Tag bindings; empty for templates.
    pub tag_bindings: Vec<(String, TagBinding)>,
    /// Instance group; `None` for templates.
    pub group: Option<(String, GroupDecision)>,
    /// Firewall rules with their names.
    pub firewall_rules: Vec<(String, FirewallRuleDecision)>,
}

/// Resolves every optional feature for the given shape.
///
/// # Errors
///
/// Returns `InvalidCombination` for scheduling settings that conflict with
/// confidential compute or spot provisioning, for a service account that is
/// both referenced and created, or for a firewall rule with no protocols.
pub fn resolve_optional_features(
    config: &InstanceConfig,
    shape: ShapeKind,
) -> Result<FeatureSet, ResolveError> {
    let scheduling = resolve_scheduling(config)?;
    let service_account = resolve_service_account(config)?;
    let firewall_rules = resolve_firewall_rules(config)?;

    let self_link = instance_self_link(&config.project_id, &config.zone, &config.name);

    let (iam, tag_bindings, group) = if shape.is_instance() {
        let iam = config
            .iam
            .iter()
            .map(|(role, members)| IamBinding {
                role: role.clone(),
                members: members.clone(),
            })
            .collect();

        let tag_bindings = config
            .tag_bindings
            .iter()
            .map(|(key, value)| {
                (
                    format!("{}-{key}", config.name),
                    TagBinding {
                        parent: format!("//compute.googleapis.com/{self_link}"),
                        location: config.zone.clone(),
                        tag_value: value.clone(),
                    },
                )
            })
            .collect();

        let group = config.group.as_ref().map(|group| {
            (
                group.name.clone().unwrap_or_else(|| config.name.clone()),
                GroupDecision {
                    zone: config.zone.clone(),
                    named_ports: group.named_ports.clone(),
                    instances: vec![self_link.clone()],
                },
            )
        });

        (iam, tag_bindings, group)
    } else {
        if config.group.is_some() || !config.iam.is_empty() || !config.tag_bindings.is_empty() {
            debug!("Ignoring instance-scoped group, IAM and tag bindings for template");
        }
        (Vec::new(), Vec::new(), None)
    };

    Ok(FeatureSet {
        shielded: config.shielded_config,
        scheduling,
        confidential_compute: config.confidential_compute,
        service_account,
        iam,
        tag_bindings,
        group,
        firewall_rules,
    })
}

/// Resolves scheduling, forcing the values confidential and spot machines need.
///
/// # Errors
///
/// Returns `InvalidCombination` if an explicit setting contradicts them.
pub fn resolve_scheduling(config: &InstanceConfig) -> Result<SchedulingDecision, ResolveError> {
    let requested = config.scheduling.clone().unwrap_or_default();
    let spot = config.options.spot;
    let must_terminate = spot || config.confidential_compute;

    if must_terminate && requested.on_host_maintenance == Some(OnHostMaintenance::Migrate) {
        let reason = if config.confidential_compute {
            "confidential compute"
        } else {
            "spot provisioning"
        };
        return Err(ResolveError::invalid(
            "scheduling.on_host_maintenance",
            format!("{reason} requires on_host_maintenance TERMINATE, got MIGRATE"),
        ));
    }

    if spot && requested.automatic_restart == Some(true) {
        return Err(ResolveError::invalid(
            "scheduling.automatic_restart",
            "spot instances cannot restart automatically",
        ));
    }

    let on_host_maintenance = if must_terminate {
        OnHostMaintenance::Terminate
    } else {
        requested.on_host_maintenance.unwrap_or_default()
    };

    Ok(SchedulingDecision {
        provisioning_model: if spot {
            ProvisioningModel::Spot
        } else {
            ProvisioningModel::Standard
        },
        preemptible: spot,
        automatic_restart: !spot && requested.automatic_restart.unwrap_or(true),
        on_host_maintenance,
    })
}

/// Resolves the service account.
///
/// # Errors
///
/// Returns `InvalidCombination` if an email is given and creation is
/// requested, or if the instance name cannot serve as the created account id.
pub fn resolve_service_account(
    config: &InstanceConfig,
) -> Result<ServiceAccountDecision, ResolveError> {
    let Some(account) = &config.service_account else {
        return Ok(ServiceAccountDecision::None);
    };

    let email = account.email.as_deref().filter(|e| !e.is_empty());
    let scopes = |defaults: &[&str]| {
        account
            .scopes
            .clone()
            .unwrap_or_else(|| defaults.iter().map(|s| (*s).to_string()).collect())
    };

    match (email, account.create) {
        (Some(_), true) => Err(ResolveError::invalid(
            "service_account",
            "email and create are mutually exclusive",
        )),
        (Some(email), false) => Ok(ServiceAccountDecision::External(ServiceAccountAttachment {
            email: email.to_string(),
            scopes: scopes(EXTERNAL_ACCOUNT_SCOPES),
        })),
        (None, true) => {
            if !ACCOUNT_ID_LEN.contains(&config.name.len()) {
                return Err(ResolveError::invalid(
                    "service_account.create",
                    format!(
                        "the created account id is the instance name '{}', which must be {} to {} characters long",
                        config.name,
                        ACCOUNT_ID_LEN.start(),
                        ACCOUNT_ID_LEN.end()
                    ),
                ));
            }
            let email = format!("{}@{}.iam.gserviceaccount.com", config.name, config.project_id);
            Ok(ServiceAccountDecision::Created {
                resource: ServiceAccountResource {
                    account_id: config.name.clone(),
                    email: email.clone(),
                    display_name: format!("Service account for {}", config.name),
                },
                attachment: ServiceAccountAttachment {
                    email,
                    scopes: scopes(CREATED_ACCOUNT_SCOPES),
                },
            })
        }
        (None, false) => Ok(ServiceAccountDecision::None),
    }
}

fn resolve_firewall_rules(
    config: &InstanceConfig,
) -> Result<Vec<(String, FirewallRuleDecision)>, ResolveError> {
    let Some(rules) = &config.firewall_rules else {
        return Ok(Vec::new());
    };

    let default_network = config
        .interfaces()
        .first()
        .map(|nic| nic.network.clone())
        .unwrap_or_default();

    rules
        .iter()
        .map(|(name, rule)| {
            if rule.allow.is_empty() && rule.deny.is_empty() {
                return Err(ResolveError::invalid(
                    format!("firewall_rules.{name}"),
                    "a firewall rule needs at least one allow or deny entry",
                ));
            }
            if !rule.allow.is_empty() && !rule.deny.is_empty() {
                return Err(ResolveError::invalid(
                    format!("firewall_rules.{name}"),
                    "allow and deny cannot be combined in one rule",
                ));
            }

            Ok((
                format!("{}-{name}", config.name),
                FirewallRuleDecision {
                    network: rule.network.clone().unwrap_or_else(|| default_network.clone()),
                    direction: rule.direction,
                    priority: rule.priority,
                    ranges: rule.ranges.clone(),
                    allow: rule.allow.clone(),
                    deny: rule.deny.clone(),
                    target_tags: rule.target_tags.clone().unwrap_or_else(|| config.tags.clone()),
                },
            ))
        })
        .collect()
}

/// Returns the relative self link of an instance.
#[must_use]
pub fn instance_self_link(project: &str, zone: &str, name: &str) -> String {
    format!("projects/{project}/zones/{zone}/instances/{name}")
}

impl ServiceAccountDecision {
    /// Returns the attachment, if any account is attached.
    #[must_use]
    pub const fn attachment(&self) -> Option<&ServiceAccountAttachment> {
        match self {
            Self::None => None,
            Self::External(attachment) | Self::Created { attachment, .. } => Some(attachment),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &str) -> InstanceConfig {
        let rules = if extra.contains("firewall_rules") {
            ""
        } else {
            "firewall_rules: {}\n"
        };
        let yaml = format!(
            "project_id: my-project\nzone: europe-west1-b\nname: vm\nnetwork_interfaces:\n  - network: default\n    subnetwork: default\n{rules}{extra}"
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    fn named(name: &str, extra: &str) -> InstanceConfig {
        let mut cfg = config(extra);
        cfg.name = name.to_string();
        cfg
    }

    #[test]
    fn test_default_scheduling() {
        let decision = resolve_scheduling(&config("")).unwrap();
        assert_eq!(decision.provisioning_model, ProvisioningModel::Standard);
        assert!(decision.automatic_restart);
        assert!(!decision.preemptible);
        assert_eq!(decision.on_host_maintenance, OnHostMaintenance::Migrate);
    }

    #[test]
    fn test_confidential_forces_terminate() {
        let decision = resolve_scheduling(&config("confidential_compute: true\n")).unwrap();
        assert_eq!(decision.on_host_maintenance, OnHostMaintenance::Terminate);
    }

    #[test]
    fn test_confidential_with_migrate_rejected() {
        let err = resolve_scheduling(&config(
            "confidential_compute: true\nscheduling:\n  on_host_maintenance: MIGRATE\n",
        ))
        .unwrap_err();
        assert_eq!(err.kind(), "InvalidCombination");
        assert_eq!(err.field(), "scheduling.on_host_maintenance");
    }

    #[test]
    fn test_spot_scheduling() {
        let decision = resolve_scheduling(&config("options:\n  spot: true\n")).unwrap();
        assert_eq!(decision.provisioning_model, ProvisioningModel::Spot);
        assert!(decision.preemptible);
        assert!(!decision.automatic_restart);
        assert_eq!(decision.on_host_maintenance, OnHostMaintenance::Terminate);

        let err = resolve_scheduling(&config(
            "options:\n  spot: true\nscheduling:\n  automatic_restart: true\n",
        ))
        .unwrap_err();
        assert_eq!(err.field(), "scheduling.automatic_restart");
    }

    #[test]
    fn test_service_account_modes() {
        assert_eq!(
            resolve_service_account(&config("")).unwrap(),
            ServiceAccountDecision::None
        );

        let external = resolve_service_account(&config(
            "service_account:\n  email: runner@my-project.iam.gserviceaccount.com\n",
        ))
        .unwrap();
        let attachment = external.attachment().unwrap();
        assert_eq!(attachment.scopes.len(), EXTERNAL_ACCOUNT_SCOPES.len());

        let created =
            resolve_service_account(&named("runner", "service_account:\n  create: true\n"))
                .unwrap();
        let attachment = created.attachment().unwrap();
        assert_eq!(attachment.email, "runner@my-project.iam.gserviceaccount.com");
        assert_eq!(attachment.scopes, vec![CREATED_ACCOUNT_SCOPES[0].to_string()]);

        let err = resolve_service_account(&config(
            "service_account:\n  create: true\n  email: runner@my-project.iam.gserviceaccount.com\n",
        ))
        .unwrap_err();
        assert_eq!(err.field(), "service_account");
    }

    #[test]
    fn test_created_account_id_length() {
        let account = "service_account:\n  create: true\n";

        let err = resolve_service_account(&config(account)).unwrap_err();
        assert_eq!(err.kind(), "InvalidCombination");
        assert_eq!(err.field(), "service_account.create");

        let long = "a".repeat(31);
        let err = resolve_service_account(&named(&long, account)).unwrap_err();
        assert_eq!(err.field(), "service_account.create");

        let longest = "a".repeat(30);
        for name in ["web-01", longest.as_str()] {
            let created = resolve_service_account(&named(name, account)).unwrap();
            assert!(matches!(created, ServiceAccountDecision::Created { .. }));
        }

        // Only a created account is bound by the instance name.
        let external = resolve_service_account(&config(
            "service_account:\n  email: runner@my-project.iam.gserviceaccount.com\n",
        ))
        .unwrap();
        assert!(matches!(external, ServiceAccountDecision::External(_)));
    }

    #[test]
    fn test_group_only_for_instance() {
        let cfg = config("group:\n  named_ports: {}\n");

        let features = resolve_optional_features(&cfg, ShapeKind::Instance).unwrap();
        let (name, group) = features.group.unwrap();
        assert_eq!(name, "vm");
        assert!(group.named_ports.is_empty());
        assert_eq!(
            group.instances,
            vec![String::from("projects/my-project/zones/europe-west1-b/instances/vm")]
        );

        let features = resolve_optional_features(&cfg, ShapeKind::Template).unwrap();
        assert!(features.group.is_none());
    }

    #[test]
    fn test_firewall_defaults() {
        let cfg = config(
            "tags: [web]\nfirewall_rules:\n  http:\n    ranges: [0.0.0.0/0]\n    allow:\n      - protocol: tcp\n        ports: ['80']\n",
        );
        let features = resolve_optional_features(&cfg, ShapeKind::Instance).unwrap();
        let (name, rule) = &features.firewall_rules[0];
        assert_eq!(name, "vm-http");
        assert_eq!(rule.network, "default");
        assert_eq!(rule.target_tags, vec![String::from("web")]);
        assert_eq!(rule.priority, 1000);
    }

    #[test]
    fn test_firewall_rule_without_protocols() {
        let cfg = config("firewall_rules:\n  empty:\n    ranges: [10.0.0.0/8]\n");
        let err = resolve_optional_features(&cfg, ShapeKind::Instance).unwrap_err();
        assert_eq!(err.field(), "firewall_rules.empty");
    }
}
