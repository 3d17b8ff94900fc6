//! Configuration validation for instance specs.
//!
//! Format checks run here, before resolution: field bounds declared on the
//! configuration types through the `validator` derive, plus the name, label, address
//! and port formats the provider enforces. Combinations of settings are the
//! resolver's concern and are not checked twice.

use crate::error::{ConfigError, Result, VmError};
use std::net::Ipv4Addr;
use tracing::debug;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use super::spec::{FirewallDirection, FirewallRuleConfig, InstanceConfig, NetworkInterfaceConfig};

/// Maximum number of network interfaces on one instance.
const MAX_NETWORK_INTERFACES: usize = 8;

/// Maximum length of resource names, label keys and label values.
const MAX_NAME_LEN: usize = 63;

/// Maximum number of labels on one resource.
const MAX_LABELS: usize = 64;

/// Validator for instance configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates an instance configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error found; use [`Self::check`] to get all of them.
    pub fn validate(&self, config: &InstanceConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if let Some(first_error) = result.errors.first() {
            return Err(VmError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }));
        }

        debug!("Configuration validation passed");
        Ok(result)
    }

    /// Runs every check and collects all errors and warnings.
    #[must_use]
    pub fn check(&self, config: &InstanceConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        if let Err(errors) = config.validate() {
            collect_field_errors("", &errors, &mut result);
            result.errors.sort_by(|a, b| a.field.cmp(&b.field));
        }

        Self::validate_identity(config, &mut result);
        Self::validate_labels("labels", &config.labels, &mut result);
        Self::validate_disks(config, &mut result);
        Self::validate_interfaces(config, &mut result);
        Self::validate_firewall_rules(config, &mut result);
        Self::collect_warnings(config, &mut result);

        result
    }

    /// Validates name, project and zone formats.
    fn validate_identity(config: &InstanceConfig, result: &mut ValidationResult) {
        if !config.name.is_empty() && !is_valid_name(&config.name) {
            result.error(
                "name",
                format!(
                    "Name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    config.name
                ),
            );
        }

        if !config.project_id.is_empty() && !is_valid_project_id(&config.project_id) {
            result.error(
                "project_id",
                format!("Project id '{}' is invalid", config.project_id),
            );
        }

        if !config.zone.is_empty() && !is_valid_zone(&config.zone) {
            result.error(
                "zone",
                format!(
                    "Zone '{}' is invalid. Expected a form like 'europe-west1-b'.",
                    config.zone
                ),
            );
        }
    }

    /// Validates label keys and values.
    fn validate_labels(
        prefix: &str,
        labels: &std::collections::BTreeMap<String, String>,
        result: &mut ValidationResult,
    ) {
        if labels.len() > MAX_LABELS {
            result.error(
                prefix,
                format!("At most {MAX_LABELS} labels are allowed, got {}", labels.len()),
            );
        }

        for (key, value) in labels {
            if !is_valid_label(key, false) {
                result.error(
                    format!("{prefix}.{key}"),
                    format!(
                        "Label key '{key}' is invalid. Must start with a lowercase letter and use lowercase letters, digits, '-' or '_'."
                    ),
                );
            }
            if !is_valid_label(value, true) {
                result.error(
                    format!("{prefix}.{key}"),
                    format!("Label value '{value}' is invalid"),
                );
            }
        }
    }

    /// Validates attached disk names and labels.
    fn validate_disks(config: &InstanceConfig, result: &mut ValidationResult) {
        for (i, disk) in config.attached_disks.iter().enumerate() {
            let prefix = format!("attached_disks[{i}]");

            if !disk.name.is_empty() && !is_valid_name(&disk.name) {
                result.error(
                    format!("{prefix}.name"),
                    format!("Disk name '{}' is invalid", disk.name),
                );
            }

            let full_name_len = config.name.len() + 1 + disk.name.len();
            if full_name_len > MAX_NAME_LEN {
                result.error(
                    format!("{prefix}.name"),
                    format!(
                        "Disk name '{}-{}' exceeds {MAX_NAME_LEN} characters",
                        config.name, disk.name
                    ),
                );
            }

            Self::validate_labels(&format!("{prefix}.labels"), &disk.labels, result);
        }
    }

    /// Validates interface count and address formats.
    fn validate_interfaces(config: &InstanceConfig, result: &mut ValidationResult) {
        let interfaces = config.interfaces();
        if interfaces.len() > MAX_NETWORK_INTERFACES {
            result.error(
                "network_interfaces",
                format!(
                    "At most {MAX_NETWORK_INTERFACES} network interfaces are allowed, got {}",
                    interfaces.len()
                ),
            );
        }

        for (i, nic) in interfaces.iter().enumerate() {
            Self::validate_interface_addresses(i, nic, result);
        }

        for (index, options) in &config.network_interface_options {
            for (range, cidr) in &options.alias_ips {
                if !is_valid_cidr(cidr) {
                    result.error(
                        format!("network_interface_options.{index}.alias_ips.{range}"),
                        format!("'{cidr}' is not a valid IPv4 CIDR range"),
                    );
                }
            }
        }
    }

    fn validate_interface_addresses(
        index: usize,
        nic: &NetworkInterfaceConfig,
        result: &mut ValidationResult,
    ) {
        let Some(addresses) = &nic.addresses else {
            return;
        };

        let checks = [
            ("internal", addresses.internal.as_deref()),
            ("external", addresses.external.as_deref()),
        ];
        for (kind, address) in checks {
            if let Some(address) = address.filter(|a| !a.is_empty())
                && address.parse::<Ipv4Addr>().is_err()
            {
                result.error(
                    format!("network_interfaces[{index}].addresses.{kind}"),
                    format!("'{address}' is not a valid IPv4 address"),
                );
            }
        }
    }

    /// Validates firewall rule names, ranges and ports.
    fn validate_firewall_rules(config: &InstanceConfig, result: &mut ValidationResult) {
        let Some(rules) = &config.firewall_rules else {
            return;
        };

        for (name, rule) in rules {
            let prefix = format!("firewall_rules.{name}");

            if !is_valid_name(name) {
                result.error(&prefix, format!("Rule name '{name}' is invalid"));
            }

            for range in rule.ranges.iter().filter(|r| !is_valid_cidr(r)) {
                result.error(
                    format!("{prefix}.ranges"),
                    format!("'{range}' is not a valid IPv4 CIDR range"),
                );
            }

            Self::validate_rule_ports(&prefix, rule, result);

            if rule.priority > 65535 {
                result.error(
                    format!("{prefix}.priority"),
                    format!("Priority {} is out of range (0-65535)", rule.priority),
                );
            }
        }
    }

    fn validate_rule_ports(prefix: &str, rule: &FirewallRuleConfig, result: &mut ValidationResult) {
        let entries = rule
            .allow
            .iter()
            .map(|p| ("allow", p))
            .chain(rule.deny.iter().map(|p| ("deny", p)));

        for (action, protocol) in entries {
            if protocol.protocol.is_empty() {
                result.error(
                    format!("{prefix}.{action}"),
                    String::from("Protocol cannot be empty"),
                );
            }
            for port in protocol.ports.iter().filter(|p| !is_valid_port_spec(p)) {
                result.error(
                    format!("{prefix}.{action}"),
                    format!("'{port}' is not a valid port or port range"),
                );
            }
        }
    }

    /// Collects non-fatal findings.
    fn collect_warnings(config: &InstanceConfig, result: &mut ValidationResult) {
        if config.create_template {
            if config.group.is_some() {
                result
                    .warnings
                    .push(String::from("group: Ignored when create_template is set"));
            }
            if !config.iam.is_empty() || !config.tag_bindings.is_empty() {
                result.warnings.push(String::from(
                    "iam, tag_bindings: Instance bindings are ignored when create_template is set",
                ));
            }
        }

        if config
            .encryption
            .as_ref()
            .and_then(|e| e.disk_encryption_key_raw.as_deref())
            .is_some_and(|k| !k.is_empty())
        {
            result.warnings.push(String::from(
                "encryption.disk_encryption_key_raw: Raw keys in configuration files are stored in plain text; prefer kms_key_self_link",
            ));
        }

        if let Some(rules) = &config.firewall_rules {
            for (name, rule) in rules {
                let open_to_world = rule.direction == FirewallDirection::Ingress
                    && rule.ranges.iter().any(|r| r == "0.0.0.0/0");
                let exposes_ssh = rule
                    .allow
                    .iter()
                    .any(|p| p.ports.iter().any(|port| port == "22"));
                if open_to_world && exposes_ssh {
                    result.warnings.push(format!(
                        "firewall_rules.{name}: SSH is open to 0.0.0.0/0"
                    ));
                }
            }
        }

        for (i, nic) in config.interfaces().iter().enumerate() {
            let has_external = nic
                .addresses
                .as_ref()
                .and_then(|a| a.external.as_deref())
                .is_some_and(|a| !a.is_empty());
            if !nic.nat && (has_external || nic.allocate_external_address) {
                result.warnings.push(format!(
                    "network_interfaces[{i}]: External address settings have no effect without nat"
                ));
            }
        }

        if config.options.spot && config.options.deletion_protection {
            result.warnings.push(String::from(
                "options: Spot instances with deletion protection can still be preempted",
            ));
        }
    }
}

/// Flattens derive errors into field paths such as `attached_disks[0].size`.
fn collect_field_errors(prefix: &str, errors: &ValidationErrors, result: &mut ValidationResult) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for err in field_errors {
                    let message = err
                        .message
                        .as_ref()
                        .map_or_else(|| format!("failed '{}' check", err.code), ToString::to_string);
                    result.error(&path, message);
                }
            }
            ValidationErrorsKind::Struct(inner) => collect_field_errors(&path, inner, result),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_field_errors(&format!("{path}[{index}]"), inner, result);
                }
            }
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }

    let mut chars = name.chars();

    // First character must be a letter
    if let Some(first) = chars.next()
        && !first.is_ascii_lowercase()
    {
        return false;
    }

    // Rest must be lowercase alphanumeric or hyphen
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return false;
    }

    !name.ends_with('-')
}

/// Project ids are 6-30 characters, otherwise following the name rules.
fn is_valid_project_id(id: &str) -> bool {
    (6..=30).contains(&id.len()) && is_valid_name(id)
}

/// Zones look like `<region>-<letter>`, with a region like `europe-west1`.
fn is_valid_zone(zone: &str) -> bool {
    let Some((region, suffix)) = zone.rsplit_once('-') else {
        return false;
    };
    suffix.len() == 1
        && suffix.chars().all(|c| c.is_ascii_lowercase())
        && region.contains('-')
        && region.ends_with(|c: char| c.is_ascii_digit())
        && is_valid_name(region)
}

/// Label keys start with a letter; values may be empty.
fn is_valid_label(label: &str, is_value: bool) -> bool {
    if label.len() > MAX_NAME_LEN {
        return false;
    }
    if label.is_empty() {
        return is_value;
    }
    if !is_value && !label.starts_with(|c: char| c.is_ascii_lowercase()) {
        return false;
    }
    label
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

fn is_valid_cidr(cidr: &str) -> bool {
    let Some((address, prefix)) = cidr.split_once('/') else {
        return false;
    };
    address.parse::<Ipv4Addr>().is_ok() && prefix.parse::<u8>().is_ok_and(|p| p <= 32)
}

/// Accepts `80` or `8000-8080`.
fn is_valid_port_spec(spec: &str) -> bool {
    let parse = |s: &str| s.parse::<u16>().ok().filter(|p| *p > 0);
    match spec.split_once('-') {
        Some((low, high)) => matches!((parse(low), parse(high)), (Some(l), Some(h)) if l <= h),
        None => parse(spec).is_some(),
    }
}

impl ValidationResult {
    /// Records an error.
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
