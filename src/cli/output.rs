//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{DiskMode, NicType, ValidationResult};
use crate::error::{ResolveError, Result, VmError};
use crate::resolver::{
    DecisionSet, Dependency, DiskDecision, DiskEncryptionKey, ExternalAccess, InternalAddress,
    MachineDecision, ModuleOutputs, NicDecision,
};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Resource row for table display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "#")]
    index: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Depends on")]
    depends_on: String,
}

/// Output row for table display.
#[derive(Tabled)]
struct OutputRow {
    #[tabled(rename = "Output")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a decision set for display.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON rendering fails.
    pub fn format_plan(
        &self,
        decisions: &DecisionSet,
        fingerprint: &str,
        detailed: bool,
    ) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(&PlanJson::new(decisions, fingerprint)),
            OutputFormat::Text => Ok(Self::format_plan_text(decisions, fingerprint, detailed)),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(decisions: &DecisionSet, fingerprint: &str, detailed: bool) -> String {
        let mut output = String::new();

        let _ = write!(
            output,
            "\nResolution plan: {} {}\n",
            decisions.shape(),
            decisions.primary_name().bold()
        );
        let _ = write!(
            output,
            "   Fingerprint: {}\n\n",
            &fingerprint[..8.min(fingerprint.len())]
        );

        let table = Table::new(Self::resource_rows(decisions)).to_string();
        output.push_str(&table);
        output.push('\n');

        let references = decisions.disk_references();
        if !references.is_empty() {
            output.push_str("\nExisting disks attached by reference:\n");
            for reference in references {
                let _ = writeln!(
                    output,
                    "   {} -> {} ({}, {})",
                    reference.device_name,
                    reference.source,
                    reference.scope,
                    mode_flag(reference.mode)
                );
            }
        }

        if detailed {
            Self::write_machine_details(&mut output, decisions.machine());
        }

        let _ = write!(
            output,
            "\nPlan: {} to create\n",
            decisions.total_resources().to_string().green()
        );

        output
    }

    /// Builds one row per resource the engine will materialize.
    fn resource_rows(decisions: &DecisionSet) -> Vec<ResourceRow> {
        let mut rows = vec![ResourceRow {
            index: String::from("-"),
            action: "+create".green().to_string(),
            kind: decisions.shape().to_string(),
            name: decisions.primary_name().to_string(),
            depends_on: describe_dependencies(decisions, &decisions.machine().depends_on),
        }];

        // Template disks are inline in the template, not standalone resources.
        if matches!(decisions, DecisionSet::Instance { .. }) {
            rows.extend(decisions.created_disks().into_iter().map(|disk| ResourceRow {
                index: String::from("-"),
                action: "+create".green().to_string(),
                kind: String::from("disk"),
                name: disk.name.clone(),
                depends_on: String::new(),
            }));
        }

        rows.extend(decisions.resources().iter().enumerate().map(|(i, resource)| {
            ResourceRow {
                index: i.to_string(),
                action: "+create".green().to_string(),
                kind: resource.resource.kind_name().to_string(),
                name: resource.name.clone(),
                depends_on: describe_dependencies(decisions, &resource.depends_on),
            }
        }));

        rows
    }

    /// Writes the machine settings.
    fn write_machine_details(output: &mut String, machine: &MachineDecision) {
        output.push_str("\nMachine:\n");
        let _ = writeln!(output, "   Project: {}", machine.project);
        let _ = writeln!(output, "   Machine type: {}", machine.machine_type);
        let _ = writeln!(
            output,
            "   Boot disk: {} ({}, {} GB{})",
            machine.boot_disk.image,
            machine.boot_disk.disk_type,
            machine.boot_disk.size_gb,
            machine
                .boot_disk
                .encryption
                .as_ref()
                .map(|key| format!(", {}", key.describe()))
                .unwrap_or_default()
        );

        for disk in &machine.attached_disks {
            let _ = writeln!(output, "   Disk: {disk}{}", disk_encryption(disk));
        }
        if !machine.scratch_disks.is_empty() {
            let _ = writeln!(output, "   Scratch disks: {}", machine.scratch_disks.len());
        }

        for nic in &machine.network_interfaces {
            let _ = writeln!(output, "   {}", describe_nic(nic));
        }

        let scheduling = &machine.scheduling;
        let _ = writeln!(
            output,
            "   Scheduling: {:?}, on_host_maintenance={}, automatic_restart={}",
            scheduling.provisioning_model,
            scheduling.on_host_maintenance,
            scheduling.automatic_restart
        );

        if let Some(shielded) = &machine.shielded {
            let _ = writeln!(
                output,
                "   Shielded VM: secure_boot={}, vtpm={}, integrity_monitoring={}",
                shielded.enable_secure_boot,
                shielded.enable_vtpm,
                shielded.enable_integrity_monitoring
            );
        }
        if machine.confidential_compute {
            output.push_str("   Confidential compute: enabled\n");
        }

        match &machine.service_account {
            Some(account) => {
                let _ = writeln!(
                    output,
                    "   Service account: {} ({} scopes)",
                    account.email,
                    account.scopes.len()
                );
            }
            None => output.push_str("   Service account: none\n"),
        }
    }

    /// Formats outputs for display.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON rendering fails.
    pub fn format_outputs(&self, outputs: &ModuleOutputs) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(outputs),
            OutputFormat::Text => {
                let rows: Vec<OutputRow> = outputs
                    .entries()
                    .into_iter()
                    .map(|(name, value)| OutputRow {
                        name: name.to_string(),
                        value: value.map_or_else(
                            || "(known after apply)".dimmed().to_string(),
                            str::to_string,
                        ),
                    })
                    .collect();

                Ok(format!("\n{}\n", Table::new(rows)))
            }
        }
    }

    /// Formats a successful validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON rendering fails.
    pub fn format_validation(
        &self,
        result: &ValidationResult,
        decisions: &DecisionSet,
        show_warnings: bool,
    ) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "status": "valid",
                    "shape": decisions.shape(),
                    "name": decisions.primary_name(),
                    "total_resources": decisions.total_resources(),
                    "warnings": result.warnings,
                });
                to_json(&json)
            }
            OutputFormat::Text => {
                let mut output = format!("{} Configuration is valid!\n", "✓".green());

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                let machine = decisions.machine();
                output.push_str("\nConfiguration summary:\n");
                let _ = writeln!(output, "   Kind: {}", decisions.shape());
                let _ = writeln!(output, "   Name: {}", decisions.primary_name());
                let _ = writeln!(output, "   Machine type: {}", machine.machine_type);
                let _ = writeln!(output, "   Attached disks: {}", machine.attached_disks.len());
                let _ = writeln!(
                    output,
                    "   Network interfaces: {}",
                    machine.network_interfaces.len()
                );
                let _ = writeln!(output, "   Resources: {}", decisions.total_resources());

                Ok(output)
            }
        }
    }

    /// Formats an error for display.
    #[must_use]
    pub fn format_error(&self, error: &VmError) -> String {
        match self.format {
            OutputFormat::Json => {
                let (kind, field) = match error {
                    VmError::Resolve(err) => (err.kind(), Some(err.field())),
                    VmError::Config(_) => ("ConfigError", None),
                    VmError::Io(_) => ("IoError", None),
                    VmError::Internal(_) => ("InternalError", None),
                };
                let json = serde_json::json!({
                    "status": "error",
                    "kind": kind,
                    "field": field,
                    "message": error.to_string(),
                });
                to_json(&json).unwrap_or_else(|_| error.to_string())
            }
            OutputFormat::Text => match error {
                VmError::Resolve(err) => format!("{} {}", "✗".red(), describe_resolve_error(err)),
                other => format!("{} {other}", "✗".red()),
            },
        }
    }
}

fn to_json(value: &impl serde::Serialize) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| VmError::internal(format!("Failed to render JSON: {e}")))
}

fn describe_resolve_error(err: &ResolveError) -> String {
    format!("{} ({})\n   {err}", err.kind().bold(), err.field())
}

fn describe_dependencies(decisions: &DecisionSet, depends_on: &[Dependency]) -> String {
    depends_on
        .iter()
        .map(|dep| match dep {
            Dependency::Primary => decisions.shape().to_string(),
            Dependency::Resource(idx) => format!("#{idx}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_nic(nic: &NicDecision) -> String {
    let internal = match &nic.internal {
        InternalAddress::Auto => String::from("auto"),
        InternalAddress::Reserved { address, reservation } => format!("{address} (#{reservation})"),
    };
    let external = match &nic.external {
        None => String::from("none"),
        Some(ExternalAccess::Ephemeral) => String::from("ephemeral"),
        Some(ExternalAccess::Static { address }) => address.clone(),
        Some(ExternalAccess::Reserved { reservation }) => format!("reserved (#{reservation})"),
    };

    format!(
        "nic{}: {} / {}, internal {internal}, external {external}, alias ranges {}, type {}",
        nic.index,
        nic.network,
        nic.subnetwork,
        nic.alias_ips.len(),
        nic_type_name(nic.nic_type)
    )
}

fn disk_encryption(disk: &DiskDecision) -> String {
    disk.created()
        .and_then(|d| d.encryption.as_ref())
        .map(DiskEncryptionKey::describe)
        .map(|key| format!(", {key}"))
        .unwrap_or_default()
}

const fn mode_flag(mode: DiskMode) -> &'static str {
    match mode {
        DiskMode::ReadWrite => "rw",
        DiskMode::ReadOnly => "ro",
    }
}

const fn nic_type_name(nic_type: Option<NicType>) -> &'static str {
    match nic_type {
        None => "default",
        Some(NicType::Gvnic) => "GVNIC",
        Some(NicType::VirtioNet) => "VIRTIO_NET",
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct PlanJson<'a> {
    generated_at: String,
    fingerprint: &'a str,
    total_resources: usize,
    decisions: &'a DecisionSet,
}

impl<'a> PlanJson<'a> {
    fn new(decisions: &'a DecisionSet, fingerprint: &'a str) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            fingerprint,
            total_resources: decisions.total_resources(),
            decisions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstanceConfig;
    use crate::resolver::resolve;

    fn decisions() -> DecisionSet {
        let config: InstanceConfig = serde_yaml::from_str(
            r"
project_id: my-project
zone: europe-west1-b
name: web
attached_disks:
  - name: data
    source_type: image
    source: debian-11
  - name: shared
    source_type: attach
    source: projects/my-project/zones/europe-west1-b/disks/shared
network_interfaces:
  - network: default
    subnetwork: default
firewall_rules: {}
",
        )
        .unwrap();
        resolve(&config).unwrap()
    }

    #[test]
    fn test_plan_text_lists_resources() {
        colored::control::set_override(false);
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let output = formatter
            .format_plan(&decisions(), "abcdef1234567890", true)
            .unwrap();

        assert!(output.contains("Fingerprint: abcdef12"));
        assert!(output.contains("web-data"));
        assert!(output.contains("shared -> projects/my-project/zones/europe-west1-b/disks/shared"));
        assert!(output.contains("Plan: 2 to create"));
        assert!(output.contains("Machine type: f1-micro"));
    }

    #[test]
    fn test_plan_json_embeds_decisions() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_plan(&decisions(), "abcdef", false).unwrap();
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(json["fingerprint"], "abcdef");
        assert_eq!(json["total_resources"], 2);
        assert_eq!(json["decisions"]["kind"], "instance");
        assert!(json["generated_at"].is_string());
    }

    #[test]
    fn test_plan_json_hides_raw_key() {
        let config: InstanceConfig = serde_yaml::from_str(
            r"
project_id: my-project
zone: europe-west1-b
name: web
encryption:
  encrypt_boot: true
  disk_encryption_key_raw: U0VDUkVUS0VZ
attached_disks:
  - name: data
network_interfaces:
  - network: default
    subnetwork: default
firewall_rules: {}
",
        )
        .unwrap();
        let decisions = resolve(&config).unwrap();

        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_plan(&decisions, "abcdef", true).unwrap();
        assert!(!output.contains("U0VDUkVUS0VZ"));

        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(json["decisions"]["instance"]["boot_disk"]["encryption"]["source"], "raw");
        assert!(json["decisions"]["instance"]["boot_disk"]["encryption"]["sha256"].is_string());
    }

    #[test]
    fn test_error_json_has_kind_and_field() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let error = VmError::Resolve(ResolveError::missing("zone"));
        let json: serde_json::Value = serde_json::from_str(&formatter.format_error(&error)).unwrap();

        assert_eq!(json["kind"], "MissingRequiredField");
        assert_eq!(json["field"], "zone");
    }

    #[test]
    fn test_nic_type_name() {
        assert_eq!(nic_type_name(None), "default");
        assert_eq!(nic_type_name(Some(NicType::Gvnic)), "GVNIC");
        assert_eq!(mode_flag(DiskMode::ReadOnly), "ro");
    }
}
