//! Read values derived from a decision set.

use serde::Serialize;

use super::decision::DecisionSet;
use super::features::instance_self_link;
use super::shape::ShapeKind;

/// Values known once the decision set is resolved.
///
/// Anything the provider assigns during materialization (ephemeral IPs,
/// generated template names) is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleOutputs {
    /// Top-level resource kind.
    pub shape: ShapeKind,
    /// Instance self link.
    pub self_link: Option<String>,
    /// Instance name.
    pub instance_name: Option<String>,
    /// Template name prefix.
    pub template_name_prefix: Option<String>,
    /// Internal IP of the first interface, when reserved.
    pub internal_ip: Option<String>,
    /// External IP of the first interface, when static.
    pub external_ip: Option<String>,
    /// Attached service account email.
    pub service_account_email: Option<String>,
    /// IAM principal of the attached service account.
    pub service_account_iam_email: Option<String>,
    /// Instance group name.
    pub group_name: Option<String>,
}

impl ModuleOutputs {
    /// Derives outputs from a resolved decision set.
    #[must_use]
    pub fn from_decisions(decisions: &DecisionSet) -> Self {
        let machine = decisions.machine();
        let first_nic = machine.network_interfaces.first();
        let email = machine.service_account.as_ref().map(|sa| sa.email.clone());

        let (self_link, instance_name, template_name_prefix) = match decisions {
            DecisionSet::Instance { instance, .. } => (
                Some(instance_self_link(&machine.project, &instance.zone, &instance.name)),
                Some(instance.name.clone()),
                None,
            ),
            DecisionSet::Template { template, .. } => {
                (None, None, Some(template.name_prefix.clone()))
            }
        };

        Self {
            shape: decisions.shape(),
            self_link,
            instance_name,
            template_name_prefix,
            internal_ip: first_nic.and_then(|nic| nic.known_internal_ip().map(str::to_string)),
            external_ip: first_nic.and_then(|nic| nic.known_external_ip().map(str::to_string)),
            service_account_iam_email: email.as_ref().map(|e| format!("serviceAccount:{e}")),
            service_account_email: email,
            group_name: decisions.group().map(|(name, _)| name.to_string()),
        }
    }

    /// Returns the outputs as name and display value pairs, in a fixed order.
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, Option<&str>)> {
        vec![
            ("self_link", self.self_link.as_deref()),
            ("instance_name", self.instance_name.as_deref()),
            ("template_name_prefix", self.template_name_prefix.as_deref()),
            ("internal_ip", self.internal_ip.as_deref()),
            ("external_ip", self.external_ip.as_deref()),
            ("service_account_email", self.service_account_email.as_deref()),
            ("service_account_iam_email", self.service_account_iam_email.as_deref()),
            ("group_name", self.group_name.as_deref()),
        ]
    }
}
