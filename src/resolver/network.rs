//! Network interface and address resolution.
//!
//! Address reservations are allocated first and handed to interface
//! resolution as an [`AddressAllocation`], which can only be produced by
//! [`allocate_addresses`]. An interface can therefore never be resolved
//! against a reservation that has not been planned yet.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::{NetworkInterfaceConfig, NetworkInterfaceOptions, NicType};
use crate::error::ResolveError;

use super::shape::ShapeKind;

/// Kind of address reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AddressType {
    /// Internal address in a subnetwork.
    Internal,
    /// External address.
    External,
}

/// A static address reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressReservation {
    /// Internal or external.
    pub address_type: AddressType,
    /// Requested address; `None` lets the provider pick one.
    pub address: Option<String>,
    /// Region.
    pub region: String,
    /// Subnetwork, for internal addresses.
    pub subnetwork: Option<String>,
    /// Index of the interface using the reservation.
    pub interface: usize,
}

/// Planned reservations and the interfaces they belong to.
///
/// Reservations are listed in interface order; their positions are the
/// indices interfaces refer to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressAllocation {
    reservations: Vec<(String, AddressReservation)>,
    internal: BTreeMap<usize, usize>,
    external: BTreeMap<usize, usize>,
}

/// Internal address of an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InternalAddress {
    /// Assigned by the provider.
    Auto,
    /// Taken from a planned reservation.
    Reserved {
        /// The reserved address.
        address: String,
        /// Index of the reservation.
        reservation: usize,
    },
}

/// External access of an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExternalAccess {
    /// An ephemeral address assigned by the provider.
    Ephemeral,
    /// An existing static address.
    Static {
        /// The address.
        address: String,
    },
    /// A newly planned reservation.
    Reserved {
        /// Index of the reservation.
        reservation: usize,
    },
}

/// An alias IP range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasIpRange {
    /// Secondary range name in the subnetwork.
    pub subnetwork_range_name: String,
    /// CIDR routed to the interface.
    pub ip_cidr_range: String,
}

/// Resolution of one network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NicDecision {
    /// Position of the interface.
    pub index: usize,
    /// Network.
    pub network: String,
    /// Subnetwork.
    pub subnetwork: String,
    /// Internal address.
    pub internal: InternalAddress,
    /// External access; `None` when `nat` is off.
    pub external: Option<ExternalAccess>,
    /// Alias IP ranges.
    pub alias_ips: Vec<AliasIpRange>,
    /// NIC type; `None` uses the provider default.
    pub nic_type: Option<NicType>,
}

/// Plans the address reservations requested by the interfaces.
///
/// # Errors
///
/// Returns `InvalidCombination` if an interface both names an external
/// address and asks for a new one, and `UnsupportedCombination` if a
/// template asks for a reservation. Every instance created from a template
/// would claim the same reserved address.
pub fn allocate_addresses(
    instance_name: &str,
    region: &str,
    shape: ShapeKind,
    interfaces: &[NetworkInterfaceConfig],
) -> Result<AddressAllocation, ResolveError> {
    let mut allocation = AddressAllocation::default();

    for (i, nic) in interfaces.iter().enumerate() {
        let addresses = nic.addresses.clone().unwrap_or_default();

        if let Some(internal) = addresses.internal.filter(|a| !a.is_empty()) {
            if !shape.is_instance() {
                return Err(ResolveError::unsupported(
                    format!("network_interfaces[{i}].addresses.internal"),
                    shape.as_str(),
                    "static internal addresses can only be reserved for instances",
                ));
            }
            allocation.internal.insert(i, allocation.reservations.len());
            allocation.reservations.push((
                format!("{instance_name}-nic{i}-internal"),
                AddressReservation {
                    address_type: AddressType::Internal,
                    address: Some(internal),
                    region: region.to_string(),
                    subnetwork: Some(nic.subnetwork.clone()),
                    interface: i,
                },
            ));
        }

        if nic.nat && nic.allocate_external_address {
            if !shape.is_instance() {
                return Err(ResolveError::unsupported(
                    format!("network_interfaces[{i}].allocate_external_address"),
                    shape.as_str(),
                    "external addresses can only be reserved for instances",
                ));
            }
            if addresses.external.as_deref().is_some_and(|a| !a.is_empty()) {
                return Err(ResolveError::invalid(
                    format!("network_interfaces[{i}].allocate_external_address"),
                    "cannot allocate an external address when addresses.external is set",
                ));
            }
            allocation.external.insert(i, allocation.reservations.len());
            allocation.reservations.push((
                format!("{instance_name}-nic{i}-external"),
                AddressReservation {
                    address_type: AddressType::External,
                    address: None,
                    region: region.to_string(),
                    subnetwork: None,
                    interface: i,
                },
            ));
        }
    }

    debug!("Planned {} address reservations", allocation.reservations.len());
    Ok(allocation)
}

/// Resolves every interface against an address allocation.
///
/// # Errors
///
/// Returns an error if an interface lacks a network or subnetwork, or if
/// extended options name an interface index that does not exist.
pub fn resolve_network_interfaces(
    interfaces: &[NetworkInterfaceConfig],
    options_by_index: &BTreeMap<usize, NetworkInterfaceOptions>,
    allocation: &AddressAllocation,
) -> Result<Vec<NicDecision>, ResolveError> {
    if let Some(index) = options_by_index.keys().find(|&&k| k >= interfaces.len()) {
        return Err(ResolveError::invalid(
            format!("network_interface_options.{index}"),
            format!(
                "options given for interface {index} but only {} interfaces are defined",
                interfaces.len()
            ),
        ));
    }

    let mut decisions = Vec::with_capacity(interfaces.len());
    for (i, nic) in interfaces.iter().enumerate() {
        if nic.network.is_empty() {
            return Err(ResolveError::missing(format!("network_interfaces[{i}].network")));
        }
        if nic.subnetwork.is_empty() {
            return Err(ResolveError::missing(format!("network_interfaces[{i}].subnetwork")));
        }

        let internal = allocation.internal_address(i);
        let external = nic.nat.then(|| allocation.external_access(i, nic));

        let options = options_by_index.get(&i);
        let alias_ips = options
            .map(|o| {
                o.alias_ips
                    .iter()
                    .map(|(range, cidr)| AliasIpRange {
                        subnetwork_range_name: range.clone(),
                        ip_cidr_range: cidr.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        decisions.push(NicDecision {
            index: i,
            network: nic.network.clone(),
            subnetwork: nic.subnetwork.clone(),
            internal,
            external,
            alias_ips,
            nic_type: options.and_then(|o| o.nic_type),
        });
    }

    Ok(decisions)
}

impl AddressAllocation {
    /// Returns the planned reservations with their names.
    #[must_use]
    pub fn reservations(&self) -> &[(String, AddressReservation)] {
        &self.reservations
    }

    /// Consumes the allocation, returning the planned reservations.
    #[must_use]
    pub fn into_reservations(self) -> Vec<(String, AddressReservation)> {
        self.reservations
    }

    /// Returns true if nothing needs to be reserved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    fn internal_address(&self, interface: usize) -> InternalAddress {
        self.internal
            .get(&interface)
            .and_then(|&idx| {
                let (_, reservation) = &self.reservations[idx];
                reservation.address.clone().map(|address| InternalAddress::Reserved {
                    address,
                    reservation: idx,
                })
            })
            .unwrap_or(InternalAddress::Auto)
    }

    fn external_access(&self, interface: usize, nic: &NetworkInterfaceConfig) -> ExternalAccess {
        if let Some(&idx) = self.external.get(&interface) {
            return ExternalAccess::Reserved { reservation: idx };
        }

        nic.addresses
            .as_ref()
            .and_then(|a| a.external.clone())
            .filter(|a| !a.is_empty())
            .map_or(ExternalAccess::Ephemeral, |address| ExternalAccess::Static { address })
    }
}

impl NicDecision {
    /// Returns the reservations this interface refers to.
    #[must_use]
    pub fn reservation_indices(&self) -> Vec<usize> {
        let mut indices = Vec::new();
        if let InternalAddress::Reserved { reservation, .. } = self.internal {
            indices.push(reservation);
        }
        if let Some(ExternalAccess::Reserved { reservation }) = self.external {
            indices.push(reservation);
        }
        indices
    }

    /// Returns the internal address when it is known before materialization.
    #[must_use]
    pub fn known_internal_ip(&self) -> Option<&str> {
        match &self.internal {
            InternalAddress::Reserved { address, .. } => Some(address),
            InternalAddress::Auto => None,
        }
    }

    /// Returns the external address when it is known before materialization.
    #[must_use]
    pub fn known_external_ip(&self) -> Option<&str> {
        match &self.external {
            Some(ExternalAccess::Static { address }) => Some(address),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interfaces(yaml: &str) -> Vec<NetworkInterfaceConfig> {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn allocate(
        shape: ShapeKind,
        nics: &[NetworkInterfaceConfig],
    ) -> Result<AddressAllocation, ResolveError> {
        allocate_addresses("vm", "europe-west1", shape, nics)
    }

    const TWO_NICS: &str = r"
- network: projects/p/global/networks/prod
  subnetwork: projects/p/regions/europe-west1/subnetworks/apps
  nat: true
  allocate_external_address: true
  addresses:
    internal: 10.0.0.10
- network: projects/p/global/networks/mgmt
  subnetwork: projects/p/regions/europe-west1/subnetworks/mgmt
";

    #[test]
    fn test_allocation_orders_reservations_by_interface() {
        let nics = interfaces(TWO_NICS);
        let allocation = allocate(ShapeKind::Instance, &nics).unwrap();

        let names: Vec<&str> = allocation
            .reservations()
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, vec!["vm-nic0-internal", "vm-nic0-external"]);
        assert_eq!(allocation.reservations()[0].1.address.as_deref(), Some("10.0.0.10"));
        assert_eq!(allocation.reservations()[1].1.address_type, AddressType::External);
    }

    #[test]
    fn test_interfaces_reference_reservations() {
        let nics = interfaces(TWO_NICS);
        let allocation = allocate(ShapeKind::Instance, &nics).unwrap();
        let result = resolve_network_interfaces(&nics, &BTreeMap::new(), &allocation).unwrap();

        assert_eq!(
            result[0].internal,
            InternalAddress::Reserved {
                address: String::from("10.0.0.10"),
                reservation: 0
            }
        );
        assert_eq!(result[0].external, Some(ExternalAccess::Reserved { reservation: 1 }));
        assert_eq!(result[0].reservation_indices(), vec![0, 1]);

        assert_eq!(result[1].internal, InternalAddress::Auto);
        assert_eq!(result[1].external, None);
        assert!(result[1].reservation_indices().is_empty());
    }

    #[test]
    fn test_external_address_requires_nat() {
        let nics = interfaces(
            "- network: n\n  subnetwork: s\n  nat: false\n  addresses:\n    external: 34.1.2.3\n",
        );
        let allocation = allocate(ShapeKind::Instance, &nics).unwrap();
        let result = resolve_network_interfaces(&nics, &BTreeMap::new(), &allocation).unwrap();
        assert!(result[0].external.is_none());
        assert!(result[0].known_external_ip().is_none());
    }

    #[test]
    fn test_static_and_ephemeral_external() {
        let nics = interfaces(
            "- network: n\n  subnetwork: s\n  nat: true\n  addresses:\n    external: 34.1.2.3\n- network: n\n  subnetwork: s\n  nat: true\n",
        );
        let allocation = allocate(ShapeKind::Instance, &nics).unwrap();
        assert!(allocation.is_empty());

        let result = resolve_network_interfaces(&nics, &BTreeMap::new(), &allocation).unwrap();
        assert_eq!(result[0].known_external_ip(), Some("34.1.2.3"));
        assert_eq!(result[1].external, Some(ExternalAccess::Ephemeral));
    }

    #[test]
    fn test_conflicting_external_settings() {
        let nics = interfaces(
            "- network: n\n  subnetwork: s\n  nat: true\n  allocate_external_address: true\n  addresses:\n    external: 34.1.2.3\n",
        );
        let err = allocate(ShapeKind::Instance, &nics).unwrap_err();
        assert_eq!(err.field(), "network_interfaces[0].allocate_external_address");
    }

    #[test]
    fn test_template_rejects_reservations() {
        let internal =
            interfaces("- network: n\n  subnetwork: s\n  addresses:\n    internal: 10.0.0.10\n");
        let err = allocate(ShapeKind::Template, &internal).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedCombination");
        assert_eq!(err.field(), "network_interfaces[0].addresses.internal");

        let external = interfaces(
            "- network: n\n  subnetwork: s\n- network: n\n  subnetwork: s\n  nat: true\n  allocate_external_address: true\n",
        );
        let err = allocate(ShapeKind::Template, &external).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedCombination");
        assert_eq!(err.field(), "network_interfaces[1].allocate_external_address");
    }

    #[test]
    fn test_template_keeps_unreserved_addresses() {
        let nics = interfaces(
            "- network: n\n  subnetwork: s\n  nat: true\n  addresses:\n    external: 34.1.2.3\n- network: n\n  subnetwork: s\n  nat: true\n",
        );
        let allocation = allocate(ShapeKind::Template, &nics).unwrap();
        assert!(allocation.is_empty());

        let result = resolve_network_interfaces(&nics, &BTreeMap::new(), &allocation).unwrap();
        assert_eq!(result[0].internal, InternalAddress::Auto);
        assert_eq!(result[0].known_external_ip(), Some("34.1.2.3"));
        assert_eq!(result[1].external, Some(ExternalAccess::Ephemeral));
    }

    #[test]
    fn test_options_merged_by_index() {
        let nics = interfaces(TWO_NICS);
        let allocation = allocate(ShapeKind::Instance, &nics).unwrap();

        let mut options = BTreeMap::new();
        let mut alias_ips = BTreeMap::new();
        alias_ips.insert(String::from("pods"), String::from("10.4.0.0/24"));
        options.insert(
            1,
            NetworkInterfaceOptions {
                alias_ips,
                nic_type: Some(NicType::Gvnic),
            },
        );

        let result = resolve_network_interfaces(&nics, &options, &allocation).unwrap();
        assert!(result[0].alias_ips.is_empty());
        assert_eq!(result[0].nic_type, None);
        assert_eq!(result[1].alias_ips.len(), 1);
        assert_eq!(result[1].alias_ips[0].subnetwork_range_name, "pods");
        assert_eq!(result[1].nic_type, Some(NicType::Gvnic));
    }

    #[test]
    fn test_options_for_missing_interface() {
        let nics = interfaces("- network: n\n  subnetwork: s\n");
        let allocation = allocate(ShapeKind::Instance, &nics).unwrap();

        let mut options = BTreeMap::new();
        options.insert(3, NetworkInterfaceOptions::default());

        let err = resolve_network_interfaces(&nics, &options, &allocation).unwrap_err();
        assert_eq!(err.kind(), "InvalidCombination");
        assert_eq!(err.field(), "network_interface_options.3");
    }

    #[test]
    fn test_missing_subnetwork() {
        let nics = interfaces("- network: n\n  subnetwork: ''\n");
        let allocation = allocate(ShapeKind::Instance, &nics).unwrap();
        let err = resolve_network_interfaces(&nics, &BTreeMap::new(), &allocation).unwrap_err();
        assert_eq!(err, ResolveError::missing("network_interfaces[0].subnetwork"));
    }
}
