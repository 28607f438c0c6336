//! The network-wide specification: every named definition a service can
//! reference.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{SpecError, SpecResult};
use crate::filter::{FilterSpec, Policer, PrefixList};
use crate::qos::{QosPolicy, QosProfile};
use crate::route_policy::RoutePolicy;
use crate::service::Service;
use crate::site::Region;
use crate::vpn::{IpVpn, MacVpn};

/// The network-wide policy layer: name → definition maps for services,
/// filters, prefix lists, policers, QoS, VPNs, route policies, regions,
/// and a generic alias map.
///
/// Invariant: a definition referenced by name from a service must exist
/// when that service is applied; deleting a definition is refused while
/// any service references it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
    #[serde(default)]
    pub filters: BTreeMap<String, FilterSpec>,
    #[serde(default)]
    pub prefix_lists: BTreeMap<String, PrefixList>,
    #[serde(default)]
    pub policers: BTreeMap<String, Policer>,
    #[serde(default)]
    pub qos_policies: BTreeMap<String, QosPolicy>,
    #[serde(default)]
    pub qos_profiles: BTreeMap<String, QosProfile>,
    #[serde(default)]
    pub ipvpns: BTreeMap<String, IpVpn>,
    #[serde(default)]
    pub macvpns: BTreeMap<String, MacVpn>,
    #[serde(default)]
    pub route_policies: BTreeMap<String, RoutePolicy>,
    #[serde(default)]
    pub regions: BTreeMap<String, Region>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl NetworkSpec {
    pub fn service(&self, name: &str) -> SpecResult<&Service> {
        self.services
            .get(name)
            .ok_or_else(|| SpecError::not_found("service", name))
    }

    pub fn filter(&self, name: &str) -> SpecResult<&FilterSpec> {
        self.filters
            .get(name)
            .ok_or_else(|| SpecError::not_found("filter", name))
    }

    pub fn prefix_list(&self, name: &str) -> SpecResult<&PrefixList> {
        self.prefix_lists
            .get(name)
            .ok_or_else(|| SpecError::not_found("prefix list", name))
    }

    pub fn policer(&self, name: &str) -> SpecResult<&Policer> {
        self.policers
            .get(name)
            .ok_or_else(|| SpecError::not_found("policer", name))
    }

    pub fn qos_policy(&self, name: &str) -> SpecResult<&QosPolicy> {
        self.qos_policies
            .get(name)
            .ok_or_else(|| SpecError::not_found("QoS policy", name))
    }

    pub fn qos_profile(&self, name: &str) -> SpecResult<&QosProfile> {
        self.qos_profiles
            .get(name)
            .ok_or_else(|| SpecError::not_found("QoS profile", name))
    }

    pub fn ipvpn(&self, name: &str) -> SpecResult<&IpVpn> {
        self.ipvpns
            .get(name)
            .ok_or_else(|| SpecError::not_found("ipvpn", name))
    }

    pub fn macvpn(&self, name: &str) -> SpecResult<&MacVpn> {
        self.macvpns
            .get(name)
            .ok_or_else(|| SpecError::not_found("macvpn", name))
    }

    pub fn route_policy(&self, name: &str) -> SpecResult<&RoutePolicy> {
        self.route_policies
            .get(name)
            .ok_or_else(|| SpecError::not_found("route policy", name))
    }

    pub fn region(&self, name: &str) -> SpecResult<&Region> {
        self.regions
            .get(name)
            .ok_or_else(|| SpecError::not_found("region", name))
    }

    pub fn alias(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    /// Adds or replaces a service definition.
    pub fn upsert_service(&mut self, name: impl Into<String>, service: Service) {
        self.services.insert(name.into(), service);
    }

    /// Removes a service definition. Service definitions have no
    /// spec-level referents, so this always succeeds; device-side
    /// bindings are the operator's concern.
    pub fn remove_service(&mut self, name: &str) -> SpecResult<Service> {
        self.services
            .remove(name)
            .ok_or_else(|| SpecError::not_found("service", name))
    }

    /// Removes a filter unless a service references it.
    pub fn remove_filter(&mut self, name: &str) -> SpecResult<FilterSpec> {
        if let Some(service) = self.first_service_where(|s| {
            s.ingress_filter.as_deref() == Some(name) || s.egress_filter.as_deref() == Some(name)
        }) {
            return Err(SpecError::in_use("filter", name, service));
        }
        self.filters
            .remove(name)
            .ok_or_else(|| SpecError::not_found("filter", name))
    }

    /// Removes a prefix list unless a filter rule or route policy term
    /// references it (both are reachable from services).
    pub fn remove_prefix_list(&mut self, name: &str) -> SpecResult<PrefixList> {
        for (service_name, service) in &self.services {
            for filter_name in [&service.ingress_filter, &service.egress_filter]
                .into_iter()
                .flatten()
            {
                if let Some(filter) = self.filters.get(filter_name) {
                    let referenced = filter.rules.iter().any(|r| {
                        r.src_prefix_list.as_deref() == Some(name)
                            || r.dst_prefix_list.as_deref() == Some(name)
                    });
                    if referenced {
                        return Err(SpecError::in_use("prefix list", name, service_name.clone()));
                    }
                }
            }
            if let Some(routing) = &service.routing {
                for policy_name in [&routing.import_policy, &routing.export_policy]
                    .into_iter()
                    .flatten()
                {
                    if let Some(policy) = self.route_policies.get(policy_name) {
                        if policy
                            .terms
                            .iter()
                            .any(|t| t.match_prefix_set.as_deref() == Some(name))
                        {
                            return Err(SpecError::in_use(
                                "prefix list",
                                name,
                                service_name.clone(),
                            ));
                        }
                    }
                }
                if routing.prefix_filter.as_deref() == Some(name) {
                    return Err(SpecError::in_use("prefix list", name, service_name.clone()));
                }
            }
        }
        self.prefix_lists
            .remove(name)
            .ok_or_else(|| SpecError::not_found("prefix list", name))
    }

    /// Removes a QoS policy unless a service references it.
    pub fn remove_qos_policy(&mut self, name: &str) -> SpecResult<QosPolicy> {
        if let Some(service) =
            self.first_service_where(|s| s.qos_policy.as_deref() == Some(name))
        {
            return Err(SpecError::in_use("QoS policy", name, service));
        }
        self.qos_policies
            .remove(name)
            .ok_or_else(|| SpecError::not_found("QoS policy", name))
    }

    /// Removes a route policy unless a service routing block references
    /// it.
    pub fn remove_route_policy(&mut self, name: &str) -> SpecResult<RoutePolicy> {
        if let Some(service) = self.first_service_where(|s| {
            s.routing.as_ref().is_some_and(|r| {
                r.import_policy.as_deref() == Some(name)
                    || r.export_policy.as_deref() == Some(name)
            })
        }) {
            return Err(SpecError::in_use("route policy", name, service));
        }
        self.route_policies
            .remove(name)
            .ok_or_else(|| SpecError::not_found("route policy", name))
    }

    /// Removes an ipvpn unless a service references it.
    pub fn remove_ipvpn(&mut self, name: &str) -> SpecResult<IpVpn> {
        if let Some(service) = self.first_service_where(|s| s.ipvpn.as_deref() == Some(name)) {
            return Err(SpecError::in_use("ipvpn", name, service));
        }
        self.ipvpns
            .remove(name)
            .ok_or_else(|| SpecError::not_found("ipvpn", name))
    }

    /// Removes a macvpn unless a service references it.
    pub fn remove_macvpn(&mut self, name: &str) -> SpecResult<MacVpn> {
        if let Some(service) = self.first_service_where(|s| s.macvpn.as_deref() == Some(name)) {
            return Err(SpecError::in_use("macvpn", name, service));
        }
        self.macvpns
            .remove(name)
            .ok_or_else(|| SpecError::not_found("macvpn", name))
    }

    fn first_service_where<F>(&self, predicate: F) -> Option<String>
    where
        F: Fn(&Service) -> bool,
    {
        self.services
            .iter()
            .find(|(_, service)| predicate(service))
            .map(|(name, _)| name.clone())
    }
}
