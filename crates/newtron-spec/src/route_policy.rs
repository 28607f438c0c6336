//! Route policy definitions, expanded into ROUTE_MAP, PREFIX_SET, and
//! COMMUNITY_SET rows.

use serde::{Deserialize, Serialize};

use crate::filter::FilterAction;

/// A named community with its literal member, e.g.
/// `{"name": "cust-comm", "member": "64512:100"}`. Emitted as a
/// COMMUNITY_SET row when referenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityMatch {
    pub name: String,
    pub member: String,
}

/// One term of a route policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePolicyTerm {
    pub sequence: u32,
    pub operation: FilterAction,
    /// Name of a prefix list matched as a PREFIX_SET.
    #[serde(default)]
    pub match_prefix_set: Option<String>,
    #[serde(default)]
    pub match_community: Option<CommunityMatch>,
    #[serde(default)]
    pub set_local_pref: Option<u32>,
    #[serde(default)]
    pub set_community: Option<String>,
    #[serde(default)]
    pub set_med: Option<u32>,
}

/// A named, ordered route policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePolicy {
    #[serde(default)]
    pub description: Option<String>,
    pub terms: Vec<RoutePolicyTerm>,
}
