//! Site and region definitions.

use crate::filter::PrefixList;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A region: a group of sites sharing an overlay AS number and
/// region-scoped prefix lists and aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    #[serde(default)]
    pub asn: Option<u32>,
    #[serde(default)]
    pub prefix_lists: BTreeMap<String, PrefixList>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

/// A site: its region membership and the devices acting as route
/// reflectors for the site's overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    #[serde(default)]
    pub region: Option<String>,
    /// Device names; their loopbacks become every other device's
    /// overlay BGP neighbors.
    #[serde(default)]
    pub route_reflectors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_site_json() {
        let site: Site = serde_json::from_str(
            r#"{"region": "east", "route_reflectors": ["spine1", "spine2"]}"#,
        )
        .unwrap();
        assert_eq!(site.region.as_deref(), Some("east"));
        assert_eq!(site.route_reflectors, vec!["spine1", "spine2"]);
    }

    #[test]
    fn test_region_json() {
        let region: Region = serde_json::from_str(r#"{"asn": 64512}"#).unwrap();
        assert_eq!(region.asn, Some(64512));
        assert!(region.prefix_lists.is_empty());
    }
}
