//! Composite key helpers.
//!
//! CONFIG_DB composite keys join their components with '|', e.g.
//! "Vlan100|Ethernet0" or "vtep1|map_10001_Vlan100".

/// Separator between composite key components.
pub const KEY_SEPARATOR: char = '|';

/// Joins key components with the CONFIG_DB separator.
pub fn join_key<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .into_iter()
        .map(|p| p.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("|")
}

/// Splits a key into its components.
pub fn split_key(key: &str) -> Vec<&str> {
    key.split(KEY_SEPARATOR).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_join_key() {
        assert_eq!(join_key(["Vlan100", "Ethernet0"]), "Vlan100|Ethernet0");
        assert_eq!(join_key(["default", "10.2.0.2", "ipv4_unicast"]), "default|10.2.0.2|ipv4_unicast");
    }

    #[test]
    fn test_split_key() {
        assert_eq!(split_key("Vlan100|Ethernet0"), vec!["Vlan100", "Ethernet0"]);
        assert_eq!(split_key("Ethernet0"), vec!["Ethernet0"]);
    }
}
