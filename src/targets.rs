use crate::store::TargetStore;
use anyhow::{Context, Result};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::path::Path;

/// Expand an IPv4 CIDR into every address it covers.
///
/// Unlike host enumeration for port sweeps, the network and broadcast
/// addresses are kept: `10.0.0.0/30` yields `.0` through `.3`, since an HTTP
/// service can sit on any of them behind NAT or a /31 point-to-point link.
pub fn expand_cidr(net: Ipv4Net) -> Vec<Ipv4Addr> {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    (start..=end).map(Ipv4Addr::from).collect()
}

/// Insert one literal target into the store, expanding IPv4 CIDR notation.
///
/// A string containing `/` that fails to parse as an IPv4 range (including
/// IPv6 ranges, which are never expanded) degrades to a single verbatim
/// target rather than failing the run.
pub fn add_target(store: &mut TargetStore, raw: &str) {
    let t = raw.trim();
    if t.is_empty() {
        return;
    }
    if t.contains('/') && !t.contains("://") {
        if let Ok(net) = t.parse::<Ipv4Net>() {
            for ip in expand_cidr(net) {
                store.add(ip.to_string());
            }
            return;
        }
    }
    store.add(t);
}

/// Insert every target from a literal list.
pub fn add_target_list<I, S>(store: &mut TargetStore, targets: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for t in targets {
        add_target(store, t.as_ref());
    }
}

/// Insert targets from a newline-delimited file. Blank lines and surrounding
/// whitespace are ignored. An unreadable file is fatal to startup.
pub fn add_targets_from_file(store: &mut TargetStore, path: impl AsRef<Path>) -> Result<()> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read target file: {}", path.as_ref().display()))?;
    for line in content.lines() {
        add_target(store, line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_slash_30_is_four_addresses() {
        let net: Ipv4Net = "10.0.0.0/30".parse().unwrap();
        let ips = expand_cidr(net);
        assert_eq!(
            ips,
            vec![
                Ipv4Addr::new(10, 0, 0, 0),
                Ipv4Addr::new(10, 0, 0, 1),
                Ipv4Addr::new(10, 0, 0, 2),
                Ipv4Addr::new(10, 0, 0, 3),
            ]
        );
    }

    #[test]
    fn overlapping_ranges_dedupe_in_store() {
        let mut store = TargetStore::new();
        add_target(&mut store, "10.0.0.0/30");
        add_target(&mut store, "10.0.0.2/31");
        // .2 and .3 already present from the /30
        assert_eq!(store.count(), 4);
    }

    #[test]
    fn malformed_cidr_degrades_to_literal() {
        let mut store = TargetStore::new();
        add_target(&mut store, "10.0.0.0/99");
        assert_eq!(store.count(), 1);
        assert!(store.iter().any(|t| t == "10.0.0.0/99"));
    }

    #[test]
    fn url_with_path_is_not_treated_as_cidr() {
        let mut store = TargetStore::new();
        add_target(&mut store, "http://example.com/admin");
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn blank_and_padded_lines_are_ignored() {
        let mut store = TargetStore::new();
        for line in ["  example.com  ", "", "   ", "example.com"] {
            add_target(&mut store, line);
        }
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn ipv6_range_falls_back_to_literal() {
        let mut store = TargetStore::new();
        add_target(&mut store, "2001:db8::/126");
        assert_eq!(store.count(), 1);
    }
}
