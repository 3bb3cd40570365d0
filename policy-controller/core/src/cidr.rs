//! Network range checks: membership of pod-declared addresses in allowed
//! ranges, and the egress/ingress consistency of the policy itself.

use crate::{policy::NetworkPolicy, PolicySnapshot};
use ipnet::IpNet;
use std::{fmt, net::IpAddr};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("not a valid CIDR: {0:?}")]
pub struct CidrParseError(String);

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("not a valid IP address: {0:?}")]
pub struct AddrParseError(String);

/// A reason the policy's egress and ingress ranges are inconsistent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inconsistency {
    Unparseable(CidrParseError),
    Overlap { egress: String, ingress: String },
}

/// Parses a network in `address/prefix` form. Host bits are ignored, so the
/// network's base address is always its first address.
pub fn parse_net(s: &str) -> Result<IpNet, CidrParseError> {
    s.trim()
        .parse::<IpNet>()
        .map(|net| net.trunc())
        .map_err(|_| CidrParseError(s.to_string()))
}

pub fn parse_addr(s: &str) -> Result<IpAddr, AddrParseError> {
    s.trim()
        .parse::<IpAddr>()
        .map_err(|_| AddrParseError(s.to_string()))
}

/// Tests whether `addr` falls within any of `cidrs`.
///
/// Every entry must parse; a malformed entry is an error even when another
/// entry would have matched.
pub fn contains_addr(cidrs: &[String], addr: IpAddr) -> Result<bool, CidrParseError> {
    let nets = cidrs
        .iter()
        .map(|c| parse_net(c))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(nets.iter().any(|net| net.contains(&addr)))
}

/// Returns true iff the policy's egress and ingress ranges are consistent.
pub fn check_consistency(policy: &PolicySnapshot) -> bool {
    find_inconsistencies(&policy.network).is_empty()
}

/// Scans every (egress, ingress) pair for overlap.
///
/// Two networks overlap when either contains the other's base address. A pair
/// named by an allowed-overlap entry is exempt. The scan is pairwise, which
/// is adequate for policies of tens of ranges.
pub fn find_inconsistencies(network: &NetworkPolicy) -> Vec<Inconsistency> {
    let mut problems = Vec::new();

    let egress = parse_all(&network.egress_cidrs, &mut problems);
    let ingress = parse_all(&network.ingress_cidrs, &mut problems);
    if !problems.is_empty() {
        return problems;
    }

    for (e_raw, e_net) in &egress {
        for (i_raw, i_net) in &ingress {
            if network
                .allowed_overlaps
                .iter()
                .any(|o| o.covers(e_raw, i_raw))
            {
                continue;
            }
            if overlaps(e_net, i_net) {
                problems.push(Inconsistency::Overlap {
                    egress: e_raw.to_string(),
                    ingress: i_raw.to_string(),
                });
            }
        }
    }

    problems
}

pub fn overlaps(a: &IpNet, b: &IpNet) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

fn parse_all<'c>(
    cidrs: &'c [String],
    problems: &mut Vec<Inconsistency>,
) -> Vec<(&'c str, IpNet)> {
    let mut nets = Vec::with_capacity(cidrs.len());
    for cidr in cidrs {
        match parse_net(cidr) {
            Ok(net) => nets.push((cidr.trim(), net)),
            Err(error) => problems.push(Inconsistency::Unparseable(error)),
        }
    }
    nets
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unparseable(error) => error.fmt(f),
            Self::Overlap { egress, ingress } => {
                write!(f, "egress {egress} overlaps ingress {ingress}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AllowedOverlap;

    fn network(egress: &[&str], ingress: &[&str]) -> NetworkPolicy {
        NetworkPolicy {
            egress_cidrs: egress.iter().map(ToString::to_string).collect(),
            ingress_cidrs: ingress.iter().map(ToString::to_string).collect(),
            ..Default::default()
        }
    }

    fn snapshot(network: NetworkPolicy) -> PolicySnapshot {
        PolicySnapshot {
            network,
            ..Default::default()
        }
    }

    #[test]
    fn nested_ranges_are_inconsistent() {
        let net = network(&["10.0.0.0/8"], &["10.1.0.0/16"]);
        assert_eq!(
            find_inconsistencies(&net),
            vec![Inconsistency::Overlap {
                egress: "10.0.0.0/8".to_string(),
                ingress: "10.1.0.0/16".to_string(),
            }]
        );
        assert!(!check_consistency(&snapshot(net)));
    }

    #[test]
    fn whitelisted_pair_is_consistent() {
        let mut net = network(&["10.0.0.0/8"], &["10.1.0.0/16"]);
        net.allowed_overlaps.push(AllowedOverlap {
            egress: "10.0.0.0/8".to_string(),
            ingress: "10.1.0.0/16".to_string(),
        });
        assert!(check_consistency(&snapshot(net)));
    }

    #[test]
    fn whitelist_applies_in_either_orientation() {
        let mut net = network(&["10.1.0.0/16"], &["10.0.0.0/8"]);
        net.allowed_overlaps.push(AllowedOverlap {
            egress: "10.0.0.0/8".to_string(),
            ingress: "10.1.0.0/16".to_string(),
        });
        assert!(check_consistency(&snapshot(net)));
    }

    #[test]
    fn consistency_is_symmetric() {
        let cases: &[(&[&str], &[&str])] = &[
            (&["10.0.0.0/8"], &["10.1.0.0/16"]),
            (&["10.0.0.0/8"], &["192.168.0.0/16"]),
            (&["10.0.0.0/16", "172.16.0.0/12"], &["172.20.1.0/24"]),
            (&["10.0.0.0/24"], &["10.0.0.128/25"]),
            (&["10.0.0.0/24"], &["10.0.1.0/24"]),
            (&["fd00::/8"], &["10.0.0.0/8"]),
            (&["fd00::/8"], &["fd00:1::/32"]),
        ];
        for (egress, ingress) in cases {
            let forward = check_consistency(&snapshot(network(egress, ingress)));
            let reverse = check_consistency(&snapshot(network(ingress, egress)));
            assert_eq!(forward, reverse, "{egress:?} / {ingress:?}");
        }
    }

    #[test]
    fn disjoint_ranges_are_consistent() {
        let net = network(&["10.0.0.0/24", "10.0.2.0/24"], &["10.0.1.0/24"]);
        assert!(check_consistency(&snapshot(net)));
        assert!(check_consistency(&PolicySnapshot::default()));
    }

    #[test]
    fn unparseable_ranges_fail() {
        let net = network(&["10.0.0.0/8"], &["10.1.0.0/33"]);
        assert!(!check_consistency(&snapshot(net)));

        let net = network(&["not-a-cidr"], &[]);
        assert_eq!(
            find_inconsistencies(&net),
            vec![Inconsistency::Unparseable(CidrParseError(
                "not-a-cidr".to_string()
            ))]
        );

        // Bare addresses are not networks.
        let net = network(&["10.0.0.1"], &["192.168.0.0/16"]);
        assert!(!check_consistency(&snapshot(net)));
    }

    #[test]
    fn host_bits_are_ignored() {
        let net = parse_net(" 10.1.2.3/16 ").expect("cidr must parse");
        assert_eq!(net.to_string(), "10.1.0.0/16");
    }

    #[test]
    fn address_membership() {
        let cidrs = vec!["10.0.0.0/8".to_string(), "192.168.1.0/24".to_string()];
        let addr = |s: &str| parse_addr(s).expect("address must parse");
        assert_eq!(contains_addr(&cidrs, addr("10.2.3.4")), Ok(true));
        assert_eq!(contains_addr(&cidrs, addr(" 192.168.1.7 ")), Ok(true));
        assert_eq!(contains_addr(&cidrs, addr("192.168.2.7")), Ok(false));
        assert_eq!(contains_addr(&[], addr("10.2.3.4")), Ok(false));

        let bad = vec!["10.0.0.0/8".to_string(), "bogus".to_string()];
        assert!(contains_addr(&bad, addr("10.2.3.4")).is_err());
        assert!(parse_addr("10.0.0.256").is_err());
    }
}
