//! Traffic filtering policy: which address pairs and domains a database
//! wants to keep, and which direction of traffic counts as interesting.

use crate::config::types::FilterConfig;
use ipnet::IpNet;
use std::net::IpAddr;

#[derive(Debug, Clone)]
enum DomainRule {
    Exact(String),
    /// `*.example.com`: matches the domain and every subdomain.
    Suffix(String),
}

impl DomainRule {
    fn parse(rule: &str) -> DomainRule {
        match rule.strip_prefix("*.") {
            Some(suffix) => DomainRule::Suffix(suffix.to_ascii_lowercase()),
            None => DomainRule::Exact(rule.to_ascii_lowercase()),
        }
    }

    fn matches(&self, domain: &str) -> bool {
        match self {
            DomainRule::Exact(rule) => domain == rule,
            DomainRule::Suffix(suffix) => {
                domain == suffix
                    || domain
                        .strip_suffix(suffix)
                        .is_some_and(|head| head.ends_with('.'))
            }
        }
    }
}

/// Compiled filter policy consumed by the normalizers.
#[derive(Debug, Clone)]
pub struct FilterPolicy {
    internal: Vec<IpNet>,
    always_include: Vec<IpNet>,
    never_include: Vec<IpNet>,
    always_domains: Vec<DomainRule>,
    never_domains: Vec<DomainRule>,
    filter_external_to_internal: bool,
}

impl FilterPolicy {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            internal: config.internal_subnets.clone(),
            always_include: config.always_include_subnets.clone(),
            never_include: config.never_include_subnets.clone(),
            always_domains: config
                .always_include_domains
                .iter()
                .map(|r| DomainRule::parse(r))
                .collect(),
            never_domains: config
                .never_include_domains
                .iter()
                .map(|r| DomainRule::parse(r))
                .collect(),
            filter_external_to_internal: config.filter_external_to_internal,
        }
    }

    pub fn is_internal(&self, ip: IpAddr) -> bool {
        in_any(&self.internal, ip)
    }

    /// Explicit never-include rule: the pair must not reach any table.
    pub fn never_included(&self, src: IpAddr, dst: IpAddr) -> bool {
        in_any(&self.never_include, src) || in_any(&self.never_include, dst)
    }

    /// Direction policy for a src/dst pair. `true` marks the row filtered:
    /// kept in tmp for joining but excluded from final tables.
    pub fn filter_pair(&self, src: IpAddr, dst: IpAddr) -> bool {
        if self.never_included(src, dst) {
            return true;
        }
        if in_any(&self.always_include, src) || in_any(&self.always_include, dst) {
            return false;
        }

        let src_internal = self.is_internal(src);
        let dst_internal = self.is_internal(dst);
        match (src_internal, dst_internal) {
            // Only cross-boundary traffic is interesting
            (true, true) | (false, false) => true,
            (false, true) => self.filter_external_to_internal,
            (true, false) => false,
        }
    }

    /// Proxy case: the destination is a CONNECT proxy, so only the source
    /// side is held to the internal-match rule.
    pub fn filter_single(&self, src: IpAddr) -> bool {
        if in_any(&self.never_include, src) {
            return true;
        }
        if in_any(&self.always_include, src) {
            return false;
        }
        !self.is_internal(src)
    }

    /// Domain policy verdict, applied to DNS queries, HTTP hosts, and SNI.
    pub fn domain_verdict(&self, domain: &str) -> DomainVerdict {
        let domain = domain.to_ascii_lowercase();
        if self.never_domains.iter().any(|r| r.matches(&domain)) {
            return DomainVerdict::Drop;
        }
        if self.always_domains.iter().any(|r| r.matches(&domain)) {
            return DomainVerdict::Keep;
        }
        DomainVerdict::Neutral
    }
}

/// Outcome of matching a domain against the include/exclude rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainVerdict {
    /// A never-include rule matched: drop the record.
    Drop,
    /// An always-include rule matched: keep regardless of pair policy.
    Keep,
    /// No rule matched: the pair policy decides.
    Neutral,
}

fn in_any(nets: &[IpNet], ip: IpAddr) -> bool {
    nets.iter().any(|net| net_contains(net, ip))
}

/// Subnet membership across address families: IPv4-mapped-IPv6 addresses
/// are tested against IPv4 subnets and vice versa.
fn net_contains(net: &IpNet, ip: IpAddr) -> bool {
    match (net, ip) {
        (IpNet::V4(n), IpAddr::V4(v4)) => n.contains(&v4),
        (IpNet::V6(n), IpAddr::V6(v6)) => n.contains(&v6),
        (IpNet::V4(n), IpAddr::V6(v6)) => v6.to_ipv4_mapped().is_some_and(|v4| n.contains(&v4)),
        (IpNet::V6(n), IpAddr::V4(v4)) => n.contains(&v4.to_ipv6_mapped()),
    }
}
