use std::net::IpAddr;

use ipguard_common::IpGuardError;
use ipnet::IpNet;

/// Unwraps IPv4-mapped IPv6 addresses so that `::ffff:10.0.0.1` and `10.0.0.1` are the same client
pub fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

/// A validated allow/deny list target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpTarget {
    Single(IpAddr),
    Range(IpNet),
}

impl IpTarget {
    /// Accepts a bare address or CIDR notation. Host bits of a network are cleared,
    /// and a full-length prefix collapses to a single address.
    pub fn parse(value: &str) -> Result<Self, IpGuardError> {
        let value = value.trim();
        if value.contains('/') {
            let net: IpNet = value
                .parse()
                .map_err(|_| IpGuardError::InvalidAddress(value.to_owned()))?;
            let net = net.trunc();
            if net.prefix_len() == net.max_prefix_len() {
                return Ok(Self::Single(canonical_ip(net.addr())));
            }
            Ok(Self::Range(net))
        } else {
            let ip: IpAddr = value
                .parse()
                .map_err(|_| IpGuardError::InvalidAddress(value.to_owned()))?;
            Ok(Self::Single(canonical_ip(ip)))
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Self::Range(_))
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        match self {
            Self::Single(addr) => addr == ip,
            Self::Range(net) => net.contains(ip),
        }
    }
}

impl std::fmt::Display for IpTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(addr) => addr.fmt(f),
            Self::Range(net) => net.fmt(f),
        }
    }
}
