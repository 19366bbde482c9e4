// Copyright 2025 Cowboy AI, LLC.

//! CIDR range membership

use std::net::IpAddr;

/// Parse `addr/len` into the network address and prefix length
///
/// Returns `None` for anything that is not a well-formed range, including a
/// prefix longer than the address family allows.
pub fn parse_cidr(cidr: &str) -> Option<(IpAddr, u8)> {
    let (addr, len) = cidr.trim().split_once('/')?;
    let addr: IpAddr = addr.parse().ok()?;
    let len: u8 = len.parse().ok()?;
    let max = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    (len <= max).then_some((addr, len))
}

/// Whether `ip` lies inside `cidr`
///
/// An unparsable address or range never matches, and neither does an
/// address of the other family.
pub fn ip_matches_cidr(ip: &str, cidr: &str) -> bool {
    let Ok(ip) = ip.trim().parse::<IpAddr>() else {
        return false;
    };
    let Some((network, len)) = parse_cidr(cidr) else {
        return false;
    };
    match (ip, network) {
        (IpAddr::V4(ip), IpAddr::V4(net)) => {
            let mask = u32::MAX.checked_shl(32 - u32::from(len)).unwrap_or(0);
            u32::from(ip) & mask == u32::from(net) & mask
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) => {
            let mask = u128::MAX.checked_shl(128 - u32::from(len)).unwrap_or(0);
            u128::from(ip) & mask == u128::from(net) & mask
        }
        _ => false,
    }
}
