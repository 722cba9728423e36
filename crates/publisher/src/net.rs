//! Local network identity
//!
//! Host name and non-loopback interface addresses of this node, plus the
//! loopback test used by reverse lookups.

use std::net::{AddrParseError, IpAddr};

use sysinfo::Networks;

/// Check whether `ip` is a loopback address
///
/// # Errors
/// Returns the parse error if `ip` is not a valid IPv4 or IPv6 address
pub fn is_loopback(ip: &str) -> Result<bool, AddrParseError> {
    let addr: IpAddr = ip.trim().parse()?;
    Ok(addr.is_loopback())
}

/// Non-loopback addresses of every local interface, sorted and de-duplicated
pub fn local_ip_addrs() -> Vec<String> {
    let networks = Networks::new_with_refreshed_list();
    let mut addrs: Vec<IpAddr> = networks
        .iter()
        .flat_map(|(_, data)| data.ip_networks().iter().map(|net| net.addr))
        .filter(|addr| !addr.is_loopback() && !addr.is_unspecified())
        .collect();

    addrs.sort();
    addrs.dedup();
    addrs.into_iter().map(|addr| addr.to_string()).collect()
}

/// Host name as reported by the operating system
///
/// # Errors
/// Returns the underlying I/O error if the name cannot be read
pub fn hostname() -> std::io::Result<String> {
    Ok(hostname::get()?.to_string_lossy().into_owned())
}
