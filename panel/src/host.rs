//! AmpliPi host address handling

use core::net::Ipv4Addr;

/// How the configured host should be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostTarget<'a> {
    /// Literal dotted quad, no lookup needed
    Address(Ipv4Addr),
    /// `*.local` name, resolved over mDNS
    Mdns(&'a str),
    /// Anything else goes to the regular resolver
    Dns(&'a str),
}

impl<'a> HostTarget<'a> {
    pub fn classify(host: &'a str) -> Self {
        let host = host.trim();
        if let Some(addr) = validate_ipv4(host) {
            Self::Address(addr)
        } else if host.ends_with(".local") {
            Self::Mdns(host)
        } else {
            Self::Dns(host)
        }
    }

    /// Name shown on the boot screen while resolving
    pub fn label(&self) -> &'a str {
        match self {
            Self::Address(_) => "",
            Self::Mdns(name) => name.strip_suffix(".local").unwrap_or(name),
            Self::Dns(name) => name,
        }
    }
}

/// Strict dotted-quad parser: exactly four decimal octets in 0..=255.
pub fn validate_ipv4(host: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = host.split('.');
    for octet in octets.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}
