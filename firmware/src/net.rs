//! Network bring-up helpers and AmpliPi host lookup

use core::net::Ipv4Addr;

use amplipi_panel::host::HostTarget;
use embassy_net::Stack;
use embassy_net::dns::DnsQueryType;
use embassy_time::{Duration, Timer};
use log::{info, warn};

/// Delay between lookups while the host can't be found
const RESOLVE_RETRY: Duration = Duration::from_millis(250);

/// Wait for network stack to get an IP address
pub async fn wait_for_ip(stack: Stack<'_>) {
    info!("Waiting for link...");
    while !stack.is_link_up() {
        Timer::after(Duration::from_millis(500)).await;
    }
    info!("Link up!");

    info!("Waiting for IP...");
    loop {
        if let Some(config) = stack.config_v4() {
            info!("Got IP: {}", config.address);
            break;
        }
        Timer::after(Duration::from_millis(500)).await;
    }
}

/// Resolve the configured host, retrying until it answers
///
/// Dotted quads are used as-is. `.local` names go out over mDNS, anything
/// else to the DHCP-provided resolver; the socket picks the protocol from
/// the name.
pub async fn resolve_host(stack: Stack<'_>, target: HostTarget<'_>) -> Ipv4Addr {
    let name = match target {
        HostTarget::Address(addr) => return addr,
        HostTarget::Mdns(name) | HostTarget::Dns(name) => name,
    };

    info!("Resolving hostname: {}", name);
    let mut attempts = 0u32;
    loop {
        match lookup(stack, name).await {
            Some(addr) => {
                info!("{} is at {}", name, addr);
                return addr;
            }
            None => {
                attempts += 1;
                if attempts % 20 == 1 {
                    warn!("{} not found yet ({} attempts)", name, attempts);
                }
                Timer::after(RESOLVE_RETRY).await;
            }
        }
    }
}

async fn lookup(stack: Stack<'_>, name: &str) -> Option<Ipv4Addr> {
    let addrs = stack.dns_query(name, DnsQueryType::A).await.ok()?;

    // Convert smoltcp IpAddress to core::net::Ipv4Addr
    match addrs.first() {
        Some(embassy_net::IpAddress::Ipv4(v4)) => {
            let octets = v4.octets();
            Some(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]))
        }
        _ => None,
    }
}
