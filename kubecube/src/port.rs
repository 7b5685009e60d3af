//! Local forwarding port bookkeeping.

use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;

use tracing::debug;

use crate::addr::explicit_port;
use crate::clean::KubeConfig;

pub const MIN_LOCAL_PORT: u16 = 7001;
pub const MAX_LOCAL_PORT: u16 = 7100;

pub fn default_range() -> RangeInclusive<u16> {
    MIN_LOCAL_PORT..=MAX_LOCAL_PORT
}

/// Whether a local TCP port can be taken right now.
pub trait PortProbe {
    fn is_available(&self, port: u16) -> bool;
}

/// Binds a listener on all interfaces and drops it straight away.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

impl PortProbe for TcpProbe {
    fn is_available(&self, port: u16) -> bool {
        TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
    }
}

impl<F: Fn(u16) -> bool> PortProbe for F {
    fn is_available(&self, port: u16) -> bool {
        self(port)
    }
}

/// Ports written into the servers of `kc`, in cluster name order.
pub fn occupied_ports(kc: &KubeConfig) -> Vec<u16> {
    kc.clusters
        .values()
        .filter_map(|cluster| explicit_port(&cluster.server))
        .collect()
}

/// Next port above every port already handed out in `range`.
///
/// Gaps below the highest used port are never refilled: a port under it may
/// belong to an entry someone edited by hand.
pub fn next_available_port(
    kc: &KubeConfig,
    range: &RangeInclusive<u16>,
    probe: &dyn PortProbe,
) -> Option<u16> {
    let highest = occupied_ports(kc)
        .into_iter()
        .filter(|port| range.contains(port))
        .max();

    let start = match highest {
        Some(port) => port.checked_add(1)?,
        None => *range.start(),
    };

    let found = (start..=*range.end()).find(|&port| probe.is_available(port));
    debug!(?highest, ?found, "scanned local ports");
    found
}
