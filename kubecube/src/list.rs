//! Recovering merged clusters and their tunnels from the kubeconfig.

use std::fmt;
use std::net::IpAddr;

use serde::Serialize;
use tracing::debug;

use crate::addr::{explicit_port, server_host, LOCAL_PROXY_HOST};
use crate::clean::KubeConfig;
use crate::ssh::port_forwarding_cmd;

/// Port assumed for the remote API server when the context name omits it.
pub const DEFAULT_REMOTE_API_PORT: u16 = 6443;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterInfo {
    pub name: String,
    #[serde(rename = "sshForward")]
    pub ssh_forward: String,
}

impl fmt::Display for ClusterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.name, self.ssh_forward)
    }
}

/// Context name without the user part: everything after the first `@`.
pub fn short_context(ctx: &str) -> &str {
    ctx.split_once('@').map_or(ctx, |(_, rest)| rest)
}

/// `<ip>:<port>` encoded at the front of a merged context's short name,
/// e.g. `172.31.7.182:6443` from `kubernetes-admin@172.31.7.182:6443-test`.
pub fn remote_api_addr_from_context(ctx: &str) -> Option<String> {
    let short = short_context(ctx);
    let head = short.split_once('-').map_or(short, |(head, _)| head);

    let (host, port) = match head.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().ok()?),
        None => (head, DEFAULT_REMOTE_API_PORT),
    };

    host.parse::<IpAddr>().ok()?;
    Some(format!("{host}:{port}"))
}

/// Forwarding info for `ctx`, if it follows the merge conventions: its
/// cluster serves from `kubernetes:<port>` and its name carries the remote
/// address.
pub fn parse_context(kc: &KubeConfig, ctx: &str, via: Option<&str>) -> Option<ClusterInfo> {
    let spec = kc.contexts.get(ctx)?;
    let cluster = kc.clusters.get(&spec.cluster)?;

    if server_host(&cluster.server).as_deref() != Some(LOCAL_PROXY_HOST) {
        return None;
    }
    let local_port = explicit_port(&cluster.server)?;
    let remote = remote_api_addr_from_context(ctx)?;

    Some(ClusterInfo {
        name: short_context(ctx).to_string(),
        ssh_forward: port_forwarding_cmd(local_port, &remote, via),
    })
}

/// Every merged cluster, sorted by name. Contexts that do not follow the
/// conventions are skipped silently.
pub fn list_clusters(kc: &KubeConfig, via: Option<&str>) -> Vec<ClusterInfo> {
    let mut infos: Vec<ClusterInfo> = kc
        .contexts
        .keys()
        .filter_map(|ctx| {
            let info = parse_context(kc, ctx, via);
            if info.is_none() {
                debug!(context = %ctx, "not a merged cluster, skipping");
            }
            info
        })
        .collect();

    infos.sort_by(|a, b| a.name.cmp(&b.name));
    infos
}
