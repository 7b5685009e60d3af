use std::ops::RangeInclusive;

use tracing::info;

use crate::addr::local_server;
use crate::clean::KubeConfig;
use crate::download::StagedCluster;
use crate::error::{Error, Result};
use crate::port::{next_available_port, PortProbe};

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub name_suffix: String,
    /// `None` picks the next free port of the range.
    pub local_port: Option<u32>,
    /// Merge even if a cluster with the same certificate authority exists.
    pub force: bool,
}

impl MergeOptions {
    pub fn validate(&self) -> Result<()> {
        if self.name_suffix.trim().is_empty() {
            return Err(Error::EmptyNameSuffix);
        }
        Ok(())
    }
}

/// Names a merged cluster ends up under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedNames {
    pub cluster: String,
    pub user: String,
    pub context: String,
}

impl MergedNames {
    /// `kubernetes-<suffix>` for cluster and user,
    /// `kubernetes-admin@<host>:<port>-<suffix>` for the context.
    pub fn new(remote_api_addr: &str, suffix: &str) -> Self {
        Self {
            cluster: format!("kubernetes-{suffix}"),
            user: format!("kubernetes-{suffix}"),
            context: format!("kubernetes-admin@{remote_api_addr}-{suffix}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    pub local_port: u16,
    pub names: MergedNames,
    pub remote_api_addr: String,
}

/// Where a merge may take its local port from.
pub struct PortSource<'a> {
    pub range: RangeInclusive<u16>,
    pub probe: &'a dyn PortProbe,
}

fn resolve_port(kc: &KubeConfig, requested: Option<u32>, ports: &PortSource<'_>) -> Result<u16> {
    let port = match requested {
        Some(port) => port,
        None => next_available_port(kc, &ports.range, ports.probe)
            .map(u32::from)
            .ok_or(Error::InvalidLocalPort { port: None })?,
    };

    match u16::try_from(port) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(Error::InvalidLocalPort { port: Some(port) }),
    }
}

fn check_absent(kc: &KubeConfig, names: &MergedNames) -> Result<()> {
    if kc.clusters.contains_key(&names.cluster) {
        return Err(Error::ClusterAlreadyExists(names.cluster.clone()));
    }

    if kc.users.contains_key(&names.user) {
        return Err(Error::UserAlreadyExists(names.user.clone()));
    }

    if kc.contexts.contains_key(&names.context) {
        return Err(Error::ContextAlreadyExists(names.context.clone()));
    }

    Ok(())
}

/// Rename `staged`, point it at a local port and add it to `kc`.
///
/// `kc` is only modified once every check has passed.
pub fn merge(
    kc: &mut KubeConfig,
    mut staged: StagedCluster,
    opts: &MergeOptions,
    ports: &PortSource<'_>,
) -> Result<Merged> {
    opts.validate()?;

    if let Some(existing) = kc.find_cluster_by_authority(&staged.cluster) {
        if !opts.force {
            return Err(Error::AlreadyMerged {
                cluster: existing.to_string(),
            });
        }
        info!(cluster = existing, "already merged, forcing");
    }

    let local_port = resolve_port(kc, opts.local_port, ports)?;

    let remote_api_addr = staged.remote_api_addr();
    let names = MergedNames::new(&remote_api_addr, opts.name_suffix.trim());

    staged.cluster.server = local_server(staged.scheme, local_port);
    staged.context.cluster = names.cluster.clone();
    staged.context.user = names.user.clone();

    check_absent(kc, &names)?;

    kc.clusters.insert(names.cluster.clone(), staged.cluster);
    kc.users.insert(names.user.clone(), staged.user);
    kc.contexts.insert(names.context.clone(), staged.context);

    info!(context = %names.context, local_port, "merged");
    Ok(Merged {
        local_port,
        names,
        remote_api_addr,
    })
}
