use tracing::info;

use crate::clean::{ContextSpec, KubeConfig};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct PurgeOptions {
    /// Substring of the context name.
    pub name: String,
    /// Delete every match instead of insisting on a single one.
    pub all: bool,
}

/// A context removed together with its cluster and user.
#[derive(Debug, Clone, PartialEq)]
pub struct Purged {
    pub context: String,
    pub spec: ContextSpec,
}

/// Delete the cluster, user and context of every context matching
/// `opts.name`. Nothing is deleted unless the whole selection is accepted.
pub fn purge(kc: &mut KubeConfig, opts: &PurgeOptions) -> Result<Vec<Purged>> {
    let selected = kc.find_contexts_by_name(&opts.name, None);

    if selected.is_empty() {
        return Err(Error::ClusterNotFound(opts.name.clone()));
    }

    if selected.len() > 1 && !opts.all {
        return Err(Error::MultipleClustersFound(selected.into_keys().collect()));
    }

    let mut purged = Vec::with_capacity(selected.len());
    for (name, ctx) in selected {
        // a reference that is already gone is fine
        kc.clusters.remove(&ctx.cluster);
        kc.users.remove(&ctx.user);
        kc.contexts.remove(&name);

        info!(context = %name, cluster = %ctx.cluster, user = %ctx.user, "purged");
        purged.push(Purged {
            context: name,
            spec: ctx,
        });
    }

    Ok(purged)
}
