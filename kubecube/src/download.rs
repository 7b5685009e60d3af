//! Fetching a remote kubeconfig and picking the cluster to merge.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::addr::{server_host, server_port, RemoteAddr, Scheme};
use crate::clean::{exactly_one, ClusterSpec, ContextSpec, KubeConfig, UserSpec};
use crate::error::{Error, Result};
use crate::fetch::RemoteFetch;
use crate::settings::Settings;

/// One cluster with its context and user, lifted out of a remote kubeconfig
/// and waiting to be merged.
#[derive(Debug, Clone)]
pub struct StagedCluster {
    pub remote: RemoteAddr,
    pub scheme: Scheme,
    /// Server address as the remote file had it.
    pub api_server: String,

    pub cluster_name: String,
    pub cluster: ClusterSpec,
    pub context_name: String,
    pub context: ContextSpec,
    pub user_name: String,
    pub user: UserSpec,
}

impl StagedCluster {
    /// `<remote host>:<api port>`, the far end of the ssh tunnel.
    pub fn remote_api_addr(&self) -> String {
        format!("{}:{}", self.remote.host, server_port(&self.api_server))
    }
}

pub struct Downloader<'a> {
    settings: &'a Settings,
    fetcher: &'a dyn RemoteFetch,
}

impl<'a> Downloader<'a> {
    pub fn new(settings: &'a Settings, fetcher: &'a dyn RemoteFetch) -> Self {
        Self { settings, fetcher }
    }

    /// Fetch the remote kubeconfig (and legacy cert files) and stage its
    /// cluster for merging.
    pub fn download(&self, remote: &RemoteAddr) -> Result<StagedCluster> {
        let cache = self.settings.cache_path(remote);
        self.fetcher
            .fetch_cached(remote, &self.settings.remote_kubeconfig, &cache)?;

        let kc = KubeConfig::load(&cache)?;
        let mut staged = stage(&kc, remote)?;
        self.materialize_certs(&mut staged)?;

        info!(cluster = %staged.cluster_name, server = %staged.api_server, "staged remote cluster");
        Ok(staged)
    }

    fn materialize_certs(&self, staged: &mut StagedCluster) -> Result<()> {
        if staged.user.has_token() {
            return Ok(());
        }

        if staged.cluster.ca_data().is_some() {
            if !staged.user.has_inline_cert() {
                return Err(Error::InvalidRemoteUser(format!(
                    "{} has no client-certificate-data/client-key-data",
                    staged.user_name
                )));
            }
            return Ok(());
        }

        let Some(ca) = staged.cluster.ca_path().cloned() else {
            return Err(Error::InvalidRemoteCert(staged.cluster_name.clone()));
        };
        let (Some(cert), Some(key)) = (
            staged.user.client_certificate_path().cloned(),
            staged.user.client_key_path().cloned(),
        ) else {
            return Err(Error::InvalidRemoteUser(format!(
                "{} has no client-certificate/client-key",
                staged.user_name
            )));
        };

        debug!(cluster = %staged.cluster_name, "downloading cert files");
        let remote = &staged.remote;
        staged.cluster.certificate_authority =
            Some(self.fetch_file(remote, ca, self.settings.ca_path(remote))?);
        staged.user.client_certificate =
            Some(self.fetch_file(remote, cert, self.settings.client_cert_path(remote))?);
        staged.user.client_key =
            Some(self.fetch_file(remote, key, self.settings.client_key_path(remote))?);

        Ok(())
    }

    fn fetch_file(&self, remote: &RemoteAddr, remote_path: PathBuf, local: PathBuf) -> Result<PathBuf> {
        self.fetcher
            .fetch_cached(remote, &remote_path.to_string_lossy(), &local)?;
        Ok(local)
    }
}

/// Pick the cluster of `kc` that belongs to `remote`.
///
/// A lone cluster is taken as is. Otherwise the server host must equal the
/// remote host, and plain http beats https when both are offered.
pub fn select_cluster<'k>(kc: &'k KubeConfig, remote: &RemoteAddr) -> Result<(&'k String, &'k ClusterSpec)> {
    if kc.clusters.is_empty() {
        return Err(Error::InvalidRemoteConfig("no clusters".to_string()));
    }

    if kc.clusters.len() == 1 {
        return exactly_one(&kc.clusters, "cluster");
    }

    let mut plain = None;
    let mut tls = None;
    for (name, cluster) in &kc.clusters {
        if server_host(&cluster.server).as_deref() != Some(remote.host.as_str()) {
            continue;
        }

        match Scheme::of(&cluster.server) {
            Some(Scheme::Http) if plain.is_none() => plain = Some((name, cluster)),
            Some(Scheme::Https) if tls.is_none() => tls = Some((name, cluster)),
            _ => {}
        }
    }

    plain.or(tls).ok_or_else(|| {
        Error::InvalidRemoteConfig(format!(
            "{} clusters, none served from {}",
            kc.clusters.len(),
            remote.host
        ))
    })
}

/// Copy the chosen cluster, its context and its user out of `kc`.
pub fn stage(kc: &KubeConfig, remote: &RemoteAddr) -> Result<StagedCluster> {
    let (cluster_name, cluster) = select_cluster(kc, remote)?;

    let scheme = Scheme::of(&cluster.server).ok_or_else(|| {
        Error::InvalidRemoteConfig(format!("unsupported server address {}", cluster.server))
    })?;

    let mut contexts = kc.contexts_for_cluster(cluster_name);
    let (context_name, context) = contexts.next().ok_or_else(|| {
        Error::Invariant(format!("no context references cluster {cluster_name}"))
    })?;
    if contexts.next().is_some() {
        warn!(cluster = %cluster_name, context = %context_name, "several contexts for cluster, using the first");
    }

    let user = kc.users.get(&context.user).ok_or_else(|| {
        Error::Invariant(format!(
            "context {context_name} references unknown user {}",
            context.user
        ))
    })?;

    Ok(StagedCluster {
        remote: remote.clone(),
        scheme,
        api_server: cluster.server.clone(),
        cluster_name: cluster_name.clone(),
        cluster: cluster.clone(),
        context_name: context_name.clone(),
        context: context.clone(),
        user_name: context.user.clone(),
        user: user.clone(),
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn parse(text: &str) -> KubeConfig {
        KubeConfig::parse(text, Path::new("remote")).unwrap()
    }

    const TWO_SCHEMES: &str = r#"
clusters:
- name: secure
  cluster:
    server: https://10.0.0.5:6443
    certificate-authority-data: Y2E=
- name: plain
  cluster:
    server: http://10.0.0.5:8080
- name: elsewhere
  cluster:
    server: http://10.0.0.50:8080
contexts:
- name: admin@secure
  context: {cluster: secure, user: admin}
- name: admin@plain
  context: {cluster: plain, user: admin}
- name: admin@elsewhere
  context: {cluster: elsewhere, user: admin}
users:
- name: admin
  user: {token: t0k3n}
"#;

    #[test]
    fn no_clusters_is_invalid() {
        let kc = parse("kind: Config\n");
        let err = select_cluster(&kc, &RemoteAddr::parse("10.0.0.5")).unwrap_err();
        assert!(matches!(err, Error::InvalidRemoteConfig(_)));
    }

    #[test]
    fn single_cluster_ignores_host() {
        let kc = parse(
            "clusters:\n- name: only\n  cluster: {server: 'https://127.0.0.1:6443'}\n",
        );
        let (name, _) = select_cluster(&kc, &RemoteAddr::parse("core@10.0.0.5")).unwrap();
        assert_eq!(name, "only");
    }

    #[test]
    fn prefers_plain_http_on_matching_host() {
        let kc = parse(TWO_SCHEMES);
        let (name, _) = select_cluster(&kc, &RemoteAddr::parse("core@10.0.0.5")).unwrap();
        assert_eq!(name, "plain");
    }

    #[test]
    fn falls_back_to_tls() {
        let mut kc = parse(TWO_SCHEMES);
        kc.clusters.remove("plain");
        let (name, _) = select_cluster(&kc, &RemoteAddr::parse("core@10.0.0.5")).unwrap();
        assert_eq!(name, "secure");
    }

    #[test]
    fn host_must_match_exactly() {
        let kc = parse(TWO_SCHEMES);
        let (name, _) = select_cluster(&kc, &RemoteAddr::parse("10.0.0.50")).unwrap();
        assert_eq!(name, "elsewhere");

        let err = select_cluster(&kc, &RemoteAddr::parse("10.0.0.9")).unwrap_err();
        assert!(matches!(err, Error::InvalidRemoteConfig(_)));
    }

    #[test]
    fn matches_ipv6_servers() {
        let kc = parse(
            "clusters:\n- name: v4\n  cluster: {server: 'https://10.0.0.5:6443'}\n- name: v6\n  cluster: {server: 'https://[fd00::1]:6443'}\n",
        );
        let (name, _) = select_cluster(&kc, &RemoteAddr::parse("core@fd00::1")).unwrap();
        assert_eq!(name, "v6");
    }

    #[test]
    fn stage_collects_triple() {
        let kc = parse(TWO_SCHEMES);
        let staged = stage(&kc, &RemoteAddr::parse("core@10.0.0.5")).unwrap();

        assert_eq!(staged.cluster_name, "plain");
        assert_eq!(staged.context_name, "admin@plain");
        assert_eq!(staged.user_name, "admin");
        assert_eq!(staged.scheme, Scheme::Http);
        assert_eq!(staged.remote_api_addr(), "10.0.0.5:8080");
    }

    #[test]
    fn cluster_without_context_is_an_invariant_violation() {
        let kc = parse("clusters:\n- name: lonely\n  cluster: {server: 'https://10.0.0.5:6443'}\n");
        let err = stage(&kc, &RemoteAddr::parse("10.0.0.5")).unwrap_err();
        assert!(err.is_invariant(), "{err}");
    }

    #[test]
    fn context_with_unknown_user_is_an_invariant_violation() {
        let kc = parse(
            "clusters:\n- name: c\n  cluster: {server: 'https://10.0.0.5:6443'}\ncontexts:\n- name: x\n  context: {cluster: c, user: ghost}\n",
        );
        assert!(stage(&kc, &RemoteAddr::parse("10.0.0.5")).unwrap_err().is_invariant());
    }

    #[test]
    fn remote_api_addr_defaults_port_by_scheme() {
        let kc = parse(
            "clusters:\n- name: c\n  cluster: {server: 'https://master.local'}\ncontexts:\n- name: x\n  context: {cluster: c, user: u}\nusers:\n- name: u\n  user: {token: t}\n",
        );
        let staged = stage(&kc, &RemoteAddr::parse("core@172.31.7.182")).unwrap();
        assert_eq!(staged.remote_api_addr(), "172.31.7.182:443");
    }
}
