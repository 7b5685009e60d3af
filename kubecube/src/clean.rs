use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter, Write as _};
use std::path::Path;

use tracing::{debug, info};

use crate::direct;
pub use crate::direct::{Cluster, ClusterSpec, Context, ContextSpec, Kind, User, UserSpec};
use crate::error::{Error, Result};

/// A kubeconfig keyed by name. Every context's `cluster` and `user` resolve
/// in `clusters` and `users` once the document is persisted.
#[derive(Debug, Clone, Default)]
pub struct KubeConfig {
    pub contexts: BTreeMap<String, ContextSpec>,
    pub current_context: Option<String>,
    pub clusters: BTreeMap<String, ClusterSpec>,
    pub preferences: serde_yaml::Value,
    pub users: BTreeMap<String, UserSpec>,
    /// Top-level keys with no field of their own, written back untouched.
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl From<direct::KubeConfig> for KubeConfig {
    fn from(kc: direct::KubeConfig) -> Self {
        Self {
            current_context: kc.current_context,
            preferences: kc.preferences,
            extra: kc.extra,
            contexts: kc
                .contexts
                .into_iter()
                .map(|ctx| (ctx.name, ctx.context))
                .collect(),
            clusters: kc
                .clusters
                .into_iter()
                .map(|cls| (cls.name, cls.cluster))
                .collect(),
            users: kc
                .users
                .into_iter()
                .map(|usr| (usr.name, usr.user))
                .collect(),
        }
    }
}

impl From<KubeConfig> for direct::KubeConfig {
    fn from(kc: KubeConfig) -> Self {
        let preferences = match kc.preferences {
            serde_yaml::Value::Null => serde_yaml::Value::Mapping(Default::default()),
            other => other,
        };

        direct::KubeConfig {
            kind: Kind::Config,
            api_version: direct::ApiVersion::V1,
            preferences,
            current_context: kc.current_context,
            extra: kc.extra,

            clusters: kc
                .clusters
                .into_iter()
                .map(|(name, cluster)| Cluster { name, cluster })
                .collect(),
            contexts: kc
                .contexts
                .into_iter()
                .map(|(name, context)| Context { name, context })
                .collect(),
            users: kc
                .users
                .into_iter()
                .map(|(name, user)| User { name, user })
                .collect(),
        }
    }
}

/// The sole entry of `map`, failing loudly if there is not exactly one.
pub fn exactly_one<'a, V>(map: &'a BTreeMap<String, V>, what: &str) -> Result<(&'a String, &'a V)> {
    let mut entries = map.iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(Error::Invariant(format!(
            "expected exactly one {what}, found {}",
            map.len()
        ))),
    }
}

impl KubeConfig {
    pub fn parse(text: &str, path: &Path) -> Result<KubeConfig> {
        if text.trim().is_empty() {
            return Ok(KubeConfig::default());
        }

        let kc: direct::KubeConfig = serde_yaml::from_str(text).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(kc.into())
    }

    /// Read the document at `path`. A missing file yields an empty document.
    pub fn load(path: impl AsRef<Path>) -> Result<KubeConfig> {
        let path = path.as_ref();
        if path.is_dir() {
            return Err(Error::NotAFile(path.to_path_buf()));
        }

        match fs::read_to_string(path) {
            Ok(text) => KubeConfig::parse(&text, path),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "kubeconfig missing, starting empty");
                Ok(KubeConfig::default())
            }
            Err(err) => Err(Error::io(path, err)),
        }
    }

    pub fn serialize(&self) -> Result<String> {
        let kc: direct::KubeConfig = self.clone().into();
        Ok(serde_yaml::to_string(&kc)?)
    }

    /// Overwrite `path` with the whole document.
    ///
    /// There is no temp-file rename: a crash mid-write can leave a truncated
    /// file behind, and nothing locks out a concurrent writer.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = self.serialize()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
        }

        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|err| Error::io(path, err))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(content.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|err| Error::io(path, err))?;

        info!(path = %path.display(), "kubeconfig written");
        Ok(())
    }

    /// Contexts whose name contains `pattern` (plain substring), minus the
    /// ones `keep` rejects.
    pub fn find_contexts_by_name(
        &self,
        pattern: &str,
        keep: Option<&dyn Fn(&str) -> bool>,
    ) -> BTreeMap<String, ContextSpec> {
        self.contexts
            .iter()
            .filter(|(name, _)| name.contains(pattern))
            .filter(|(name, _)| keep.map_or(true, |keep| keep(name)))
            .map(|(name, ctx)| (name.clone(), ctx.clone()))
            .collect()
    }

    /// Name of the first cluster sharing `candidate`'s certificate authority.
    pub fn find_cluster_by_authority(&self, candidate: &ClusterSpec) -> Option<&str> {
        self.clusters
            .iter()
            .find(|(_, cluster)| cluster.same_authority(candidate))
            .map(|(name, _)| name.as_str())
    }

    /// Contexts that point at `cluster`, in name order.
    pub fn contexts_for_cluster<'a>(
        &'a self,
        cluster: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a ContextSpec)> + 'a {
        self.contexts
            .iter()
            .filter(move |(_, ctx)| ctx.cluster == cluster)
    }

    /// Names referenced by contexts but missing from `clusters`/`users`.
    pub fn dangling_refs(&self) -> Vec<String> {
        let mut missing = Vec::new();
        for (name, ctx) in &self.contexts {
            if !self.clusters.contains_key(&ctx.cluster) {
                missing.push(format!("{name} -> cluster {}", ctx.cluster));
            }
            if !self.users.contains_key(&ctx.user) {
                missing.push(format!("{name} -> user {}", ctx.user));
            }
        }
        missing
    }
}
