use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use crate::addr::RemoteAddr;
use crate::error::{Error, Result};
use crate::port;

/// Where the remote master keeps its kubeconfig.
pub const REMOTE_KUBECONFIG: &str = "~/.kube/config";

/// Paths and knobs shared by every command. Built once at start-up.
#[derive(Debug, Clone)]
pub struct Settings {
    /// The kubeconfig merged into and purged from.
    pub kubeconfig: PathBuf,
    pub cache_dir: PathBuf,
    pub cert_dir: PathBuf,
    pub history: PathBuf,
    pub remote_kubeconfig: String,
    pub ports: RangeInclusive<u16>,
    /// Jump host for the forwarding command.
    pub ssh_via: Option<String>,
}

pub fn kube_dir(home: &Path) -> PathBuf {
    home.join(".kube")
}

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(Error::NoHomeDir)
}

/// `~/.config/cube`
pub fn default_state_dir(home: &Path) -> PathBuf {
    home.join(".config").join("cube")
}

impl Settings {
    /// `~/.kube/config` plus state under `base_dir`.
    pub fn new(home: &Path, base_dir: &Path) -> Self {
        Self {
            kubeconfig: kube_dir(home).join("config"),
            cache_dir: base_dir.join("cache"),
            cert_dir: base_dir.join("cert"),
            history: base_dir.join("history"),
            remote_kubeconfig: REMOTE_KUBECONFIG.to_string(),
            ports: port::default_range(),
            ssh_via: None,
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.cache_dir, &self.cert_dir] {
            fs::create_dir_all(dir).map_err(|err| Error::io(dir, err))?;
        }
        Ok(())
    }

    /// Cached copy of the remote kubeconfig.
    pub fn cache_path(&self, remote: &RemoteAddr) -> PathBuf {
        self.cache_dir.join(format!("{}.yaml", remote.host))
    }

    pub fn ca_path(&self, remote: &RemoteAddr) -> PathBuf {
        self.cert_dir.join(format!("{}-ca.crt", remote.host))
    }

    pub fn client_cert_path(&self, remote: &RemoteAddr) -> PathBuf {
        self.cert_dir.join(format!("{}-client.crt", remote.host))
    }

    pub fn client_key_path(&self, remote: &RemoteAddr) -> PathBuf {
        self.cert_dir.join(format!("{}-client.key", remote.host))
    }
}
