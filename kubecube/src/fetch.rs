//! Copying files off the remote master.

use std::fs;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::addr::RemoteAddr;
use crate::error::{Error, Result};

/// Copies `remote_path` on `remote` to `local_path`.
pub trait RemoteFetch {
    fn fetch(&self, remote: &RemoteAddr, remote_path: &str, local_path: &Path) -> Result<()>;

    /// Like [`RemoteFetch::fetch`], but a non-empty `local_path` counts as
    /// already fetched. A truncated earlier download is trusted all the same.
    fn fetch_cached(&self, remote: &RemoteAddr, remote_path: &str, local_path: &Path) -> Result<()> {
        if has_content(local_path) {
            debug!(local = %local_path.display(), "using cached copy");
            return Ok(());
        }

        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
        }

        debug!(%remote, remote_path, local = %local_path.display(), "fetching");
        self.fetch(remote, remote_path, local_path)
    }
}

/// True if `path` exists and is non-empty.
pub fn has_content(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.len() > 0).unwrap_or(false)
}

/// Shells out to `scp`. There is no timeout: an unresponsive host blocks
/// until scp itself gives up.
#[derive(Debug, Clone, Default)]
pub struct ScpFetcher;

impl RemoteFetch for ScpFetcher {
    fn fetch(&self, remote: &RemoteAddr, remote_path: &str, local_path: &Path) -> Result<()> {
        let fail = |reason: String| Error::Fetch {
            remote: format!("{remote}:{remote_path}"),
            local: local_path.to_path_buf(),
            reason,
        };

        let output = Command::new("scp")
            .arg(format!("{remote}:{remote_path}"))
            .arg(local_path)
            .output()
            .map_err(|err| fail(err.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(format!("{}: {}", output.status, stderr.trim())));
        }

        Ok(())
    }
}
