use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cube: empty name-suffix for merge")]
    EmptyNameSuffix,
    #[error("cube: empty remote ip")]
    EmptyRemoteIp,

    #[error("cube: kubeconfig already merged, cluster: [{cluster}]")]
    AlreadyMerged { cluster: String },
    #[error("cube: cluster already exists, name: {0}")]
    ClusterAlreadyExists(String),
    #[error("cube: user already exists, name: {0}")]
    UserAlreadyExists(String),
    #[error("cube: context already exists, name: {0}")]
    ContextAlreadyExists(String),
    #[error("cube: cluster not found for purging, pattern: {0:?}")]
    ClusterNotFound(String),
    #[error("cube: multiple clusters found for purging, list: {0:?}")]
    MultipleClustersFound(Vec<String>),

    #[error(
        "cube: invalid local port for merge, port: {}",
        .port.map_or_else(|| "none available".to_string(), |p| p.to_string())
    )]
    InvalidLocalPort { port: Option<u32> },

    #[error("cube: remote kubeconfig is invalid: {0}")]
    InvalidRemoteConfig(String),
    #[error("cube: user in remote kubeconfig is invalid: {0}")]
    InvalidRemoteUser(String),
    #[error("cube: cert in remote kubeconfig is invalid, cluster: {0}")]
    InvalidRemoteCert(String),

    /// A freshly parsed document contradicts itself, e.g. no context points
    /// at the selected cluster. Never retried.
    #[error("cube: internal consistency violation: {0}")]
    Invariant(String),

    #[error("cube: failed to fetch {remote} into {}: {reason}", .local.display())]
    Fetch {
        remote: String,
        local: PathBuf,
        reason: String,
    },

    #[error("cube: unable to resolve home directory")]
    NoHomeDir,
    #[error("cube: config path [{}] is a dir, not file", .0.display())]
    NotAFile(PathBuf),
    #[error("cube: io error on {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cube: failed to parse kubeconfig {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("cube: failed to serialize kubeconfig")]
    Serialize(#[from] serde_yaml::Error),
    #[error("cube: malformed history line {line:?}")]
    History { line: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// True for internal-consistency failures as opposed to ordinary
    /// recoverable errors.
    pub fn is_invariant(&self) -> bool {
        matches!(self, Error::Invariant(_))
    }
}
