use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use kubecube::list::list_clusters;
use kubecube::settings::REMOTE_KUBECONFIG;
use kubecube::ssh::port_forwarding_cmd;
use kubecube::{
    merge, purge, Downloader, Error, KubeConfig, MergeOptions, PortSource, PurgeOptions,
    RemoteAddr, RemoteFetch, Settings,
};
use tempfile::TempDir;

/// Serves files from a directory standing in for the remote master.
struct DirFetcher {
    root: PathBuf,
    fetched: RefCell<Vec<String>>,
}

impl DirFetcher {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            fetched: RefCell::new(Vec::new()),
        }
    }

    fn put(&self, remote_path: &str, content: &str) {
        let path = self.resolve(remote_path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn resolve(&self, remote_path: &str) -> PathBuf {
        let relative = remote_path.trim_start_matches("~/").trim_start_matches('/');
        self.root.join(relative)
    }
}

impl RemoteFetch for DirFetcher {
    fn fetch(&self, remote: &RemoteAddr, remote_path: &str, local_path: &Path) -> kubecube::Result<()> {
        self.fetched.borrow_mut().push(remote_path.to_string());
        fs::copy(self.resolve(remote_path), local_path).map_err(|err| Error::Fetch {
            remote: format!("{remote}:{remote_path}"),
            local: local_path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Ok(())
    }
}

struct Workspace {
    _dir: TempDir,
    settings: Settings,
    fetcher: DirFetcher,
}

fn workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let home = dir.path().join("home");
    let settings = Settings::new(&home, &home.join(".config").join("cube"));
    let fetcher = DirFetcher::new(&dir.path().join("remote"));
    Workspace {
        _dir: dir,
        settings,
        fetcher,
    }
}

const INLINE_REMOTE: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: kubernetes
  cluster:
    server: https://10.0.0.5:6443
    certificate-authority-data: Y2EtZGF0YQ==
contexts:
- name: kubernetes-admin@kubernetes
  context:
    cluster: kubernetes
    user: kubernetes-admin
current-context: kubernetes-admin@kubernetes
users:
- name: kubernetes-admin
  user:
    client-certificate-data: Y2VydA==
    client-key-data: a2V5
"#;

const LEGACY_REMOTE: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: local
  cluster:
    server: https://172.31.7.182:443
    certificate-authority: /etc/kubernetes/ssl/ca.pem
contexts:
- name: admin
  context:
    cluster: local
    user: admin
users:
- name: admin
  user:
    client-certificate: /etc/kubernetes/ssl/admin.pem
    client-key: /etc/kubernetes/ssl/admin-key.pem
"#;

const NO_CERT_REMOTE: &str = r#"
clusters:
- name: bare
  cluster:
    server: https://10.0.0.9:6443
contexts:
- name: admin@bare
  context: {cluster: bare, user: admin}
users:
- name: admin
  user:
    username: admin
"#;

fn all_free(_: u16) -> bool {
    true
}

fn opts(suffix: &str) -> MergeOptions {
    MergeOptions {
        name_suffix: suffix.to_string(),
        ..Default::default()
    }
}

#[test]
fn merge_persist_list_purge() {
    let ws = workspace();
    ws.fetcher.put(REMOTE_KUBECONFIG, INLINE_REMOTE);
    let remote = RemoteAddr::new("core", "10.0.0.5").unwrap();

    let staged = Downloader::new(&ws.settings, &ws.fetcher)
        .download(&remote)
        .unwrap();
    assert!(ws.settings.cache_path(&remote).is_file());

    let mut kc = KubeConfig::load(&ws.settings.kubeconfig).unwrap();
    let ports = PortSource {
        range: ws.settings.ports.clone(),
        probe: &all_free,
    };
    let merged = merge(&mut kc, staged, &opts("dev"), &ports).unwrap();
    assert_eq!(merged.local_port, 7001);
    assert_eq!(merged.names.context, "kubernetes-admin@10.0.0.5:6443-dev");

    kc.persist(&ws.settings.kubeconfig).unwrap();
    let reloaded = KubeConfig::load(&ws.settings.kubeconfig).unwrap();
    assert_eq!(
        reloaded.clusters["kubernetes-dev"].server,
        "https://kubernetes:7001"
    );
    assert!(reloaded.users["kubernetes-dev"].has_inline_cert());
    assert!(reloaded.dangling_refs().is_empty());

    let listed = list_clusters(&reloaded, Some("jump@bastion"));
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "10.0.0.5:6443-dev");
    assert_eq!(
        listed[0].ssh_forward,
        port_forwarding_cmd(7001, "10.0.0.5:6443", Some("jump@bastion"))
    );

    let mut kc = reloaded;
    let purged = purge(
        &mut kc,
        &PurgeOptions {
            name: "dev".to_string(),
            all: false,
        },
    )
    .unwrap();
    assert_eq!(purged.len(), 1);
    assert!(kc.clusters.is_empty());
    assert!(kc.users.is_empty());
    assert!(kc.contexts.is_empty());
}

#[test]
fn second_merge_of_same_remote_is_refused() {
    let ws = workspace();
    ws.fetcher.put(REMOTE_KUBECONFIG, INLINE_REMOTE);
    let remote = RemoteAddr::parse("core@10.0.0.5");
    let downloader = Downloader::new(&ws.settings, &ws.fetcher);
    let ports = PortSource {
        range: ws.settings.ports.clone(),
        probe: &all_free,
    };

    let mut kc = KubeConfig::default();
    merge(&mut kc, downloader.download(&remote).unwrap(), &opts("dev"), &ports).unwrap();

    let err = merge(&mut kc, downloader.download(&remote).unwrap(), &opts("qa"), &ports)
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyMerged { ref cluster } if cluster == "kubernetes-dev"));

    // the cached copy served the second download
    assert_eq!(ws.fetcher.fetched.borrow().len(), 1);
}

#[test]
fn legacy_cert_files_are_fetched_locally() {
    let ws = workspace();
    ws.fetcher.put(REMOTE_KUBECONFIG, LEGACY_REMOTE);
    ws.fetcher.put("/etc/kubernetes/ssl/ca.pem", "CA");
    ws.fetcher.put("/etc/kubernetes/ssl/admin.pem", "CERT");
    ws.fetcher.put("/etc/kubernetes/ssl/admin-key.pem", "KEY");
    let remote = RemoteAddr::parse("core@172.31.7.182");

    let staged = Downloader::new(&ws.settings, &ws.fetcher)
        .download(&remote)
        .unwrap();

    let ca = ws.settings.ca_path(&remote);
    assert_eq!(staged.cluster.ca_path(), Some(&ca));
    assert_eq!(fs::read_to_string(&ca).unwrap(), "CA");
    assert_eq!(
        staged.user.client_certificate_path(),
        Some(&ws.settings.client_cert_path(&remote))
    );
    assert_eq!(
        fs::read_to_string(ws.settings.client_key_path(&remote)).unwrap(),
        "KEY"
    );
    assert_eq!(staged.remote_api_addr(), "172.31.7.182:443");
}

#[test]
fn inline_ca_without_inline_client_cert_is_rejected() {
    let ws = workspace();
    let remote_file = INLINE_REMOTE
        .replace("client-certificate-data: Y2VydA==", "client-certificate: /tmp/cert.pem")
        .replace("client-key-data: a2V5", "client-key: /tmp/key.pem");
    ws.fetcher.put(REMOTE_KUBECONFIG, &remote_file);

    let err = Downloader::new(&ws.settings, &ws.fetcher)
        .download(&RemoteAddr::parse("core@10.0.0.5"))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRemoteUser(_)), "{err}");
}

#[test]
fn cluster_without_any_authority_is_rejected() {
    let ws = workspace();
    ws.fetcher.put(REMOTE_KUBECONFIG, NO_CERT_REMOTE);

    let err = Downloader::new(&ws.settings, &ws.fetcher)
        .download(&RemoteAddr::parse("core@10.0.0.9"))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRemoteCert(ref name) if name == "bare"), "{err}");
}

#[test]
fn unreachable_remote_reports_fetch_error() {
    let ws = workspace();

    let err = Downloader::new(&ws.settings, &ws.fetcher)
        .download(&RemoteAddr::parse("core@10.0.0.5"))
        .unwrap_err();
    assert!(matches!(err, Error::Fetch { .. }), "{err}");
}
