//! The kubeconfig file as it appears on disk: lists of named entries.
//!
//! Remote files are written by many different tools, so unknown keys are
//! carried through `extensions`/`extra` instead of being rejected.

use std::collections::BTreeMap;
use std::path::PathBuf;

use base64::Engine as _;
use serde::*;
use serde_yaml::Value as YamlValue;

// region: Context
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContextSpec {
    pub cluster: String,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<YamlValue>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, YamlValue>,
}

impl ContextSpec {
    pub fn new(cluster: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            user: user.into(),
            namespace: None,
            extensions: None,
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Context {
    pub name: String,
    pub context: ContextSpec,
}
// endregion

// region: Cluster
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterSpec {
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_authority: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure_skip_tls_verify: Option<YamlValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<YamlValue>,
    /// `tls-server-name`, `proxy-url`, `disable-compression`, ...
    #[serde(flatten)]
    pub extra: BTreeMap<String, YamlValue>,
}

fn non_empty_path(path: &Option<PathBuf>) -> Option<&PathBuf> {
    path.as_ref().filter(|p| !p.as_os_str().is_empty())
}

impl ClusterSpec {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Default::default()
        }
    }

    /// Decoded bytes of `certificate-authority-data`, if any.
    ///
    /// Data that is not valid base64 is compared as the raw text.
    pub fn ca_data(&self) -> Option<Vec<u8>> {
        let data = self.certificate_authority_data.as_deref()?;
        let compact: String = data.split_whitespace().collect();
        if compact.is_empty() {
            return None;
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&compact)
            .unwrap_or_else(|_| compact.into_bytes());
        Some(bytes)
    }

    pub fn ca_path(&self) -> Option<&PathBuf> {
        non_empty_path(&self.certificate_authority)
    }

    /// Two clusters share a certificate authority when both carry inline
    /// data and the data is equal, or else when both carry a CA path and the
    /// paths are equal. Inline data never matches a path.
    pub fn same_authority(&self, other: &ClusterSpec) -> bool {
        if let (Some(ours), Some(theirs)) = (self.ca_data(), other.ca_data()) {
            return ours == theirs;
        }

        if let (Some(ours), Some(theirs)) = (self.ca_path(), other.ca_path()) {
            return ours == theirs;
        }

        false
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Cluster {
    pub name: String,
    pub cluster: ClusterSpec,
}
// endregion

// region: User
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct UserSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_certificate_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_key: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_key_data: Option<String>,
    /// Anything else (`exec`, `auth-provider`, `username`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, YamlValue>,
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

impl UserSpec {
    pub fn has_token(&self) -> bool {
        has_text(&self.token)
    }

    pub fn has_inline_cert(&self) -> bool {
        has_text(&self.client_certificate_data) && has_text(&self.client_key_data)
    }

    pub fn client_certificate_path(&self) -> Option<&PathBuf> {
        non_empty_path(&self.client_certificate)
    }

    pub fn client_key_path(&self) -> Option<&PathBuf> {
        non_empty_path(&self.client_key)
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct User {
    pub name: String,
    pub user: UserSpec,
}
// endregion

// region: Common
#[derive(Serialize, Deserialize, Debug, Default)]
pub enum ApiVersion {
    #[default]
    #[serde(rename = "v1")]
    V1,
}
#[derive(Serialize, Deserialize, Debug, Default)]
pub enum Kind {
    #[default]
    Config,
}

/// `clusters: ~` is as common as an absent key in hand-edited files.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case")]
pub struct KubeConfig {
    #[serde(default)]
    pub kind: Kind,
    #[serde(rename = "apiVersion", default)]
    pub api_version: ApiVersion,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub clusters: Vec<Cluster>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub contexts: Vec<Context>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,
    #[serde(default, skip_serializing_if = "YamlValue::is_null")]
    pub preferences: YamlValue,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub users: Vec<User>,
    /// Top-level `extensions` and anything newer than this model.
    #[serde(flatten)]
    pub extra: BTreeMap<String, YamlValue>,
}
// endregion

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_data_never_matches_path() {
        let inline = ClusterSpec {
            certificate_authority_data: Some("Y2EtYnl0ZXM=".into()),
            ..ClusterSpec::new("https://10.0.0.5:6443")
        };
        let on_disk = ClusterSpec {
            certificate_authority: Some("/etc/kubernetes/ssl/ca.pem".into()),
            ..ClusterSpec::new("https://10.0.0.5:6443")
        };

        assert!(!inline.same_authority(&on_disk));
        assert!(!on_disk.same_authority(&inline));
    }

    #[test]
    fn inline_data_compares_decoded_bytes() {
        let wrapped = ClusterSpec {
            certificate_authority_data: Some("Y2Et\nYnl0ZXM=\n".into()),
            ..ClusterSpec::new("https://a:6443")
        };
        let flat = ClusterSpec {
            certificate_authority_data: Some("Y2EtYnl0ZXM=".into()),
            ..ClusterSpec::new("https://b:6443")
        };
        let other = ClusterSpec {
            certificate_authority_data: Some("b3RoZXI=".into()),
            ..ClusterSpec::new("https://c:6443")
        };

        assert_eq!(flat.ca_data().as_deref(), Some(&b"ca-bytes"[..]));
        assert!(wrapped.same_authority(&flat));
        assert!(!flat.same_authority(&other));
    }

    #[test]
    fn paths_compare_when_neither_side_has_data() {
        let a = ClusterSpec {
            certificate_authority: Some("/tmp/ca.crt".into()),
            ..ClusterSpec::new("https://a:6443")
        };
        let b = ClusterSpec {
            certificate_authority: Some("/tmp/ca.crt".into()),
            ..ClusterSpec::new("https://b:6443")
        };

        assert!(a.same_authority(&b));
        assert!(!a.same_authority(&ClusterSpec::new("https://c:6443")));
    }

    #[test]
    fn empty_authority_is_never_equal() {
        let a = ClusterSpec {
            certificate_authority_data: Some(String::new()),
            certificate_authority: Some(PathBuf::new()),
            ..ClusterSpec::new("https://a:6443")
        };

        assert!(!a.same_authority(&a.clone()));
    }

    #[test]
    fn parses_sparse_file() {
        let kc: KubeConfig = serde_yaml::from_str(
            "apiVersion: v1\nkind: Config\nclusters: ~\nusers:\n- name: admin\n  user:\n    exec:\n      command: aws\n",
        )
        .unwrap();

        assert!(kc.clusters.is_empty());
        assert!(kc.contexts.is_empty());
        assert!(kc.users[0].user.extra.contains_key("exec"));
        assert!(!kc.users[0].user.has_token());
    }

    #[test]
    fn unknown_keys_survive_a_round_trip() {
        let text = r#"
apiVersion: v1
kind: Config
clusters:
- name: corp
  cluster:
    server: https://corp.example:6443
    tls-server-name: api.corp.example
    proxy-url: socks5://localhost:1080
    disable-compression: true
contexts:
- name: corp
  context:
    cluster: corp
    user: corp
    color: red
users: []
extensions:
- name: audit
  extension: {enabled: true}
"#;
        let kc: KubeConfig = serde_yaml::from_str(text).unwrap();
        let cluster = &kc.clusters[0].cluster;
        assert_eq!(
            cluster.extra.get("tls-server-name"),
            Some(&YamlValue::from("api.corp.example"))
        );
        assert!(kc.contexts[0].context.extra.contains_key("color"));
        assert!(kc.extra.contains_key("extensions"));

        let out = serde_yaml::to_string(&kc).unwrap();
        for key in ["tls-server-name", "proxy-url", "disable-compression", "color: red", "audit"] {
            assert!(out.contains(key), "{key} missing from\n{out}");
        }
    }
}
